//! CSV driver for dynio.
//!
//! Built as a `cdylib` this crate is a loadable driver module named `csv`.
//! Hosts that load it narrow their handle to [`Csv`], which is why the crate
//! is also built as an `rlib`.
//!
//! Options:
//! - `delimiter` (char, default `','`): field separator for decode and encode.

mod table;

use dynio_sdk::prelude::*;

pub use table::Csv;

/// Name of the delimiter option.
pub const DELIMITER: &str = "delimiter";

/// Delimiter used when the option is unset.
pub const DEFAULT_DELIMITER: char = ',';

/// The `csv` driver.
#[derive(Debug, Default)]
pub struct CsvDriver;

impl CsvDriver {
    fn delimiter(options: &Options<'_>) -> char {
        options.char(DELIMITER).unwrap_or(DEFAULT_DELIMITER)
    }
}

impl Driver for CsvDriver {
    type Value = Csv;
    const NAME: &'static CStr = c"csv";

    fn new() -> Self {
        CsvDriver
    }

    fn options() -> Vec<OptionSpec> {
        vec![OptionSpec::char(c"delimiter", DEFAULT_DELIMITER)]
    }

    fn decode(&mut self, options: &Options<'_>, input: &[u8]) -> DriverResult<Csv> {
        let delimiter = Self::delimiter(options);
        let csv = Csv::parse(input, delimiter)?;
        tracing::trace!(rows = csv.len(), ?delimiter, "Decoded CSV");
        Ok(csv)
    }

    fn encode(&mut self, options: &Options<'_>, value: &Csv) -> DriverResult<Vec<u8>> {
        value.render(Self::delimiter(options))
    }
}

export_driver!(CsvDriver);
