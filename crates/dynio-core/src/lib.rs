//! dynio host runtime
//!
//! Loads I/O drivers from shared libraries at runtime and exposes them as
//! owning, typed handles.
//!
//! ```no_run
//! use dynio_core::DriverLoader;
//!
//! # fn main() -> dynio_core::Result<()> {
//! let loader = DriverLoader::from_env();
//! let driver = loader.load_by_name("csv")?;
//! // SAFETY: the csv driver decodes into `dynio_csv::Csv`.
//! let mut csv = unsafe { driver.narrow::<dynio_csv::Csv>() };
//!
//! if let Some(mut delimiter) = csv.option("delimiter") {
//!     delimiter.set_char(';')?;
//! }
//! let table = csv.read(b"name;age\nada;36\n")?;
//! assert_eq!(table.header(), ["name", "age"]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod loader;
pub mod module;
pub mod option;
mod raw;
pub mod registry;

pub use config::LoaderConfig;
pub use error::{BoxError, Error, Result};
pub use handle::{DriverHandle, Untyped};
pub use loader::{load, DriverLoader};
pub use module::{LoadedModule, Module, ModuleOpener, NativeOpener};
pub use option::{DriverOption, OptionKind, OptionValue};
pub use registry::{global_registry, ModuleInfo, ModuleRegistry};

pub use dynio_sdk::DriverStatus;
