//! In-memory CSV table and its text form.

use serde::{Deserialize, Serialize};

use dynio_sdk::{DriverError, DriverResult};

/// A decoded CSV document: one header line followed by data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Csv {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Csv {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Data row `n`, not counting the header.
    pub fn row(&self, n: usize) -> Option<&[String]> {
        self.rows.get(n).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse CSV text. Blank lines are skipped.
    pub fn parse(input: &[u8], delimiter: char) -> DriverResult<Self> {
        let text = std::str::from_utf8(input)?;

        let mut lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(|line| split_line(line, delimiter));

        let Some(header) = lines.next() else {
            return Ok(Self::default());
        };
        Ok(Self::new(header, lines.collect()))
    }

    /// Render as CSV text, one `\n`-terminated line per record.
    ///
    /// Tables that would not parse back to the same value are rejected: a
    /// field holding the delimiter or a line break, an empty last field, an
    /// empty record, or rows under an empty header. An empty table renders
    /// as no bytes.
    pub fn render(&self, delimiter: char) -> DriverResult<Vec<u8>> {
        if matches!(delimiter, '\n' | '\r') {
            return Err(DriverError::InvalidInput(format!(
                "{:?} cannot be used as a delimiter",
                delimiter
            )));
        }
        if self.header.is_empty() && self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = String::new();
        let mut buf = [0u8; 4];
        let separator = &*delimiter.encode_utf8(&mut buf);
        for record in std::iter::once(&self.header).chain(&self.rows) {
            check_record(record, delimiter)?;
            out.push_str(&record.join(separator));
            out.push('\n');
        }
        Ok(out.into_bytes())
    }
}

fn check_record(record: &[String], delimiter: char) -> DriverResult<()> {
    let invalid = |reason: String| Err(DriverError::InvalidInput(reason));

    match record.last() {
        None => return invalid("record has no fields".to_string()),
        Some(last) if last.is_empty() => {
            return invalid("last field of a record is empty".to_string())
        }
        Some(_) => {}
    }

    if record
        .iter()
        .any(|field| field.contains([delimiter, '\n', '\r']))
    {
        return invalid(format!(
            "field contains the delimiter {:?} or a line break",
            delimiter
        ));
    }
    Ok(())
}

fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let line = line.strip_suffix(delimiter).unwrap_or(line);
    line.split(delimiter).map(str::to_string).collect()
}
