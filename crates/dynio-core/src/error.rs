//! Error types for loading and driving modules.

use std::path::PathBuf;

use dynio_sdk::DriverStatus;

use crate::option::OptionKind;

/// Boxed error carrying an OS or module diagnostic.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for dynio operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the loader and driver handles.
///
/// An option lookup that finds nothing is not an error: `option()` returns
/// `None`. Using a handle with the wrong value type is not detectable and is
/// covered by the safety contract of `narrow`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path does not resolve to a loadable module.
    #[error("failed to load module \"{}\": {source}", .path.display())]
    ModuleNotFound {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// A required entry point is not exported by the module.
    #[error("failed to load symbol `{symbol}` from \"{}\": {source}", .path.display())]
    MissingEntryPoint {
        symbol: &'static str,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The constructor entry point returned no usable descriptor.
    #[error(
        "driver constructor in \"{}\" produced no usable descriptor: {reason}",
        .path.display()
    )]
    ConstructionFailed { path: PathBuf, reason: String },

    /// The driver rejected its input during decode.
    #[error("driver `{driver}` failed to decode input: {status}")]
    DecodeFailed { driver: String, status: DriverStatus },

    /// The driver failed to encode a value.
    #[error("driver `{driver}` failed to encode value: {status}")]
    EncodeFailed { driver: String, status: DriverStatus },

    /// An option was written with a value of another kind.
    #[error("option `{option}` holds {found} values, not {expected}")]
    OptionKindMismatch {
        option: String,
        expected: OptionKind,
        found: OptionKind,
    },

    /// An option value could not be read or written.
    #[error("invalid value for option `{option}`: {reason}")]
    InvalidOptionValue { option: String, reason: String },

    /// No module for a driver name was found in the search paths.
    #[error("driver `{name}` not found in search paths {searched:?}")]
    DriverNotFound { name: String, searched: Vec<PathBuf> },

    /// Loader configuration could not be parsed.
    #[error("invalid loader configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
