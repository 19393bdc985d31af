//! Driver-side error types.

use crate::abi::DriverStatus;

/// Error returned by a [`Driver`](crate::Driver) operation.
///
/// Errors never cross the module boundary as values; the trampolines turn
/// them into a [`DriverStatus`].
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The input could not be interpreted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The operation is not implemented by this driver.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Any other failure.
    #[error("Driver failed: {0}")]
    Failed(String),
}

impl DriverError {
    /// Status reported to the host for this error.
    pub fn status(&self) -> DriverStatus {
        match self {
            DriverError::InvalidInput(_) => DriverStatus::INVALID_INPUT,
            DriverError::Unsupported(_) => DriverStatus::UNSUPPORTED,
            DriverError::Failed(_) => DriverStatus::FAILED,
        }
    }
}

/// Driver result type
pub type DriverResult<T> = Result<T, DriverError>;

impl From<std::str::Utf8Error> for DriverError {
    fn from(err: std::str::Utf8Error) -> Self {
        DriverError::InvalidInput(err.to_string())
    }
}
