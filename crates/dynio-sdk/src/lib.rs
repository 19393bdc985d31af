//! dynio driver SDK
//!
//! This crate defines the C ABI exchanged between a host and a dynamically
//! loaded driver module, and the tools for writing such a module in Rust.
//!
//! # Quick Start
//!
//! ```rust
//! use dynio_sdk::prelude::*;
//!
//! struct Lines;
//!
//! impl Driver for Lines {
//!     type Value = Vec<String>;
//!     const NAME: &'static CStr = c"lines";
//!
//!     fn new() -> Self {
//!         Lines
//!     }
//!
//!     fn decode(&mut self, _: &Options<'_>, input: &[u8]) -> DriverResult<Vec<String>> {
//!         Ok(std::str::from_utf8(input)?.lines().map(String::from).collect())
//!     }
//!
//!     fn encode(&mut self, _: &Options<'_>, value: &Vec<String>) -> DriverResult<Vec<u8>> {
//!         Ok(value.join("\n").into_bytes())
//!     }
//! }
//!
//! export_driver!(Lines);
//! ```

pub mod abi;
pub mod driver;
pub mod error;
#[macro_use]
pub mod macros;
pub mod trampoline;

pub use abi::{
    DriverBytes, DriverDescriptor, DriverStatus, OptionPayload, OptionTag, RawOption,
    DEREGISTER_SYMBOL, REGISTER_SYMBOL,
};
pub use driver::{Driver, OptionSpec, Options};
pub use error::{DriverError, DriverResult};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::driver::{Driver, OptionSpec, Options};
    pub use crate::error::{DriverError, DriverResult};
    pub use crate::export_driver;
    pub use std::ffi::CStr;
}
