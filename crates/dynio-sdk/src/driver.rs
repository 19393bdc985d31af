//! Safe driver authoring API.
//!
//! A driver implements [`Driver`] and exports it with
//! [`export_driver!`](crate::export_driver). The trampolines own the
//! translation between this trait and the C ABI.

use std::ffi::{c_void, CStr};
use std::ptr;

use crate::abi::{OptionPayload, OptionTag, RawOption};
use crate::error::DriverResult;

/// A data format driver.
///
/// One instance is created per descriptor, so a driver may keep state
/// between calls. Hosts are not required to synchronize across descriptors,
/// but calls on a single descriptor are never concurrent.
pub trait Driver: Sized + 'static {
    /// Structured value produced by `decode` and consumed by `encode`.
    ///
    /// Hosts reinterpret the decoded slot as this type, so it must be the
    /// same type definition on both sides of the boundary.
    type Value;

    /// Driver name reported through the descriptor.
    const NAME: &'static CStr;

    /// Construct the driver state for a new descriptor.
    fn new() -> Self;

    /// Options exposed by this driver, with their default values.
    fn options() -> Vec<OptionSpec> {
        Vec::new()
    }

    /// Decode raw bytes into a value.
    fn decode(&mut self, options: &Options<'_>, input: &[u8]) -> DriverResult<Self::Value>;

    /// Encode a value into raw bytes.
    fn encode(&mut self, options: &Options<'_>, value: &Self::Value) -> DriverResult<Vec<u8>>;
}

/// Declaration of one option and its default value.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    name: &'static CStr,
    kind: OptionTag,
    default: OptionDefault,
}

#[derive(Debug, Clone, Copy)]
enum OptionDefault {
    Int(i64),
    Double(f64),
    Bool(bool),
    Char(char),
    String(Option<&'static CStr>),
    Custom,
}

impl OptionSpec {
    pub fn int(name: &'static CStr, default: i64) -> Self {
        Self::new(name, OptionTag::INT, OptionDefault::Int(default))
    }

    pub fn double(name: &'static CStr, default: f64) -> Self {
        Self::new(name, OptionTag::DOUBLE, OptionDefault::Double(default))
    }

    pub fn bool(name: &'static CStr, default: bool) -> Self {
        Self::new(name, OptionTag::BOOL, OptionDefault::Bool(default))
    }

    pub fn char(name: &'static CStr, default: char) -> Self {
        Self::new(name, OptionTag::CHAR, OptionDefault::Char(default))
    }

    pub fn string(name: &'static CStr, default: Option<&'static CStr>) -> Self {
        Self::new(name, OptionTag::STRING, OptionDefault::String(default))
    }

    /// A driver-defined option, initially null.
    pub fn custom(name: &'static CStr) -> Self {
        Self::new(name, OptionTag::CUSTOM, OptionDefault::Custom)
    }

    fn new(name: &'static CStr, kind: OptionTag, default: OptionDefault) -> Self {
        Self {
            name,
            kind,
            default,
        }
    }

    /// Option name.
    pub fn name(&self) -> &'static CStr {
        self.name
    }

    pub(crate) fn into_raw(self) -> RawOption {
        let value = match self.default {
            OptionDefault::Int(int) => OptionPayload { int },
            OptionDefault::Double(double) => OptionPayload { double },
            OptionDefault::Bool(flag) => OptionPayload {
                boolean: u8::from(flag),
            },
            OptionDefault::Char(c) => OptionPayload {
                character: u32::from(c),
            },
            OptionDefault::String(s) => OptionPayload {
                string: s.map_or(ptr::null(), CStr::as_ptr),
            },
            OptionDefault::Custom => OptionPayload {
                custom: ptr::null_mut(),
            },
        };
        RawOption {
            kind: self.kind,
            name: self.name.as_ptr(),
            value,
        }
    }
}

/// Read-only view of a driver's option table, handed to `decode`/`encode`.
///
/// Typed getters return `None` when the option is missing or has a
/// different kind, so drivers can fall back to their defaults.
pub struct Options<'a> {
    table: &'a [RawOption],
}

impl<'a> Options<'a> {
    pub(crate) fn new(table: &'a [RawOption]) -> Self {
        Self { table }
    }

    /// Look up an option record by name.
    pub fn get(&self, name: &str) -> Option<&'a RawOption> {
        self.table.iter().find(|option| {
            // SAFETY: option names are static C strings from `OptionSpec`.
            !option.name.is_null()
                && unsafe { CStr::from_ptr(option.name) }.to_bytes() == name.as_bytes()
        })
    }

    fn tagged(&self, name: &str, kind: OptionTag) -> Option<OptionPayload> {
        self.get(name)
            .filter(|option| option.kind == kind)
            .map(|option| option.value)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        // SAFETY: the tag was checked by `tagged`.
        self.tagged(name, OptionTag::INT).map(|v| unsafe { v.int })
    }

    pub fn double(&self, name: &str) -> Option<f64> {
        // SAFETY: the tag was checked by `tagged`.
        self.tagged(name, OptionTag::DOUBLE).map(|v| unsafe { v.double })
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        // SAFETY: the tag was checked by `tagged`.
        self.tagged(name, OptionTag::BOOL)
            .map(|v| unsafe { v.boolean } != 0)
    }

    /// Character option. Invalid scalar values read as `None`.
    pub fn char(&self, name: &str) -> Option<char> {
        // SAFETY: the tag was checked by `tagged`.
        self.tagged(name, OptionTag::CHAR)
            .and_then(|v| char::from_u32(unsafe { v.character }))
    }

    /// String option. A null payload reads as `None`.
    pub fn string(&self, name: &str) -> Option<&'a CStr> {
        // SAFETY: the tag was checked; non-null string payloads point to
        // NUL-terminated strings kept alive by their writer until the
        // descriptor is destroyed.
        self.tagged(name, OptionTag::STRING).and_then(|v| unsafe {
            let s = v.string;
            (!s.is_null()).then(|| CStr::from_ptr(s))
        })
    }

    pub fn custom(&self, name: &str) -> Option<*mut c_void> {
        // SAFETY: the tag was checked by `tagged`.
        self.tagged(name, OptionTag::CUSTOM).map(|v| unsafe { v.custom })
    }
}
