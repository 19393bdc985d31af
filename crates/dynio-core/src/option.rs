//! Host view of driver options.

use std::ffi::{c_void, CString};
use std::fmt::{self, Display, Formatter};

use dynio_sdk::{OptionTag, RawOption};

use crate::error::{Error, Result};
use crate::raw;

/// Kind of an option, decoded from its ABI tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Int,
    Double,
    Bool,
    Char,
    String,
    Custom,
    /// A tag this host does not know about. Such options are read-only.
    Unknown(u32),
}

impl From<OptionTag> for OptionKind {
    fn from(tag: OptionTag) -> Self {
        match tag {
            OptionTag::INT => OptionKind::Int,
            OptionTag::DOUBLE => OptionKind::Double,
            OptionTag::BOOL => OptionKind::Bool,
            OptionTag::CHAR => OptionKind::Char,
            OptionTag::STRING => OptionKind::String,
            OptionTag::CUSTOM => OptionKind::Custom,
            OptionTag(other) => OptionKind::Unknown(other),
        }
    }
}

impl Display for OptionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Int => write!(f, "int"),
            OptionKind::Double => write!(f, "double"),
            OptionKind::Bool => write!(f, "bool"),
            OptionKind::Char => write!(f, "char"),
            OptionKind::String => write!(f, "string"),
            OptionKind::Custom => write!(f, "custom"),
            OptionKind::Unknown(tag) => write!(f, "unknown({})", tag),
        }
    }
}

/// Value held by an option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Double(f64),
    Bool(bool),
    Char(char),
    /// `None` when the driver left the string unset.
    String(Option<String>),
    /// Driver-defined pointer, opaque to the host.
    Custom(*mut c_void),
}

impl OptionValue {
    /// Kind this value belongs to.
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Int(_) => OptionKind::Int,
            OptionValue::Double(_) => OptionKind::Double,
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::Char(_) => OptionKind::Char,
            OptionValue::String(_) => OptionKind::String,
            OptionValue::Custom(_) => OptionKind::Custom,
        }
    }
}

impl Display for OptionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Double(v) => write!(f, "{}", v),
            OptionValue::Bool(v) => write!(f, "{}", v),
            OptionValue::Char(v) => write!(f, "{:?}", v),
            OptionValue::String(Some(v)) => write!(f, "{:?}", v),
            OptionValue::String(None) => write!(f, "<unset>"),
            OptionValue::Custom(p) => write!(f, "{:p}", p),
        }
    }
}

/// Mutable view of one option inside a driver's state.
///
/// Writes take effect on the next `read`/`write` call of the owning handle.
/// The view borrows the handle, so it cannot outlive it.
pub struct DriverOption<'a> {
    name: String,
    raw: &'a mut RawOption,
    strings: &'a mut Vec<CString>,
}

impl<'a> DriverOption<'a> {
    pub(crate) fn new(name: &str, raw: &'a mut RawOption, strings: &'a mut Vec<CString>) -> Self {
        Self {
            name: name.to_string(),
            raw,
            strings,
        }
    }

    /// Option name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Option kind.
    pub fn kind(&self) -> OptionKind {
        self.raw.kind.into()
    }

    /// Current value.
    pub fn value(&self) -> Result<OptionValue> {
        raw::read_payload(self.raw).map_err(|reason| Error::InvalidOptionValue {
            option: self.name.clone(),
            reason,
        })
    }

    /// Write a value of the option's own kind.
    ///
    /// Custom values must go through [`set_custom`](Self::set_custom).
    pub fn set(&mut self, value: OptionValue) -> Result<()> {
        match value {
            OptionValue::Int(v) => self.set_int(v),
            OptionValue::Double(v) => self.set_double(v),
            OptionValue::Bool(v) => self.set_bool(v),
            OptionValue::Char(v) => self.set_char(v),
            OptionValue::String(Some(v)) => self.set_string(&v),
            OptionValue::String(None) => {
                self.expect(OptionKind::String)?;
                self.raw.value.string = std::ptr::null();
                Ok(())
            }
            OptionValue::Custom(_) => Err(Error::InvalidOptionValue {
                option: self.name.clone(),
                reason: "custom values must be set with set_custom".to_string(),
            }),
        }
    }

    pub fn set_int(&mut self, value: i64) -> Result<()> {
        self.expect(OptionKind::Int)?;
        self.raw.value.int = value;
        Ok(())
    }

    pub fn set_double(&mut self, value: f64) -> Result<()> {
        self.expect(OptionKind::Double)?;
        self.raw.value.double = value;
        Ok(())
    }

    pub fn set_bool(&mut self, value: bool) -> Result<()> {
        self.expect(OptionKind::Bool)?;
        self.raw.value.boolean = u8::from(value);
        Ok(())
    }

    pub fn set_char(&mut self, value: char) -> Result<()> {
        self.expect(OptionKind::Char)?;
        self.raw.value.character = u32::from(value);
        Ok(())
    }

    /// Write a string value. The string is owned by the handle and outlives
    /// the driver's descriptor.
    ///
    /// Strings written earlier are not freed when the option is overwritten,
    /// since the driver may still hold their pointers; the handle keeps one
    /// copy of every distinct value written until it is dropped.
    pub fn set_string(&mut self, value: &str) -> Result<()> {
        self.expect(OptionKind::String)?;
        let value = CString::new(value).map_err(|e| Error::InvalidOptionValue {
            option: self.name.clone(),
            reason: e.to_string(),
        })?;

        let ptr = match self.strings.iter().find(|kept| **kept == value) {
            Some(kept) => kept.as_ptr(),
            None => {
                let ptr = value.as_ptr();
                self.strings.push(value);
                ptr
            }
        };
        self.raw.value.string = ptr;
        Ok(())
    }

    /// Write a driver-defined pointer.
    ///
    /// # Safety
    /// `value` must be whatever the driver documents for this option, and
    /// must stay valid for as long as the driver may read it.
    pub unsafe fn set_custom(&mut self, value: *mut c_void) -> Result<()> {
        self.expect(OptionKind::Custom)?;
        self.raw.value.custom = value;
        Ok(())
    }

    fn expect(&self, expected: OptionKind) -> Result<()> {
        let found = self.kind();
        if found == expected {
            Ok(())
        } else {
            Err(Error::OptionKindMismatch {
                option: self.name.clone(),
                expected,
                found,
            })
        }
    }
}

impl fmt::Debug for DriverOption<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverOption")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("value", &self.value().ok())
            .finish()
    }
}
