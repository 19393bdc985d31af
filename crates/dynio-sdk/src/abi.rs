//! C ABI shared by driver modules and hosts.
//!
//! Every type in this module is `#[repr(C)]` (or a transparent integer) so a
//! descriptor can cross a module boundary without either side knowing the
//! other's type system. A module is only required to export the two
//! registration entry points named by [`REGISTER_SYMBOL`] and
//! [`DEREGISTER_SYMBOL`].

use std::ffi::{c_char, c_void};
use std::fmt::{self, Display, Formatter};
use std::mem::ManuallyDrop;
use std::ptr;

/// Symbol name of the constructor entry point.
pub const REGISTER_SYMBOL: &str = "register_driver";

/// Symbol name of the destructor entry point.
pub const DEREGISTER_SYMBOL: &str = "deregister_driver";

/// Result of a decode or encode call.
///
/// Kept as a plain integer so that a value written by foreign code can never
/// be an invalid Rust enum discriminant.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverStatus(pub i32);

impl DriverStatus {
    /// The call succeeded and its output is initialized.
    pub const OK: Self = Self(0);
    /// The input could not be interpreted by the driver.
    pub const INVALID_INPUT: Self = Self(1);
    /// The driver does not implement the requested operation.
    pub const UNSUPPORTED: Self = Self(2);
    /// The driver failed for another reason.
    pub const FAILED: Self = Self(3);
    /// The driver panicked; the panic was stopped at the boundary.
    pub const PANICKED: Self = Self(4);

    /// Whether this status reports success.
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl Display for DriverStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::OK => write!(f, "ok"),
            Self::INVALID_INPUT => write!(f, "invalid input"),
            Self::UNSUPPORTED => write!(f, "unsupported operation"),
            Self::FAILED => write!(f, "driver failure"),
            Self::PANICKED => write!(f, "driver panicked"),
            Self(code) => write!(f, "unknown status {}", code),
        }
    }
}

/// Kind tag of a driver option.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionTag(pub u32);

impl OptionTag {
    /// `value.int` holds a signed 64-bit integer.
    pub const INT: Self = Self(0);
    /// `value.double` holds a 64-bit float.
    pub const DOUBLE: Self = Self(1);
    /// `value.boolean` holds 0 or 1.
    pub const BOOL: Self = Self(2);
    /// `value.character` holds a Unicode scalar value.
    pub const CHAR: Self = Self(3);
    /// `value.string` holds a NUL-terminated string or null.
    pub const STRING: Self = Self(4);
    /// `value.custom` holds a driver-defined pointer.
    pub const CUSTOM: Self = Self(5);
}

/// Payload of a driver option. Which field is live is decided by the tag.
#[repr(C)]
#[derive(Clone, Copy)]
pub union OptionPayload {
    pub int: i64,
    pub double: f64,
    pub boolean: u8,
    pub character: u32,
    /// Borrowed: whoever wrote the pointer owns the allocation.
    pub string: *const c_char,
    pub custom: *mut c_void,
}

/// A named, kind-tagged configuration value owned by a driver.
#[repr(C)]
pub struct RawOption {
    pub kind: OptionTag,
    pub name: *const c_char,
    pub value: OptionPayload,
}

/// Releases a buffer handed out in [`DriverBytes`], using the allocator that
/// produced it.
pub type ReleaseBytesFn = unsafe extern "C" fn(data: *mut u8, len: usize, capacity: usize);

/// Byte buffer produced by a driver's encode operation.
///
/// The buffer belongs to the module that filled it. Consumers copy the bytes
/// out and then call `release` exactly once.
#[repr(C)]
pub struct DriverBytes {
    pub data: *mut u8,
    pub len: usize,
    pub capacity: usize,
    pub release: Option<ReleaseBytesFn>,
}

impl DriverBytes {
    /// An empty buffer with nothing to release.
    pub const fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            capacity: 0,
            release: None,
        }
    }

    /// Hand a `Vec` across the boundary. It is freed by [`release_vec`].
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let mut bytes = ManuallyDrop::new(bytes);
        Self {
            data: bytes.as_mut_ptr(),
            len: bytes.len(),
            capacity: bytes.capacity(),
            release: Some(release_vec),
        }
    }
}

impl Default for DriverBytes {
    fn default() -> Self {
        Self::empty()
    }
}

/// Release function for buffers built by [`DriverBytes::from_vec`].
///
/// # Safety
/// The arguments must come from a single `DriverBytes::from_vec` call in this
/// module and must not have been released before.
pub unsafe extern "C" fn release_vec(data: *mut u8, len: usize, capacity: usize) {
    if data.is_null() {
        return;
    }
    // SAFETY: the triple was produced from a live Vec<u8> by `from_vec`.
    unsafe {
        drop(Vec::from_raw_parts(data, len, capacity));
    }
}

/// Get/set an option: returns a live view into driver state, or null.
pub type OptionFn =
    unsafe extern "C" fn(this: *mut DriverDescriptor, name: *const c_char) -> *mut RawOption;

/// Decode `input[..input_len]` into the value slot at `output`.
///
/// `output` points to uninitialized storage for the driver's value type; it
/// is initialized only when [`DriverStatus::OK`] is returned.
pub type DecodeFn = unsafe extern "C" fn(
    this: *mut DriverDescriptor,
    input: *const u8,
    input_len: usize,
    output: *mut c_void,
) -> DriverStatus;

/// Encode the value at `input` into a module-owned byte buffer.
pub type EncodeFn = unsafe extern "C" fn(
    this: *mut DriverDescriptor,
    input: *const c_void,
    output: *mut DriverBytes,
) -> DriverStatus;

/// Descriptor of one driver instance.
///
/// Created by the module's constructor entry point and destroyed only by
/// the same module's destructor entry point. Slots are `Option`s so a null
/// written by foreign code is representable and can be rejected.
#[repr(C)]
pub struct DriverDescriptor {
    /// NUL-terminated driver name. Immutable for the descriptor's lifetime.
    pub name: *const c_char,
    pub option: Option<OptionFn>,
    pub decode: Option<DecodeFn>,
    pub encode: Option<EncodeFn>,
    /// Driver-owned state, freed by the destructor entry point.
    pub internals: *mut c_void,
}

/// Constructor entry point: writes a new descriptor (or null) through `out`.
pub type RegisterFn = unsafe extern "C" fn(out: *mut *mut DriverDescriptor);

/// Destructor entry point: frees the descriptor and writes null back.
pub type DeregisterFn = unsafe extern "C" fn(inout: *mut *mut DriverDescriptor);
