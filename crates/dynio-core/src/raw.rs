//! Host side of the descriptor ABI.
//!
//! Every reinterpretation of memory handed over by a module happens in this
//! file: turning symbol addresses into entry points, calling descriptor
//! slots, reading option payloads and copying encoded buffers out.

use std::ffi::{c_void, CStr};
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::slice;

use dynio_sdk::abi::{DecodeFn, DeregisterFn, EncodeFn, OptionFn, RegisterFn};
use dynio_sdk::{DriverBytes, DriverDescriptor, DriverStatus, OptionTag, RawOption};

use crate::option::OptionValue;

/// Reinterpret resolved symbol addresses as the registration entry points.
///
/// # Safety
/// The addresses must be functions with the [`RegisterFn`] and
/// [`DeregisterFn`] signatures, exported by a module that stays mapped for
/// as long as the returned pointers are used.
pub(crate) unsafe fn entry_points(
    register: NonNull<c_void>,
    deregister: NonNull<c_void>,
) -> (RegisterFn, DeregisterFn) {
    // SAFETY: function pointers and data pointers have the same size on every
    // supported target; the signatures are guaranteed by the caller.
    unsafe {
        (
            std::mem::transmute::<*mut c_void, RegisterFn>(register.as_ptr()),
            std::mem::transmute::<*mut c_void, DeregisterFn>(deregister.as_ptr()),
        )
    }
}

/// A descriptor produced by a module's constructor.
///
/// Dropping it hands the descriptor back to the same module's destructor,
/// exactly once.
pub(crate) struct OwnedDescriptor {
    ptr: NonNull<DriverDescriptor>,
    deregister: DeregisterFn,
    option: OptionFn,
    decode: DecodeFn,
    encode: EncodeFn,
    name: String,
}

impl OwnedDescriptor {
    /// Call the constructor and validate what it produced.
    ///
    /// An unusable descriptor is returned to the destructor before the error
    /// is reported.
    ///
    /// # Safety
    /// `register` and `deregister` must be the entry points of one module,
    /// which must stay mapped for the lifetime of the returned value.
    pub(crate) unsafe fn construct(
        register: RegisterFn,
        deregister: DeregisterFn,
    ) -> Result<Self, String> {
        let mut out: *mut DriverDescriptor = ptr::null_mut();
        // SAFETY: `out` is a valid, writable slot for the constructor.
        unsafe { register(&mut out) };

        let Some(ptr) = NonNull::new(out) else {
            return Err("constructor returned a null descriptor".to_string());
        };

        // SAFETY: a non-null descriptor from the constructor is readable
        // until it is passed to the destructor.
        let descriptor = unsafe { ptr.as_ref() };
        let slots = (descriptor.option, descriptor.decode, descriptor.encode);
        let name = descriptor.name;

        let (Some(option), Some(decode), Some(encode)) = slots else {
            release(ptr, deregister);
            return Err(format!("descriptor has an empty slot {}", missing_slot(slots)));
        };

        let name = if name.is_null() {
            None
        } else {
            // SAFETY: the name is a NUL-terminated string that lives as long
            // as the descriptor.
            unsafe { CStr::from_ptr(name) }.to_str().ok()
        };
        let Some(name) = name.map(str::to_string) else {
            release(ptr, deregister);
            return Err("descriptor name is null or not valid UTF-8".to_string());
        };

        Ok(Self {
            ptr,
            deregister,
            option,
            decode,
            encode,
            name,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Look up an option. The returned view points into driver state.
    pub(crate) fn option(&mut self, name: &CStr) -> Option<&mut RawOption> {
        // SAFETY: the descriptor is live and `name` is NUL-terminated.
        let raw = unsafe { (self.option)(self.ptr.as_ptr(), name.as_ptr()) };
        // SAFETY: a non-null option pointer refers to driver state that is
        // live until the descriptor is destroyed; `&mut self` keeps the view
        // from outliving it and from aliasing another view.
        NonNull::new(raw).map(|mut raw| unsafe { raw.as_mut() })
    }

    /// Decode `input` into a fresh `T`.
    ///
    /// # Safety
    /// `T` must be the value type the driver decodes into.
    pub(crate) unsafe fn decode<T>(&mut self, input: &[u8]) -> Result<T, DriverStatus> {
        let mut slot = MaybeUninit::<T>::uninit();
        // SAFETY: the input slice and output slot are valid for the call.
        let status = unsafe {
            (self.decode)(
                self.ptr.as_ptr(),
                input.as_ptr(),
                input.len(),
                slot.as_mut_ptr().cast::<c_void>(),
            )
        };

        if status.is_ok() {
            // SAFETY: the driver initialized the slot with a `T` (caller's
            // contract) and reported success.
            Ok(unsafe { slot.assume_init() })
        } else {
            Err(status)
        }
    }

    /// Encode `value` and copy the driver's buffer into host memory.
    ///
    /// # Safety
    /// `T` must be the value type the driver encodes from.
    pub(crate) unsafe fn encode<T>(&mut self, value: &T) -> Result<Vec<u8>, DriverStatus> {
        let mut out = DriverBytes::empty();
        // SAFETY: `value` is a live `T` and `out` is a valid buffer slot.
        let status = unsafe {
            (self.encode)(
                self.ptr.as_ptr(),
                (value as *const T).cast::<c_void>(),
                &mut out,
            )
        };

        // SAFETY: whatever the driver wrote into `out` is a buffer it owns
        // together with its release function.
        let bytes = unsafe { take_bytes(out) };
        if status.is_ok() {
            Ok(bytes)
        } else {
            Err(status)
        }
    }
}

impl Drop for OwnedDescriptor {
    fn drop(&mut self) {
        release(self.ptr, self.deregister);
    }
}

fn release(descriptor: NonNull<DriverDescriptor>, deregister: DeregisterFn) {
    let mut ptr = descriptor.as_ptr();
    // SAFETY: the descriptor came from this module's constructor and is
    // handed back exactly once.
    unsafe { deregister(&mut ptr) };
    if !ptr.is_null() {
        tracing::warn!("driver destructor did not clear the descriptor pointer");
    }
}

fn missing_slot(slots: (Option<OptionFn>, Option<DecodeFn>, Option<EncodeFn>)) -> &'static str {
    match slots {
        (None, _, _) => "`option`",
        (_, None, _) => "`decode`",
        _ => "`encode`",
    }
}

/// Copy an encoded buffer out and release it through the module.
///
/// # Safety
/// `bytes` must have been filled by a driver: `data` valid for `len` bytes
/// (or null) and `release` able to free exactly that buffer.
unsafe fn take_bytes(bytes: DriverBytes) -> Vec<u8> {
    if bytes.data.is_null() {
        return Vec::new();
    }

    // SAFETY: `data` is valid for `len` bytes per the caller's contract.
    let copied = unsafe { slice::from_raw_parts(bytes.data, bytes.len) }.to_vec();
    if let Some(release) = bytes.release {
        // SAFETY: the triple is released once, by the module that built it.
        unsafe { release(bytes.data, bytes.len, bytes.capacity) };
    }
    copied
}

/// Read an option's payload according to its tag.
pub(crate) fn read_payload(raw: &RawOption) -> Result<OptionValue, String> {
    // SAFETY: the tag decides which union field the driver initialized.
    let value = unsafe {
        match raw.kind {
            OptionTag::INT => OptionValue::Int(raw.value.int),
            OptionTag::DOUBLE => OptionValue::Double(raw.value.double),
            OptionTag::BOOL => OptionValue::Bool(raw.value.boolean != 0),
            OptionTag::CHAR => {
                let code = raw.value.character;
                OptionValue::Char(
                    char::from_u32(code).ok_or_else(|| format!("{:#x} is not a character", code))?,
                )
            }
            OptionTag::STRING => {
                let string = raw.value.string;
                if string.is_null() {
                    OptionValue::String(None)
                } else {
                    let string = CStr::from_ptr(string)
                        .to_str()
                        .map_err(|e| format!("string is not valid UTF-8: {}", e))?;
                    OptionValue::String(Some(string.to_string()))
                }
            }
            OptionTag::CUSTOM => OptionValue::Custom(raw.value.custom),
            OptionTag(other) => return Err(format!("unknown option tag {}", other)),
        }
    };
    Ok(value)
}
