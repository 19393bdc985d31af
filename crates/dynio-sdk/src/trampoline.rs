//! `extern "C"` trampolines between the descriptor ABI and [`Driver`].
//!
//! All pointer reinterpretation on the module side of the boundary happens
//! here. Panics are stopped before they reach foreign frames: a panicking
//! constructor yields a null descriptor, a panicking decode/encode yields
//! [`DriverStatus::PANICKED`], and a panicking destructor aborts the process
//! since no consistent state is left to report.

use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

use crate::abi::{DriverBytes, DriverDescriptor, DriverStatus, RawOption};
use crate::driver::{Driver, Options};

/// State stored behind `DriverDescriptor::internals`.
struct DriverState<D> {
    driver: D,
    options: Box<[RawOption]>,
}

/// Build a descriptor for `D` and write it through `out`.
///
/// # Safety
/// `out` must be null or valid for a pointer-sized write.
pub unsafe fn register<D: Driver>(out: *mut *mut DriverDescriptor) {
    if out.is_null() {
        return;
    }

    let built = panic::catch_unwind(|| {
        let state = Box::new(DriverState {
            driver: D::new(),
            options: D::options()
                .into_iter()
                .map(|spec| spec.into_raw())
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        });

        Box::into_raw(Box::new(DriverDescriptor {
            name: D::NAME.as_ptr(),
            option: Some(option::<D>),
            decode: Some(decode::<D>),
            encode: Some(encode::<D>),
            internals: Box::into_raw(state).cast::<c_void>(),
        }))
    });

    let descriptor = match built {
        Ok(descriptor) => descriptor,
        Err(_) => {
            tracing::error!(driver = ?D::NAME, "driver constructor panicked");
            ptr::null_mut()
        }
    };

    // SAFETY: checked non-null above; the caller guarantees it is writable.
    unsafe { out.write(descriptor) };
}

/// Free a descriptor built by [`register`] and null out the caller's pointer.
///
/// # Safety
/// `inout` must be null or point to null or to a descriptor produced by
/// `register::<D>` that has not been deregistered yet.
pub unsafe fn deregister<D: Driver>(inout: *mut *mut DriverDescriptor) {
    if inout.is_null() {
        return;
    }
    // SAFETY: checked non-null; the caller guarantees it is readable.
    let descriptor = unsafe { inout.read() };
    if descriptor.is_null() {
        return;
    }

    let freed = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the descriptor and its internals were leaked from boxes
        // by `register::<D>` and are released exactly once here.
        unsafe {
            let descriptor = Box::from_raw(descriptor);
            if !descriptor.internals.is_null() {
                drop(Box::from_raw(descriptor.internals.cast::<DriverState<D>>()));
            }
        }
    }));

    // SAFETY: see above.
    unsafe { inout.write(ptr::null_mut()) };

    if freed.is_err() {
        tracing::error!(driver = ?D::NAME, "driver destructor panicked, aborting");
        std::process::abort();
    }
}

/// # Safety
/// `this` must be null or a live descriptor produced by `register::<D>`.
unsafe fn state_mut<'a, D: Driver>(this: *mut DriverDescriptor) -> Option<&'a mut DriverState<D>> {
    // SAFETY: guaranteed by the caller.
    unsafe {
        let descriptor = this.as_mut()?;
        descriptor.internals.cast::<DriverState<D>>().as_mut()
    }
}

unsafe extern "C" fn option<D: Driver>(
    this: *mut DriverDescriptor,
    name: *const c_char,
) -> *mut RawOption {
    if name.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: the host passes the descriptor it received from `register`
    // and a NUL-terminated name.
    let (state, name) = match unsafe { state_mut::<D>(this) } {
        Some(state) => (state, unsafe { CStr::from_ptr(name) }),
        None => return ptr::null_mut(),
    };

    state
        .options
        .iter_mut()
        // SAFETY: option names are static C strings from `OptionSpec`.
        .find(|option| unsafe { CStr::from_ptr(option.name) } == name)
        .map_or(ptr::null_mut(), |option| option as *mut RawOption)
}

unsafe extern "C" fn decode<D: Driver>(
    this: *mut DriverDescriptor,
    input: *const u8,
    input_len: usize,
    output: *mut c_void,
) -> DriverStatus {
    if output.is_null() || (input.is_null() && input_len != 0) {
        return DriverStatus::INVALID_INPUT;
    }
    // SAFETY: the host passes the descriptor it received from `register`.
    let Some(state) = (unsafe { state_mut::<D>(this) }) else {
        return DriverStatus::FAILED;
    };
    let input = if input_len == 0 {
        &[][..]
    } else {
        // SAFETY: the host guarantees `input[..input_len]` is readable for
        // the duration of the call; nothing retains it afterwards.
        unsafe { slice::from_raw_parts(input, input_len) }
    };

    let DriverState { driver, options } = state;
    let options = Options::new(&options[..]);
    match panic::catch_unwind(AssertUnwindSafe(|| driver.decode(&options, input))) {
        Ok(Ok(value)) => {
            // SAFETY: the host provides uninitialized storage for `D::Value`.
            unsafe { output.cast::<D::Value>().write(value) };
            DriverStatus::OK
        }
        Ok(Err(e)) => {
            tracing::debug!(driver = ?D::NAME, error = %e, "decode failed");
            e.status()
        }
        Err(_) => DriverStatus::PANICKED,
    }
}

unsafe extern "C" fn encode<D: Driver>(
    this: *mut DriverDescriptor,
    input: *const c_void,
    output: *mut DriverBytes,
) -> DriverStatus {
    if input.is_null() || output.is_null() {
        return DriverStatus::INVALID_INPUT;
    }
    // SAFETY: the host passes the descriptor it received from `register`.
    let Some(state) = (unsafe { state_mut::<D>(this) }) else {
        return DriverStatus::FAILED;
    };
    // SAFETY: the host passes a live `D::Value` for the duration of the call.
    let value = unsafe { &*input.cast::<D::Value>() };

    let DriverState { driver, options } = state;
    let options = Options::new(&options[..]);
    match panic::catch_unwind(AssertUnwindSafe(|| driver.encode(&options, value))) {
        Ok(Ok(bytes)) => {
            // SAFETY: `output` is non-null and writable per the contract.
            unsafe { output.write(DriverBytes::from_vec(bytes)) };
            DriverStatus::OK
        }
        Ok(Err(e)) => {
            tracing::debug!(driver = ?D::NAME, error = %e, "encode failed");
            e.status()
        }
        Err(_) => DriverStatus::PANICKED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::OptionSpec;
    use crate::error::{DriverError, DriverResult};

    struct Upper;

    impl Driver for Upper {
        type Value = String;
        const NAME: &'static CStr = c"upper";

        fn new() -> Self {
            Upper
        }

        fn options() -> Vec<OptionSpec> {
            vec![OptionSpec::bool(c"enabled", true)]
        }

        fn decode(&mut self, options: &Options<'_>, input: &[u8]) -> DriverResult<String> {
            let text = std::str::from_utf8(input)?;
            if text == "panic" {
                panic!("requested");
            }
            Ok(if options.bool("enabled").unwrap_or(true) {
                text.to_uppercase()
            } else {
                text.to_string()
            })
        }

        fn encode(&mut self, _options: &Options<'_>, _value: &String) -> DriverResult<Vec<u8>> {
            Err(DriverError::Unsupported("encode".into()))
        }
    }

    fn registered() -> *mut DriverDescriptor {
        let mut descriptor = ptr::null_mut();
        unsafe { register::<Upper>(&mut descriptor) };
        assert!(!descriptor.is_null());
        descriptor
    }

    #[test]
    fn test_register_and_deregister() {
        let mut descriptor = registered();
        let name = unsafe { CStr::from_ptr((*descriptor).name) };
        assert_eq!(name, c"upper");

        unsafe { deregister::<Upper>(&mut descriptor) };
        assert!(descriptor.is_null());

        // A second call sees null and does nothing.
        unsafe { deregister::<Upper>(&mut descriptor) };
    }

    #[test]
    fn test_decode_with_option() {
        let mut descriptor = registered();
        let input = b"abc";
        unsafe {
            let decode = (*descriptor).decode.unwrap();
            let mut out = std::mem::MaybeUninit::<String>::uninit();
            let status = decode(descriptor, input.as_ptr(), input.len(), out.as_mut_ptr().cast());
            assert_eq!(status, DriverStatus::OK);
            assert_eq!(out.assume_init(), "ABC");

            let option = (*descriptor).option.unwrap()(descriptor, c"enabled".as_ptr());
            assert!(!option.is_null());
            (*option).value.boolean = 0;

            let mut out = std::mem::MaybeUninit::<String>::uninit();
            let status = decode(descriptor, input.as_ptr(), input.len(), out.as_mut_ptr().cast());
            assert_eq!(status, DriverStatus::OK);
            assert_eq!(out.assume_init(), "abc");

            deregister::<Upper>(&mut descriptor);
        }
    }

    #[test]
    fn test_unknown_option_is_null() {
        let mut descriptor = registered();
        unsafe {
            let option = (*descriptor).option.unwrap()(descriptor, c"missing".as_ptr());
            assert!(option.is_null());
            deregister::<Upper>(&mut descriptor);
        }
    }

    #[test]
    fn test_failures_become_status() {
        let mut descriptor = registered();
        unsafe {
            let decode = (*descriptor).decode.unwrap();
            let mut out = std::mem::MaybeUninit::<String>::uninit();

            let bad = [0xff, 0xfe];
            let status = decode(descriptor, bad.as_ptr(), bad.len(), out.as_mut_ptr().cast());
            assert_eq!(status, DriverStatus::INVALID_INPUT);

            let boom = b"panic";
            let status = decode(descriptor, boom.as_ptr(), boom.len(), out.as_mut_ptr().cast());
            assert_eq!(status, DriverStatus::PANICKED);

            let value = String::from("x");
            let mut bytes = DriverBytes::empty();
            let status = (*descriptor).encode.unwrap()(
                descriptor,
                (&value as *const String).cast(),
                &mut bytes,
            );
            assert_eq!(status, DriverStatus::UNSUPPORTED);
            assert!(bytes.data.is_null());

            deregister::<Upper>(&mut descriptor);
        }
    }
}
