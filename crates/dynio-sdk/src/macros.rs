//! Declarative macros for driver modules.

/// Export a [`Driver`](crate::Driver) implementation from a module.
///
/// This generates the two entry points hosts look up by name,
/// `register_driver` and `deregister_driver`. Use it once per `cdylib`.
///
/// # Example
///
/// ```rust
/// use dynio_sdk::prelude::*;
///
/// struct Echo;
///
/// impl Driver for Echo {
///     type Value = Vec<u8>;
///     const NAME: &'static CStr = c"echo";
///
///     fn new() -> Self {
///         Echo
///     }
///
///     fn decode(&mut self, _: &Options<'_>, input: &[u8]) -> DriverResult<Vec<u8>> {
///         Ok(input.to_vec())
///     }
///
///     fn encode(&mut self, _: &Options<'_>, value: &Vec<u8>) -> DriverResult<Vec<u8>> {
///         Ok(value.clone())
///     }
/// }
///
/// export_driver!(Echo);
/// ```
#[macro_export]
macro_rules! export_driver {
    ($driver:ty) => {
        /// Constructor entry point.
        ///
        /// # Safety
        /// `out` must be null or valid for a pointer-sized write.
        #[no_mangle]
        pub unsafe extern "C" fn register_driver(out: *mut *mut $crate::abi::DriverDescriptor) {
            unsafe { $crate::trampoline::register::<$driver>(out) }
        }

        /// Destructor entry point.
        ///
        /// # Safety
        /// `inout` must hold null or a descriptor returned by
        /// `register_driver` that has not been released yet.
        #[no_mangle]
        pub unsafe extern "C" fn deregister_driver(
            inout: *mut *mut $crate::abi::DriverDescriptor,
        ) {
            unsafe { $crate::trampoline::deregister::<$driver>(inout) }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use crate::prelude::*;

    struct Nop;

    impl Driver for Nop {
        type Value = ();
        const NAME: &'static CStr = c"nop";

        fn new() -> Self {
            Nop
        }

        fn decode(&mut self, _: &Options<'_>, _: &[u8]) -> DriverResult<()> {
            Ok(())
        }

        fn encode(&mut self, _: &Options<'_>, _: &()) -> DriverResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    mod exported {
        crate::export_driver!(super::Nop);
    }

    #[test]
    fn test_export_driver_entry_points() {
        let mut descriptor = std::ptr::null_mut();
        unsafe {
            exported::register_driver(&mut descriptor);
            assert!(!descriptor.is_null());
            assert_eq!(CStr::from_ptr((*descriptor).name), c"nop");

            exported::deregister_driver(&mut descriptor);
        }
        assert!(descriptor.is_null());
    }
}
