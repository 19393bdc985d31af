//! Typed handles to loaded drivers.

use std::any::type_name;
use std::ffi::{CStr, CString};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::module::LoadedModule;
use crate::option::DriverOption;
use crate::raw::OwnedDescriptor;

/// Marker for a handle whose value type has not been asserted yet.
///
/// It is unsized, so `read`/`write` (which need a sized value type) are not
/// available until the handle is narrowed.
pub struct Untyped {
    _opaque: [u8],
}

/// Owning handle to one driver instance.
///
/// Dropping the handle destroys the driver through its module and then
/// releases the handle's reference to the module; the module is unmapped
/// once no handle sourced from it remains. Handles are not `Send`: drivers
/// are not required to be thread-safe.
///
/// Strings written through [`DriverOption::set_string`] are kept until the
/// handle is dropped, one copy per distinct value.
pub struct DriverHandle<T: ?Sized = Untyped> {
    // Field order is drop order: the descriptor must go before the module.
    descriptor: OwnedDescriptor,
    strings: Vec<CString>,
    module: Arc<LoadedModule>,
    _value: PhantomData<*const T>,
}

impl<T: ?Sized> DriverHandle<T> {
    /// Driver name reported by the descriptor.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Path of the module the driver came from.
    pub fn module_path(&self) -> &Path {
        self.module.path()
    }

    /// The module this driver came from.
    pub fn module(&self) -> &Arc<LoadedModule> {
        &self.module
    }

    /// Look up an option by name.
    ///
    /// Returns `None` when the driver has no such option.
    pub fn option(&mut self, name: &str) -> Option<DriverOption<'_>> {
        let key = CString::new(name).ok()?;
        let driver = self.descriptor.name().to_string();
        let raw = self.descriptor.option(&key)?;

        // A driver that answers with a differently named option is treated
        // as not having the one asked for.
        // SAFETY: option names are NUL-terminated strings owned by the driver.
        let matches =
            !raw.name.is_null() && unsafe { CStr::from_ptr(raw.name) } == key.as_c_str();
        if !matches {
            tracing::warn!(
                driver = %driver,
                option = name,
                "Driver returned an option with another name"
            );
            return None;
        }

        Some(DriverOption::new(name, raw, &mut self.strings))
    }
}

impl<T> DriverHandle<T> {
    /// Decode `input` into a value.
    pub fn read(&mut self, input: &[u8]) -> Result<T> {
        // SAFETY: `T` was asserted as this driver's value type in `narrow`.
        unsafe { self.descriptor.decode::<T>(input) }.map_err(|status| {
            tracing::debug!(driver = self.name(), %status, "Decode failed");
            Error::DecodeFailed {
                driver: self.name().to_string(),
                status,
            }
        })
    }

    /// Encode `value` into bytes.
    pub fn write(&mut self, value: &T) -> Result<Vec<u8>> {
        // SAFETY: `T` was asserted as this driver's value type in `narrow`.
        unsafe { self.descriptor.encode(value) }.map_err(|status| {
            tracing::debug!(driver = self.name(), %status, "Encode failed");
            Error::EncodeFailed {
                driver: self.name().to_string(),
                status,
            }
        })
    }
}

impl DriverHandle<Untyped> {
    pub(crate) fn new(descriptor: OwnedDescriptor, module: Arc<LoadedModule>) -> Self {
        Self {
            descriptor,
            strings: Vec::new(),
            module,
            _value: PhantomData,
        }
    }

    /// Assert the driver's value type.
    ///
    /// The driver is moved into the returned handle; nothing is destroyed or
    /// constructed.
    ///
    /// # Safety
    /// `U` must be exactly the type the driver decodes into and encodes from,
    /// with the same layout on both sides of the module boundary.
    ///
    /// A decoded `U` may own heap memory allocated inside the module and is
    /// dropped by the host, so the module and the host must share one global
    /// allocator: neither side may install its own `#[global_allocator]`.
    /// Rust drivers built as `cdylib` use the system allocator by default.
    pub unsafe fn narrow<U>(self) -> DriverHandle<U> {
        let DriverHandle {
            descriptor,
            strings,
            module,
            _value,
        } = self;
        DriverHandle {
            descriptor,
            strings,
            module,
            _value: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for DriverHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("name", &self.name())
            .field("value", &type_name::<T>())
            .field("module", &self.module_path())
            .finish()
    }
}
