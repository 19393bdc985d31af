//! Opened driver modules.
//!
//! [`ModuleOpener`] is the only place the loader touches the operating
//! system. The default [`NativeOpener`] maps shared libraries with
//! `libloading`; tests and embedders can substitute in-process modules.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use chrono::{DateTime, Utc};
use libloading::{Library, Symbol};

use crate::error::BoxError;

/// A successfully opened module.
///
/// Dropping the value closes the module.
pub trait Module: Send + Sync {
    /// Path the module was opened from.
    fn path(&self) -> &Path;

    /// Address of an exported symbol.
    fn symbol_address(&self, symbol: &str) -> Result<NonNull<c_void>, BoxError>;
}

/// Opens modules from paths.
pub trait ModuleOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>, BoxError>;
}

/// Opens shared libraries (.so, .dylib, .dll) with `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOpener;

impl ModuleOpener for NativeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>, BoxError> {
        // SAFETY: running a library's initializers is inherent to loading a
        // driver; the caller chose to trust the module at `path`.
        let library = unsafe { open_library(path)? };
        Ok(Box::new(NativeModule {
            path: path.to_path_buf(),
            library,
        }))
    }
}

/// Map a library with every symbol bound up front, so unresolved
/// dependencies fail here instead of inside the first driver call.
///
/// # Safety
/// Runs the library's initializers.
#[cfg(unix)]
unsafe fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    // SAFETY: forwarded to the caller.
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL)? };
    Ok(library.into())
}

/// # Safety
/// Runs the library's initializers.
#[cfg(not(unix))]
unsafe fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: forwarded to the caller.
    unsafe { Library::new(path) }
}

/// A shared library mapped by [`NativeOpener`].
pub struct NativeModule {
    path: PathBuf,
    library: Library,
}

impl Module for NativeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol_address(&self, symbol: &str) -> Result<NonNull<c_void>, BoxError> {
        // SAFETY: the symbol is read as an untyped address only; the loader
        // reinterprets it in `raw`.
        let address: Symbol<*mut c_void> = unsafe { self.library.get(symbol.as_bytes())? };
        NonNull::new(*address).ok_or_else(|| format!("symbol `{}` resolves to null", symbol).into())
    }
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule").field("path", &self.path).finish()
    }
}

/// Module reference shared by every handle sourced from one opened module.
///
/// The module stays mapped until the last [`Arc`](std::sync::Arc) to this
/// value is dropped.
pub struct LoadedModule {
    key: PathBuf,
    loaded_at: DateTime<Utc>,
    module: Box<dyn Module>,
}

impl LoadedModule {
    pub(crate) fn new(key: PathBuf, module: Box<dyn Module>) -> Self {
        Self {
            key,
            loaded_at: Utc::now(),
            module,
        }
    }

    /// Registry key: the canonical path when it could be resolved.
    pub fn key(&self) -> &Path {
        &self.key
    }

    /// Path the module was opened from.
    pub fn path(&self) -> &Path {
        self.module.path()
    }

    /// When the module was opened.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub(crate) fn symbol_address(&self, symbol: &str) -> Result<NonNull<c_void>, BoxError> {
        self.module.symbol_address(symbol)
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        tracing::info!(path = %self.key.display(), "Unmapping driver module");
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("key", &self.key)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Whether `path` has the platform's shared library extension.
pub fn is_module_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
}

/// Platform file name for a driver name, e.g. `libcsv.so` for `csv`.
pub fn module_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_open_missing_file() {
        let result = NativeOpener.open(Path::new("/nonexistent/path/to/libdriver.so"));
        assert!(result.is_err());
    }

    #[test]
    fn test_is_module_file() {
        #[cfg(target_os = "macos")]
        {
            assert!(is_module_file(Path::new("libcsv.dylib")));
            assert!(!is_module_file(Path::new("libcsv.so")));
        }

        #[cfg(target_os = "linux")]
        {
            assert!(is_module_file(Path::new("libcsv.so")));
            assert!(!is_module_file(Path::new("libcsv.dylib")));
        }

        #[cfg(windows)]
        {
            assert!(is_module_file(Path::new("csv.dll")));
            assert!(!is_module_file(Path::new("csv.so")));
        }

        assert!(!is_module_file(Path::new("csv.toml")));
        assert!(!is_module_file(Path::new("csv")));
    }

    #[test]
    fn test_module_file_name() {
        #[cfg(target_os = "linux")]
        assert_eq!(module_file_name("csv"), "libcsv.so");

        #[cfg(target_os = "macos")]
        assert_eq!(module_file_name("csv"), "libcsv.dylib");

        #[cfg(windows)]
        assert_eq!(module_file_name("csv"), "csv.dll");
    }
}
