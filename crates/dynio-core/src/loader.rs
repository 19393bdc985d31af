//! Driver loader.
//!
//! Opens a module, resolves its two registration entry points, runs the
//! constructor and hands out an owning [`DriverHandle`]. Every failure path
//! leaves nothing behind: a descriptor that was produced is destroyed and
//! the module is closed unless another handle still uses it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dynio_sdk::{DEREGISTER_SYMBOL, REGISTER_SYMBOL};

use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::handle::DriverHandle;
use crate::module::{is_module_file, module_file_name, ModuleOpener, NativeOpener};
use crate::raw::{self, OwnedDescriptor};
use crate::registry::{global_registry, ModuleRegistry};

/// Loads drivers from modules.
pub struct DriverLoader {
    config: LoaderConfig,
    registry: Arc<ModuleRegistry>,
    opener: Arc<dyn ModuleOpener>,
}

impl DriverLoader {
    /// Loader with default settings, the process-wide registry and native
    /// shared library loading.
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self {
            config,
            registry: global_registry(),
            opener: Arc::new(NativeOpener),
        }
    }

    /// Loader configured from the environment on top of the defaults.
    pub fn from_env() -> Self {
        Self::with_config(LoaderConfig::default().with_env_overrides())
    }

    /// Use a dedicated registry instead of the process-wide one.
    pub fn with_registry(mut self, registry: Arc<ModuleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use another way of opening modules.
    pub fn with_opener(mut self, opener: Arc<dyn ModuleOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Append a directory to the search paths.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.config.search_paths.push(path.into());
    }

    /// Load a driver from the module at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<DriverHandle> {
        let path = path.as_ref();
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let module = self
            .registry
            .get_or_open(&key, self.config.share_modules, || self.opener.open(path))
            .map_err(|source| Error::ModuleNotFound {
                path: path.to_path_buf(),
                source,
            })?;

        let resolve = |symbol: &'static str| {
            module
                .symbol_address(symbol)
                .map_err(|source| Error::MissingEntryPoint {
                    symbol,
                    path: path.to_path_buf(),
                    source,
                })
        };
        let register = resolve(REGISTER_SYMBOL)?;
        let deregister = resolve(DEREGISTER_SYMBOL)?;

        // SAFETY: a module exporting these symbols is trusted to implement
        // the registration ABI. `module` is kept alive by the handle for as
        // long as the entry points and descriptor are used.
        let descriptor = unsafe {
            let (register, deregister) = raw::entry_points(register, deregister);
            OwnedDescriptor::construct(register, deregister)
        }
        .map_err(|reason| Error::ConstructionFailed {
            path: path.to_path_buf(),
            reason,
        })?;

        tracing::info!(
            driver = descriptor.name(),
            path = %path.display(),
            "Loaded driver"
        );
        Ok(DriverHandle::new(descriptor, module))
    }

    /// Load a driver and assert its value type in one step.
    ///
    /// # Safety
    /// Same contract as [`DriverHandle::narrow`], including its allocator
    /// requirement: values of `T` decoded by the module are freed by the host.
    pub unsafe fn load_typed<T>(&self, path: impl AsRef<Path>) -> Result<DriverHandle<T>> {
        let handle = self.load(path)?;
        // SAFETY: forwarded to the caller.
        Ok(unsafe { handle.narrow() })
    }

    /// Find a driver's module in the search paths and load it.
    pub fn load_by_name(&self, name: &str) -> Result<DriverHandle> {
        let path = self.resolve(name)?;
        self.load(path)
    }

    /// Path of the module for driver `name`.
    ///
    /// `name` is either a bare driver name (`csv` finds `libcsv.so` on
    /// Linux) or a module file name. The first search path that has it wins.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let file_name = if is_module_file(Path::new(name)) {
            name.to_string()
        } else {
            module_file_name(name)
        };

        self.config
            .search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::DriverNotFound {
                name: name.to_string(),
                searched: self.config.search_paths.clone(),
            })
    }

    /// Module files found in the search paths, sorted.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();

        for dir in &self.config.search_paths {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!(path = %dir.display(), error = %e, "Skipping search path");
                    continue;
                }
            };

            found.extend(
                entries
                    .flatten()
                    .map(|entry| entry.path())
                    .filter(|path| path.is_file() && is_module_file(path)),
            );
        }

        found.sort();
        found.dedup();
        found
    }
}

impl Default for DriverLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a driver with a default [`DriverLoader`].
pub fn load(path: impl AsRef<Path>) -> Result<DriverHandle> {
    DriverLoader::new().load(path)
}
