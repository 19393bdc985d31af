//! Process-wide table of open driver modules.
//!
//! The registry only holds weak references: it never keeps a module mapped
//! on its own. It lets a second load of the same path reuse the mapped module
//! and gives hosts a view of what is currently open.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::BoxError;
use crate::module::{LoadedModule, Module};

/// Snapshot of one open module.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModuleInfo {
    /// Registry key (canonical path when available)
    pub path: PathBuf,
    /// When the module was opened
    pub loaded_at: DateTime<Utc>,
    /// Number of live references (one per handle plus in-flight loads)
    pub references: usize,
}

/// Registry of open modules keyed by path.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Mutex<HashMap<PathBuf, Vec<Weak<LoadedModule>>>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the open module for `key`, or open it with `open`.
    ///
    /// With `share` disabled a fresh module is always opened; it is still
    /// tracked so that it shows up in [`open_modules`](Self::open_modules).
    ///
    /// `open` runs without the registry lock held, so library initializers
    /// may load drivers themselves. When two threads open the same shared key
    /// at once, the first to finish wins and the other module is closed.
    pub(crate) fn get_or_open<F>(
        &self,
        key: &Path,
        share: bool,
        open: F,
    ) -> Result<Arc<LoadedModule>, BoxError>
    where
        F: FnOnce() -> Result<Box<dyn Module>, BoxError>,
    {
        if share {
            if let Some(existing) = self.find_live(key) {
                tracing::debug!(path = %key.display(), "Reusing open driver module");
                return Ok(existing);
            }
        }

        let module = Arc::new(LoadedModule::new(key.to_path_buf(), open()?));

        let mut modules = self.modules.lock();
        prune(&mut modules);
        let entries = modules.entry(key.to_path_buf()).or_default();
        if share {
            if let Some(existing) = entries.iter().find_map(Weak::upgrade) {
                drop(modules);
                tracing::debug!(path = %key.display(), "Driver module opened meanwhile, reusing");
                return Ok(existing);
            }
        }
        entries.push(Arc::downgrade(&module));
        drop(modules);

        tracing::debug!(path = %key.display(), "Opened driver module");
        Ok(module)
    }

    fn find_live(&self, key: &Path) -> Option<Arc<LoadedModule>> {
        self.modules
            .lock()
            .get(key)
            .and_then(|entries| entries.iter().find_map(Weak::upgrade))
    }

    /// Whether a module with this key is currently mapped.
    pub fn is_open(&self, key: &Path) -> bool {
        self.modules
            .lock()
            .get(key)
            .is_some_and(|entries| entries.iter().any(|entry| entry.strong_count() > 0))
    }

    /// Number of currently mapped modules.
    pub fn open_count(&self) -> usize {
        self.modules
            .lock()
            .values()
            .flatten()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    /// Snapshot of the currently mapped modules, sorted by path.
    pub fn open_modules(&self) -> Vec<ModuleInfo> {
        let modules = self.modules.lock();
        let mut infos: Vec<ModuleInfo> = modules
            .values()
            .flatten()
            .filter_map(Weak::upgrade)
            .map(|module| ModuleInfo {
                path: module.key().to_path_buf(),
                loaded_at: module.loaded_at(),
                // Minus the temporary reference taken by `upgrade`.
                references: Arc::strong_count(&module) - 1,
            })
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }

    /// Forget every tracked module.
    ///
    /// Modules still referenced by handles stay mapped until those handles
    /// are dropped. Returns how many such modules remained.
    pub fn shutdown(&self) -> usize {
        let mut modules = self.modules.lock();
        let live = modules
            .values()
            .flatten()
            .filter(|entry| entry.strong_count() > 0)
            .count();
        modules.clear();

        if live > 0 {
            tracing::warn!(live, "Driver registry shut down with modules still in use");
        } else {
            tracing::debug!("Driver registry shut down");
        }
        live
    }
}

fn prune(modules: &mut HashMap<PathBuf, Vec<Weak<LoadedModule>>>) {
    modules.retain(|_, entries| {
        entries.retain(|entry| entry.strong_count() > 0);
        !entries.is_empty()
    });
}

static GLOBAL_REGISTRY: Lazy<Arc<ModuleRegistry>> = Lazy::new(|| Arc::new(ModuleRegistry::new()));

/// Get the process-wide module registry, initializing it on first use.
pub fn global_registry() -> Arc<ModuleRegistry> {
    Arc::clone(&GLOBAL_REGISTRY)
}

/// Tear down the process-wide registry. Call once at process exit.
pub fn shutdown() -> usize {
    GLOBAL_REGISTRY.shutdown()
}
