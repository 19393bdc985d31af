//! Loader configuration.
//!
//! Configuration comes from a TOML or JSON file, then environment variables
//! override individual fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable names
pub mod env_vars {
    /// Extra search directories, separated like `PATH`. Searched first.
    pub const DRIVER_PATH: &str = "DYNIO_DRIVER_PATH";
    /// `true`/`false`: reuse an already mapped module for repeated loads.
    pub const SHARE_MODULES: &str = "DYNIO_SHARE_MODULES";
}

/// Settings of a [`DriverLoader`](crate::DriverLoader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directories searched when a driver is loaded by name.
    pub search_paths: Vec<PathBuf>,
    /// Reuse the mapped module when the same path is loaded again.
    pub share_modules: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            share_modules: true,
        }
    }
}

impl LoaderConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a file; the format follows the extension (`.toml` or `.json`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(Error::Config(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Apply [`env_vars`] overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        let driver_path = std::env::var(env_vars::DRIVER_PATH).ok();
        let share_modules = std::env::var(env_vars::SHARE_MODULES).ok();
        self.apply_overrides(driver_path.as_deref(), share_modules.as_deref())
    }

    fn apply_overrides(mut self, driver_path: Option<&str>, share_modules: Option<&str>) -> Self {
        if let Some(paths) = driver_path {
            let mut search_paths: Vec<PathBuf> = std::env::split_paths(paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            search_paths.append(&mut self.search_paths);
            self.search_paths = search_paths;
        }

        if let Some(value) = share_modules {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.share_modules = true,
                "0" | "false" | "no" => self.share_modules = false,
                other => tracing::warn!(
                    var = env_vars::SHARE_MODULES,
                    value = other,
                    "Ignoring unrecognized boolean"
                ),
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert!(config.search_paths.is_empty());
        assert!(config.share_modules);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"search_paths = ["/opt/dynio/drivers"]"#;
        let config = LoaderConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.search_paths, vec![PathBuf::from("/opt/dynio/drivers")]);
        assert!(config.share_modules);
    }

    #[test]
    fn test_invalid_toml() {
        let err = LoaderConfig::from_toml_str("share_modules = \"sometimes\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("loader.json");
        std::fs::File::create(&json_path)
            .unwrap()
            .write_all(br#"{"share_modules": false}"#)
            .unwrap();
        assert!(!LoaderConfig::from_file(&json_path).unwrap().share_modules);

        let toml_path = dir.path().join("loader.toml");
        let toml = "share_modules = false\nsearch_paths = [\"drivers\"]\n";
        std::fs::write(&toml_path, toml).unwrap();
        let config = LoaderConfig::from_file(&toml_path).unwrap();
        assert!(!config.share_modules);
        assert_eq!(config.search_paths, vec![PathBuf::from("drivers")]);

        let yaml_path = dir.path().join("loader.yaml");
        std::fs::write(&yaml_path, "share_modules: false\n").unwrap();
        assert!(matches!(
            LoaderConfig::from_file(&yaml_path),
            Err(Error::Config(_))
        ));

        assert!(matches!(
            LoaderConfig::from_file(dir.path().join("missing.toml")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let base = LoaderConfig {
            search_paths: vec![PathBuf::from("/configured")],
            share_modules: true,
        };

        let joined = std::env::join_paths(["/env/a", "/env/b"]).unwrap();
        let config = base
            .clone()
            .apply_overrides(joined.to_str(), Some("false"));
        assert_eq!(
            config.search_paths,
            vec![
                PathBuf::from("/env/a"),
                PathBuf::from("/env/b"),
                PathBuf::from("/configured"),
            ]
        );
        assert!(!config.share_modules);

        let unchanged = base.clone().apply_overrides(None, Some("maybe"));
        assert_eq!(unchanged, base);
    }
}
