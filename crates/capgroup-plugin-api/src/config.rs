//! Loader configuration.
//!
//! Sources, lowest precedence first: built-in defaults or a TOML file, the
//! `CAPGROUP_PLUGIN_DIR` environment variable, and whatever the caller applies through the
//! `with_*` builders. Search paths from a higher source are searched first.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Environment variable holding extra plugin directories, separated like `PATH`.
pub const PLUGIN_DIR_ENV: &str = "CAPGROUP_PLUGIN_DIR";

/// File name looked up under the user config directory.
pub const CONFIG_FILE_NAME: &str = "loader.toml";

const DEFAULT_MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How plugins are located and validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directories searched in order for a bare plugin name.
    pub search_paths: Vec<PathBuf>,

    /// Compare every layout entry instead of only the ABI version and fingerprint.
    pub require_exact_layout: bool,

    /// Maximum plugin file size in bytes.
    pub max_file_size: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
            require_exact_layout: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Directory of the running executable, plus its parent when the executable is a test binary
/// under `target/<profile>/deps`.
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        if dir.ends_with("deps") {
            if let Some(parent) = dir.parent() {
                paths.push(parent.to_path_buf());
            }
        }
        paths.push(dir);
    }
    paths
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the directories from `CAPGROUP_PLUGIN_DIR` searched first.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Put the directories from `CAPGROUP_PLUGIN_DIR` in front of the current search paths.
    pub fn apply_env(self) -> Self {
        match std::env::var_os(PLUGIN_DIR_ENV) {
            Some(dirs) => self.with_env_paths(&dirs),
            None => self,
        }
    }

    fn with_env_paths(mut self, dirs: &std::ffi::OsStr) -> Self {
        let mut paths: Vec<PathBuf> = std::env::split_paths(dirs)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        paths.append(&mut self.search_paths);
        self.search_paths = paths;
        self
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// `<config dir>/capgroup/loader.toml`, if the platform has a config directory.
    pub fn default_config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("capgroup").join(CONFIG_FILE_NAME))
    }

    /// Prepend a search directory so it wins over the existing ones.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.insert(0, path.into());
        self
    }

    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn with_exact_layout(mut self, exact: bool) -> Self {
        self.require_exact_layout = exact;
        self
    }

    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Check that `path` looks like a loadable plugin.
    pub fn validate_path(&self, path: &Path) -> Result<(), LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.display().to_string()));
        }

        let invalid = |reason: String| LoadError::Path {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(invalid("not a file".into()));
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if ext != std::env::consts::DLL_EXTENSION {
            return Err(invalid(format!(
                "invalid extension {ext:?}, expected {:?}",
                std::env::consts::DLL_EXTENSION
            )));
        }

        let size = std::fs::metadata(path)
            .map_err(|e| invalid(format!("cannot read metadata: {e}")))?
            .len();
        if size > self.max_file_size {
            return Err(invalid(format!(
                "file too large: {size} bytes (max: {})",
                self.max_file_size
            )));
        }

        Ok(())
    }
}
