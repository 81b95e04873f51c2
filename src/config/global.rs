//! User-wide defaults for recipe rendering.
//!
//! This module handles the global user configuration file (`~/.recipe-render/config.toml`)
//! which stores defaults a user would otherwise repeat on every invocation: the build
//! root, language versions, the interpreter used for build-description scripts, and the
//! variant configuration files always applied.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.recipe-render/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\recipe-render\config.toml`
//!
//! The location can be overridden with the `RECIPE_RENDER_CONFIG` environment variable or
//! the `--config` flag.
//!
//! # File Format
//!
//! ```toml
//! croot = "~/conda-bld"
//! python = "3.6"
//! numpy = "1.11"
//! python_exe = "$HOME/miniconda/bin/python"
//! variant_config_files = ["~/variants/common.yaml"]
//! ```
//!
//! Path values are expanded with `~` and `$VAR` substitution.
//!
//! # Examples
//!
//! ```rust,no_run
//! use recipe_render::config::GlobalConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GlobalConfig::load().await?;
//! println!("python default: {:?}", config.python);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::constants::CONFIG_PATH_ENV;

/// Global configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Build root holding work and environment directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub croot: Option<String>,

    /// Default Python version (`3.6`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,

    /// Default NumPy version (`1.11`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numpy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perl: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lua: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_base: Option<String>,

    /// Interpreter used to execute `setup.py`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_exe: Option<String>,

    /// Variant configuration files applied before any given with `-m`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variant_config_files: Vec<String>,
}

impl GlobalConfig {
    /// Load from the default location, or return defaults if no file exists.
    ///
    /// `RECIPE_RENDER_CONFIG` takes precedence over the platform default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, else from the default location.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(path) => PathBuf::from(path),
                None => Self::default_path()?,
            },
        };
        if path.exists() {
            tracing::debug!("Loading global config from {}", path.display());
            Self::load_from(&path).await
        } else {
            tracing::debug!("No global config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Save to a specific file path, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))
    }

    /// Platform-appropriate default location of the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("recipe-render")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".recipe-render")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Build root with `~` and environment variables expanded.
    #[must_use]
    pub fn croot_path(&self) -> Option<PathBuf> {
        self.croot.as_deref().map(expand_path)
    }

    /// Interpreter override with `~` and environment variables expanded.
    #[must_use]
    pub fn python_exe_path(&self) -> Option<PathBuf> {
        self.python_exe.as_deref().map(expand_path)
    }

    /// Default variant configuration files, expanded.
    #[must_use]
    pub fn variant_config_paths(&self) -> Vec<PathBuf> {
        self.variant_config_files.iter().map(|p| expand_path(p)).collect()
    }
}

/// Expand `~` and `$VAR`; undefined variables leave the input untouched.
fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_global_config_default() {
        let config = GlobalConfig::default();
        assert!(config.python.is_none());
        assert!(config.variant_config_files.is_empty());
    }

    #[tokio::test]
    async fn test_global_config_save_load() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("nested").join("config.toml");

        let config = GlobalConfig {
            python: Some("2.7".to_string()),
            variant_config_files: vec!["/etc/variants.yaml".to_string()],
            ..GlobalConfig::default()
        };
        config.save_to(&config_path).await.unwrap();

        let loaded = GlobalConfig::load_from(&config_path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = GlobalConfig::load_with_optional(Some(temp.path().join("absent.toml")))
            .await
            .unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "python = [unterminated").unwrap();
        assert!(GlobalConfig::load_from(&path).await.is_err());
    }

    #[test]
    fn test_paths_are_expanded() {
        let config = GlobalConfig {
            croot: Some("~/bld".to_string()),
            python_exe: Some("/usr/bin/python3".to_string()),
            ..GlobalConfig::default()
        };
        let croot = config.croot_path().unwrap();
        assert!(!croot.to_string_lossy().starts_with('~'));
        assert!(croot.ends_with("bld"));
        assert_eq!(config.python_exe_path(), Some(PathBuf::from("/usr/bin/python3")));
    }
}
