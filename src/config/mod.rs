//! Build configuration consumed by every rendering component.
//!
//! [`Config`] describes the build environment a recipe is rendered for: target platform,
//! architecture, the build root and work directory, the build prefix holding installed
//! dependencies, and the language versions selectors and environment variables are
//! derived from. It is owned by whoever manages the build environment; the renderer only
//! reads it.
//!
//! [`GlobalConfig`] holds the user's defaults from `~/.recipe-render/config.toml` and is
//! folded into a [`Config`] with [`Config::from_global`].
//!
//! # Examples
//!
//! ```rust
//! use recipe_render::config::{Config, Platform};
//!
//! let config = Config::for_subdir("linux-64").unwrap();
//! assert_eq!(config.platform, Platform::Linux);
//! assert_eq!(config.subdir(), "linux-64");
//! assert_eq!(config.bits(), 64);
//! ```

mod global;

pub use global::GlobalConfig;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::{DEFAULT_LUA, DEFAULT_NUMPY, DEFAULT_PERL, DEFAULT_PYTHON, DEFAULT_R};
use crate::core::RenderError;

/// Operating-system family a recipe is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Osx,
    Win,
}

impl Platform {
    /// The platform this binary was compiled for.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_os = "windows") {
            Self::Win
        } else if cfg!(target_os = "macos") {
            Self::Osx
        } else {
            Self::Linux
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Osx => "osx",
            Self::Win => "win",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Self::Linux),
            "osx" | "darwin" | "macos" => Ok(Self::Osx),
            "win" | "windows" => Ok(Self::Win),
            other => Err(RenderError::UnsupportedPlatform {
                platform: other.to_string(),
            }),
        }
    }
}

/// Versions of the language runtimes a build targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageVersions {
    pub python: Option<String>,
    pub numpy: Option<String>,
    pub perl: Option<String>,
    pub lua: Option<String>,
    pub r_base: Option<String>,
}

impl Default for LanguageVersions {
    fn default() -> Self {
        Self {
            python: Some(DEFAULT_PYTHON.to_string()),
            numpy: Some(DEFAULT_NUMPY.to_string()),
            perl: Some(DEFAULT_PERL.to_string()),
            lua: Some(DEFAULT_LUA.to_string()),
            r_base: Some(DEFAULT_R.to_string()),
        }
    }
}

/// Immutable per-render build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Target operating-system family
    pub platform: Platform,
    /// Architecture component of the subdir (`64`, `32`, `armv7l`, `aarch64`, `ppc64le`, `arm64`)
    pub arch: String,
    /// Build root holding work and environment directories
    pub croot: PathBuf,
    /// Directory the package source is extracted into
    pub work_dir: PathBuf,
    /// Prefix of the build environment holding already-installed dependencies
    pub build_prefix: PathBuf,
    /// Language versions for selectors and build variables
    pub versions: LanguageVersions,
    /// Interpreter used to execute build-description scripts
    pub python_exe: Option<PathBuf>,
}

impl Config {
    /// Create a configuration rooted at `croot` with the default directory layout.
    pub fn new(platform: Platform, arch: impl Into<String>, croot: impl Into<PathBuf>) -> Self {
        let croot = croot.into();
        Self {
            platform,
            arch: arch.into(),
            work_dir: croot.join("work"),
            build_prefix: croot.join("_build_env"),
            croot,
            versions: LanguageVersions::default(),
            python_exe: None,
        }
    }

    /// Create a configuration for a subdir string such as `linux-64` or `win-32`.
    pub fn for_subdir(subdir: &str) -> Result<Self, RenderError> {
        let (platform, arch) = parse_subdir(subdir)?;
        Ok(Self::new(platform, arch, default_croot()))
    }

    /// Configuration for the machine this binary runs on.
    #[must_use]
    pub fn native() -> Self {
        Self::new(Platform::native(), native_arch(), default_croot())
    }

    /// Fold user defaults into a configuration, optionally targeting another subdir.
    pub fn from_global(global: &GlobalConfig, subdir: Option<&str>) -> Result<Self, RenderError> {
        let mut config = match subdir {
            Some(subdir) => Self::for_subdir(subdir)?,
            None => Self::native(),
        };

        if let Some(croot) = global.croot_path() {
            config = config.with_croot(croot);
        }
        let defaults = LanguageVersions::default();
        config.versions = LanguageVersions {
            python: global.python.clone().or(defaults.python),
            numpy: global.numpy.clone().or(defaults.numpy),
            perl: global.perl.clone().or(defaults.perl),
            lua: global.lua.clone().or(defaults.lua),
            r_base: global.r_base.clone().or(defaults.r_base),
        };
        config.python_exe = global.python_exe_path();
        Ok(config)
    }

    /// Re-root the configuration, moving work dir and build prefix along.
    #[must_use]
    pub fn with_croot(mut self, croot: impl Into<PathBuf>) -> Self {
        let croot = croot.into();
        self.work_dir = croot.join("work");
        self.build_prefix = croot.join("_build_env");
        self.croot = croot;
        self
    }

    #[must_use]
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    #[must_use]
    pub fn with_build_prefix(mut self, build_prefix: impl Into<PathBuf>) -> Self {
        self.build_prefix = build_prefix.into();
        self
    }

    #[must_use]
    pub fn with_versions(mut self, versions: LanguageVersions) -> Self {
        self.versions = versions;
        self
    }

    #[must_use]
    pub fn with_python_exe(mut self, python_exe: impl Into<PathBuf>) -> Self {
        self.python_exe = Some(python_exe.into());
        self
    }

    /// Platform/architecture identifier, e.g. `linux-64`.
    #[must_use]
    pub fn subdir(&self) -> String {
        format!("{}-{}", self.platform, self.arch)
    }

    /// Pointer width of the target architecture.
    #[must_use]
    pub fn bits(&self) -> u32 {
        match self.arch.as_str() {
            "32" | "armv6l" | "armv7l" => 32,
            _ => 64,
        }
    }

    #[must_use]
    pub const fn is_unix(&self) -> bool {
        matches!(self.platform, Platform::Linux | Platform::Osx)
    }

    /// Path of the Python interpreter inside a prefix.
    #[must_use]
    pub fn python_in(&self, prefix: &Path) -> PathBuf {
        match self.platform {
            Platform::Win => prefix.join("python.exe"),
            _ => prefix.join("bin").join("python"),
        }
    }
}

fn parse_subdir(subdir: &str) -> Result<(Platform, String), RenderError> {
    let unsupported = || RenderError::UnsupportedPlatform {
        platform: subdir.to_string(),
    };
    let (platform, arch) = subdir.split_once('-').ok_or_else(unsupported)?;
    if arch.is_empty() {
        return Err(unsupported());
    }
    let platform = platform.parse::<Platform>().map_err(|_| unsupported())?;
    Ok((platform, arch.to_string()))
}

/// Architecture component of the native subdir.
#[must_use]
pub fn native_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "32",
        "aarch64" if cfg!(target_os = "macos") => "arm64",
        "aarch64" => "aarch64",
        "arm" => "armv7l",
        "powerpc64" => "ppc64le",
        _ => "64",
    }
}

fn default_croot() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join("conda-bld")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_subdir() {
        let config = Config::for_subdir("win-32").unwrap();
        assert_eq!(config.platform, Platform::Win);
        assert_eq!(config.arch, "32");
        assert_eq!(config.bits(), 32);
        assert!(!config.is_unix());

        let config = Config::for_subdir("linux-armv7l").unwrap();
        assert_eq!(config.subdir(), "linux-armv7l");
        assert_eq!(config.bits(), 32);
    }

    #[test]
    fn test_for_subdir_rejects_garbage() {
        assert!(matches!(
            Config::for_subdir("beos-64"),
            Err(RenderError::UnsupportedPlatform { .. })
        ));
        assert!(Config::for_subdir("linux").is_err());
        assert!(Config::for_subdir("linux-").is_err());
    }

    #[test]
    fn test_with_croot_moves_layout() {
        let config = Config::new(Platform::Linux, "64", "/tmp/a").with_croot("/tmp/b");
        assert_eq!(config.work_dir, PathBuf::from("/tmp/b/work"));
        assert_eq!(config.build_prefix, PathBuf::from("/tmp/b/_build_env"));
    }

    #[test]
    fn test_from_global_applies_versions() {
        let global = GlobalConfig {
            python: Some("2.7".to_string()),
            croot: Some("/opt/bld".to_string()),
            ..GlobalConfig::default()
        };
        let config = Config::from_global(&global, Some("osx-64")).unwrap();
        assert_eq!(config.platform, Platform::Osx);
        assert_eq!(config.versions.python.as_deref(), Some("2.7"));
        assert_eq!(config.versions.numpy.as_deref(), Some(DEFAULT_NUMPY));
        assert_eq!(config.croot, PathBuf::from("/opt/bld"));
    }

    #[test]
    fn test_python_in_prefix() {
        let linux = Config::new(Platform::Linux, "64", "/b");
        assert_eq!(linux.python_in(Path::new("/p")), PathBuf::from("/p/bin/python"));
        let win = Config::new(Platform::Win, "64", "/b");
        assert_eq!(win.python_in(Path::new("/p")), PathBuf::from("/p/python.exe"));
    }
}
