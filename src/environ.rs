//! Build variables a recipe can reference by name.
//!
//! These are the variables a build script would see (`PREFIX`, `PY_VER`, `SHLIB_EXT`, ...).
//! The template context binds each of them as a top-level name and merges them over the
//! process environment in `environ`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{Config, Platform};
use crate::constants::MACOSX_DEPLOYMENT_TARGET;
use crate::variants::{TARGET_PLATFORM_KEY, Variant};

/// Caller-supplied facts about the recipe being rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeMetadata {
    /// Path of the recipe file
    pub meta_path: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,
    pub build_number: Option<u64>,
}

impl RecipeMetadata {
    pub fn new(meta_path: impl Into<PathBuf>) -> Self {
        Self {
            meta_path: meta_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_build_number(mut self, build_number: u64) -> Self {
        self.build_number = Some(build_number);
        self
    }
}

/// Derive the build variables for one render.
///
/// Language versions come from the variant when it pins them and from `config` otherwise,
/// truncated to `major.minor`.
#[must_use]
pub fn build_environ(
    config: &Config,
    recipe_dir: Option<&Path>,
    metadata: &RecipeMetadata,
    variant: &Variant,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    let mut set = |key: &str, value: String| {
        env.insert(key.to_string(), value);
    };
    let path = |p: &Path| p.display().to_string();

    let prefix = &config.build_prefix;
    set("CONDA_BUILD", "1".to_string());
    set("PREFIX", path(prefix));
    set("BUILD_PREFIX", path(prefix));
    set("SRC_DIR", path(&config.work_dir));
    if let Some(dir) = recipe_dir {
        set("RECIPE_DIR", path(dir));
    }
    set("ARCH", config.arch.clone());
    set("SUBDIR", config.subdir());
    set(
        TARGET_PLATFORM_KEY,
        variant.get_str(TARGET_PLATFORM_KEY).unwrap_or_else(|| config.subdir()),
    );

    let versions = &config.versions;
    let pinned = |key: &str, fallback: Option<&String>| {
        variant
            .get_str(key)
            .or_else(|| fallback.cloned())
            .map(|v| major_minor(&v))
    };
    if let Some(py) = pinned("python", versions.python.as_ref()) {
        set("PY_VER", py);
    }
    if let Some(np) = pinned("numpy", versions.numpy.as_ref()) {
        set("NPY_VER", np);
    }
    if let Some(perl) = variant.get_str("perl").or_else(|| versions.perl.clone()) {
        set("PERL_VER", perl);
    }
    if let Some(lua) = pinned("lua", versions.lua.as_ref()) {
        set("LUA_VER", lua);
    }
    if let Some(r) = variant.get_str("r_base").or_else(|| versions.r_base.clone()) {
        set("R_VER", r);
    }
    set("PYTHON", path(&config.python_in(prefix)));
    set("SHLIB_EXT", shlib_ext(config.platform).to_string());
    set(
        "CPU_COUNT",
        std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .to_string(),
    );

    if let Some(name) = &metadata.name {
        set("PKG_NAME", name.clone());
    }
    if let Some(version) = &metadata.version {
        set("PKG_VERSION", version.clone());
    }
    if let Some(number) = metadata.build_number {
        set("PKG_BUILDNUM", number.to_string());
    }

    match config.platform {
        Platform::Osx => {
            let osx_arch = match config.arch.as_str() {
                "32" => "i386",
                "arm64" => "arm64",
                _ => "x86_64",
            };
            set("OSX_ARCH", osx_arch.to_string());
            set("MACOSX_DEPLOYMENT_TARGET", MACOSX_DEPLOYMENT_TARGET.to_string());
        }
        Platform::Win => {
            let library = prefix.join("Library");
            set("LIBRARY_PREFIX", path(&library));
            set("LIBRARY_BIN", path(&library.join("bin")));
            set("LIBRARY_INC", path(&library.join("include")));
            set("LIBRARY_LIB", path(&library.join("lib")));
            set("SCRIPTS", path(&prefix.join("Scripts")));
        }
        Platform::Linux => {}
    }

    env
}

const fn shlib_ext(platform: Platform) -> &'static str {
    match platform {
        Platform::Linux => ".so",
        Platform::Osx => ".dylib",
        Platform::Win => ".dll",
    }
}

fn major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(subdir: &str) -> Config {
        Config::for_subdir(subdir).unwrap().with_croot("/tmp/croot")
    }

    #[test]
    fn test_linux_variables() {
        let metadata = RecipeMetadata::new("/r/meta.yaml")
            .with_name("demo")
            .with_version("1.2")
            .with_build_number(3);
        let env =
            build_environ(&config("linux-64"), Some(Path::new("/r")), &metadata, &Variant::new());

        assert_eq!(env["CONDA_BUILD"], "1");
        assert_eq!(env["SUBDIR"], "linux-64");
        assert_eq!(env["target_platform"], "linux-64");
        assert_eq!(env["SHLIB_EXT"], ".so");
        assert_eq!(env["PY_VER"], "3.6");
        assert_eq!(env["NPY_VER"], "1.11");
        assert_eq!(env["RECIPE_DIR"], "/r");
        assert_eq!(env["PKG_NAME"], "demo");
        assert_eq!(env["PKG_BUILDNUM"], "3");
        assert!(env["PYTHON"].ends_with("python"));
        assert!(!env.contains_key("OSX_ARCH"));
        assert!(env["CPU_COUNT"].parse::<usize>().unwrap() >= 1);
    }

    #[test]
    fn test_variant_overrides_versions() {
        let variant =
            Variant::new().with("python", "2.7.13").with("target_platform", "linux-cos5-64");
        let env = build_environ(&config("linux-64"), None, &RecipeMetadata::default(), &variant);
        assert_eq!(env["PY_VER"], "2.7");
        assert_eq!(env["target_platform"], "linux-cos5-64");
        assert!(!env.contains_key("RECIPE_DIR"));
        assert!(!env.contains_key("PKG_NAME"));
    }

    #[test]
    fn test_platform_extras() {
        let metadata = RecipeMetadata::default();
        let env = build_environ(&config("osx-64"), None, &metadata, &Variant::new());
        assert_eq!(env["OSX_ARCH"], "x86_64");
        assert_eq!(env["SHLIB_EXT"], ".dylib");

        let env = build_environ(&config("win-64"), None, &metadata, &Variant::new());
        assert_eq!(env["SHLIB_EXT"], ".dll");
        assert!(env["LIBRARY_PREFIX"].ends_with("Library"));
        assert!(env["SCRIPTS"].ends_with("Scripts"));
        assert!(env["PYTHON"].ends_with("python.exe"));
    }
}
