//! Compiler and runtime resolution for `compiler()` and `runtime()`.
//!
//! Native compilers never name their host; it is implied. A cross compiler is named
//! `<compiler>_<target_platform>` and can only be formed from a compiler the variant sets
//! explicitly, since the native default carries no host information.
//!
//! # Resolution
//!
//! 1. The native compiler comes from a per-platform table. On Windows the C and C++
//!    compilers follow the MSVC release the variant's `python` was built with.
//! 2. `<lang>_compiler` in the variant overrides the native default.
//! 3. With `target_platform` set, an explicit compiler gets the target appended. Without an
//!    explicit compiler the strict pass fails with [`RenderError::CrossCompileConfig`]; the
//!    lenient pass returns the native compiler unchanged.
//!
//! # Examples
//!
//! ```rust
//! use recipe_render::compilers::{compiler, Language};
//! use recipe_render::config::Config;
//! use recipe_render::core::UndefinedPolicy;
//! use recipe_render::variants::Variant;
//!
//! let config = Config::for_subdir("linux-64").unwrap();
//! let variant = Variant::new()
//!     .with("c_compiler", "clang")
//!     .with("target_platform", "linux-64");
//! let resolved = compiler(Language::C, &config, &variant, UndefinedPolicy::Strict).unwrap();
//! assert_eq!(resolved, "clang_linux-64");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::config::{Config, Platform};
use crate::core::{RenderError, UndefinedPolicy};
use crate::variants::{TARGET_PLATFORM_KEY, Variant};

/// Compiled language accepted by `compiler()` and `runtime()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    C,
    Cxx,
    Fortran,
}

impl Language {
    pub const ALL: [Self; 3] = [Self::C, Self::Cxx, Self::Fortran];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cxx => "cxx",
            Self::Fortran => "fortran",
        }
    }

    /// Variant key carrying the explicit compiler, e.g. `cxx_compiler`.
    #[must_use]
    pub fn compiler_key(self) -> String {
        format!("{}_compiler", self.as_str())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Self::C),
            "cxx" => Ok(Self::Cxx),
            "fortran" => Ok(Self::Fortran),
            other => Err(RenderError::UnknownLanguage {
                language: other.to_string(),
            }),
        }
    }
}

/// How the native compiler for one platform and language is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerSpec {
    /// Always this compiler
    Fixed(&'static str),
    /// Chosen by the variant's `python` value, with a fallback
    ByPython {
        table: &'static [(&'static str, &'static str)],
        fallback: &'static str,
    },
}

/// MSVC release each CPython line was built with.
const MSVC_BY_PYTHON: CompilerSpec = CompilerSpec::ByPython {
    table: &[("2.7", "vs2008"), ("3.3", "vs2010"), ("3.4", "vs2010"), ("3.5", "vs2015")],
    fallback: "vs2015",
};

/// Default compiler → runtime package mapping.
pub const RUNTIMES: &[(&str, &str)] = &[
    ("vs2008", "vs2008_runtime"),
    ("vs2010", "vs2010_runtime"),
    ("vs2015", "vs2015_runtime"),
    ("gfortran", "libgfortran"),
    ("g++", "libstdc++"),
    ("gcc", "libgcc"),
];

/// Native compiler table entry.
#[must_use]
pub const fn compiler_spec(platform: Platform, language: Language) -> CompilerSpec {
    match (platform, language) {
        (Platform::Win, Language::C | Language::Cxx) => MSVC_BY_PYTHON,
        (_, Language::Fortran) => CompilerSpec::Fixed("gfortran"),
        (Platform::Linux | Platform::Osx, Language::C) => CompilerSpec::Fixed("gcc"),
        (Platform::Linux | Platform::Osx, Language::Cxx) => CompilerSpec::Fixed("g++"),
    }
}

/// Native compiler for `language`, ignoring any explicit variant override.
#[must_use]
pub fn native_compiler(language: Language, config: &Config, variant: &Variant) -> String {
    match compiler_spec(config.platform, language) {
        CompilerSpec::Fixed(name) => name.to_string(),
        CompilerSpec::ByPython { table, fallback } => {
            let python = variant.get_str("python");
            table
                .iter()
                .find(|(py, _)| python.as_deref() == Some(*py))
                .map_or(fallback, |(_, name)| *name)
                .to_string()
        }
    }
}

/// Explicit compiler from the variant, else the native one.
fn base_compiler(language: Language, config: &Config, variant: &Variant) -> (String, bool) {
    match variant.get_str(&language.compiler_key()) {
        Some(explicit) => (explicit, true),
        None => (native_compiler(language, config, variant), false),
    }
}

/// Resolve the compiler package name backing `compiler('<lang>')`.
///
/// # Errors
///
/// [`RenderError::CrossCompileConfig`] when `target_platform` is set, the variant has no
/// explicit compiler for the language and the policy is strict.
pub fn compiler(
    language: Language,
    config: &Config,
    variant: &Variant,
    policy: UndefinedPolicy,
) -> Result<String, RenderError> {
    let (compiler, explicit) = base_compiler(language, config, variant);

    let Some(target) = variant.get_str(TARGET_PLATFORM_KEY) else {
        return Ok(compiler);
    };

    if explicit {
        Ok(format!("{compiler}_{target}"))
    } else if policy.permits_undefined() {
        tracing::debug!(
            "target_platform set without {}; using native {compiler} during exploratory pass",
            language.compiler_key()
        );
        Ok(compiler)
    } else {
        Err(RenderError::CrossCompileConfig {
            language: language.as_str().to_string(),
            key: language.compiler_key(),
        })
    }
}

/// Resolve the runtime package name backing `runtime('<lang>')`.
///
/// The runtime is looked up for the base compiler (explicit or native, without any
/// target suffix) in the variant's `runtimes` mapping if it has one, otherwise in
/// [`RUNTIMES`]. `target_platform`, when set, is appended. The policy does not relax
/// lookup failures.
///
/// # Errors
///
/// [`RenderError::RuntimeLookup`] when no runtime is known for the compiler.
pub fn runtime(
    language: Language,
    config: &Config,
    variant: &Variant,
    _policy: UndefinedPolicy,
) -> Result<String, RenderError> {
    let (compiler, _) = base_compiler(language, config, variant);

    let runtime = match variant.runtimes() {
        Some(overrides) => overrides.get(&compiler).cloned(),
        None => RUNTIMES
            .iter()
            .find(|(c, _)| *c == compiler)
            .map(|(_, rt)| (*rt).to_string()),
    }
    .ok_or_else(|| RenderError::RuntimeLookup {
        compiler: compiler.clone(),
    })?;

    match variant.get_str(TARGET_PLATFORM_KEY) {
        Some(target) => Ok(format!("{runtime}_{target}")),
        None => Ok(runtime),
    }
}

/// Fill in compiler keys and `target_platform` a variant leaves unset.
///
/// Native compilers are used for the compiler keys and the config's subdir for the
/// target, so a strict render of a recipe calling `compiler()` has every key it needs.
#[must_use]
pub fn with_native_defaults(mut variant: Variant, config: &Config) -> Variant {
    for language in Language::ALL {
        let key = language.compiler_key();
        if !variant.contains_key(&key) {
            let native = native_compiler(language, config, &variant);
            variant.insert(key, serde_json::Value::String(native));
        }
    }
    if !variant.contains_key(TARGET_PLATFORM_KEY) {
        variant.insert(TARGET_PLATFORM_KEY, serde_json::Value::String(config.subdir()));
    }
    variant
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linux() -> Config {
        Config::for_subdir("linux-64").unwrap()
    }

    fn win() -> Config {
        Config::for_subdir("win-64").unwrap()
    }

    #[test]
    fn test_native_compiler_linux() {
        let resolved =
            compiler(Language::C, &linux(), &Variant::new(), UndefinedPolicy::Strict).unwrap();
        assert_eq!(resolved, "gcc");
        assert_eq!(native_compiler(Language::Cxx, &linux(), &Variant::new()), "g++");
        assert_eq!(native_compiler(Language::Fortran, &linux(), &Variant::new()), "gfortran");
    }

    #[test]
    fn test_native_compiler_windows_follows_python() {
        let py27 = Variant::new().with("python", "2.7");
        let py34: Variant = [("python", json!(3.4))].into_iter().collect();
        assert_eq!(native_compiler(Language::C, &win(), &py27), "vs2008");
        assert_eq!(native_compiler(Language::Cxx, &win(), &py34), "vs2010");
        let py36 = Variant::new().with("python", "3.6");
        assert_eq!(native_compiler(Language::C, &win(), &py36), "vs2015");
        assert_eq!(native_compiler(Language::C, &win(), &Variant::new()), "vs2015");
        assert_eq!(native_compiler(Language::Fortran, &win(), &py27), "gfortran");
    }

    #[test]
    fn test_explicit_compiler_with_target() {
        let variant =
            Variant::new().with("c_compiler", "clang").with("target_platform", "linux-64");
        let resolved = compiler(Language::C, &linux(), &variant, UndefinedPolicy::Lenient).unwrap();
        assert_eq!(resolved, "clang_linux-64");
    }

    #[test]
    fn test_explicit_compiler_without_target() {
        let variant = Variant::new().with("cxx_compiler", "clangxx");
        let resolved =
            compiler(Language::Cxx, &linux(), &variant, UndefinedPolicy::Strict).unwrap();
        assert_eq!(resolved, "clangxx");
    }

    #[test]
    fn test_target_without_explicit_compiler() {
        let variant = Variant::new().with("target_platform", "linux-64");

        let err = compiler(Language::C, &linux(), &variant, UndefinedPolicy::Strict).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CrossCompileConfig { ref key, .. } if key == "c_compiler"
        ));

        let resolved = compiler(Language::C, &linux(), &variant, UndefinedPolicy::Lenient).unwrap();
        assert_eq!(resolved, "gcc");
    }

    #[test]
    fn test_default_runtime() {
        let resolved =
            runtime(Language::Cxx, &linux(), &Variant::new(), UndefinedPolicy::Strict).unwrap();
        assert_eq!(resolved, "libstdc++");
        let py27 = Variant::new().with("python", "2.7");
        let resolved = runtime(Language::C, &win(), &py27, UndefinedPolicy::Strict).unwrap();
        assert_eq!(resolved, "vs2008_runtime");
    }

    #[test]
    fn test_runtime_appends_target() {
        let variant =
            Variant::new().with("c_compiler", "gcc").with("target_platform", "linux-aarch64");
        let resolved = runtime(Language::C, &linux(), &variant, UndefinedPolicy::Strict).unwrap();
        assert_eq!(resolved, "libgcc_linux-aarch64");
    }

    #[test]
    fn test_runtime_override_table() {
        let mut variant = Variant::new().with("c_compiler", "icc");
        variant.insert("runtimes", json!({"icc": "icc_rt"}));
        let resolved = runtime(Language::C, &linux(), &variant, UndefinedPolicy::Strict).unwrap();
        assert_eq!(resolved, "icc_rt");

        // an override table replaces the defaults entirely
        let mut variant = Variant::new();
        variant.insert("runtimes", json!({"icc": "icc_rt"}));
        let err = runtime(Language::C, &linux(), &variant, UndefinedPolicy::Strict).unwrap_err();
        assert!(matches!(err, RenderError::RuntimeLookup { ref compiler } if compiler == "gcc"));
    }

    #[test]
    fn test_unknown_runtime_fails_under_both_policies() {
        let variant = Variant::new().with("c_compiler", "icc");
        for policy in [UndefinedPolicy::Lenient, UndefinedPolicy::Strict] {
            let err = runtime(Language::C, &linux(), &variant, policy).unwrap_err();
            assert!(matches!(
                err,
                RenderError::RuntimeLookup { ref compiler } if compiler == "icc"
            ));
        }
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("cxx".parse::<Language>().unwrap(), Language::Cxx);
        assert!(matches!("rust".parse::<Language>(), Err(RenderError::UnknownLanguage { .. })));
    }

    #[test]
    fn test_with_native_defaults() {
        let variant = with_native_defaults(Variant::new().with("c_compiler", "clang"), &linux());
        assert_eq!(variant.get_str("c_compiler").as_deref(), Some("clang"));
        assert_eq!(variant.get_str("cxx_compiler").as_deref(), Some("g++"));
        assert_eq!(variant.get_str("fortran_compiler").as_deref(), Some("gfortran"));
        assert_eq!(variant.get_str("target_platform").as_deref(), Some("linux-64"));
    }
}
