//! Error handling for recipe rendering
//!
//! This module provides the strongly-typed error enum used throughout the crate and
//! the user-facing error context the CLI prints. The design follows two rules:
//! 1. **Every fatal error names its origin** - the path, package, language or
//!    selector line that caused it, so the caller can act on it
//! 2. **Lenient degradation never lives here** - errors are only constructed once the
//!    policy in force has decided the condition is fatal
//!
//! # Error Categories
//!
//! - **Auxiliary sources**: [`RenderError::SourceNotFound`], [`RenderError::SetupScriptFailed`],
//!   [`RenderError::InterpreterNotFound`], [`RenderError::InvalidRegex`],
//!   [`RenderError::ManifestParse`]
//! - **Compatibility pins**: [`RenderError::CompatibilityLookup`], [`RenderError::VersionParse`]
//! - **Compilers and runtimes**: [`RenderError::CrossCompileConfig`],
//!   [`RenderError::RuntimeLookup`],
//!   [`RenderError::UnknownLanguage`], [`RenderError::UnsupportedPlatform`]
//! - **Recipe text**: [`RenderError::InvalidSelector`], [`RenderError::MissingVariantKeys`],
//!   [`RenderError::TemplateNotFound`], [`RenderError::Template`]
//!
//! # Cloning
//!
//! [`RenderError`] is `Clone`. Errors raised inside template callables travel through the
//! template engine as the source of an engine error and are recovered by downcasting, which
//! only yields a reference, so the renderer clones them back out. Wrapped std errors are
//! held behind [`Arc`] for that reason.
//!
//! # Examples
//!
//! ```rust,no_run
//! use recipe_render::core::{RenderError, user_friendly_error};
//!
//! let error = RenderError::RuntimeLookup { compiler: "icc".to_string() };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Shows colored error with a suggestion
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::templating::error::TemplateError;

/// The main error type for recipe rendering.
#[derive(Error, Debug, Clone)]
pub enum RenderError {
    /// An auxiliary file, build-description script or source directory is absent.
    #[error("Source not found: {path} ({reason})")]
    SourceNotFound {
        /// The path that was looked up
        path: PathBuf,
        /// Why the lookup happened and what was missing
        reason: String,
    },

    /// `pin_compatible` could not find or derive a constraint.
    #[error(
        "Could not get compatibility information for package '{package}': {reason}. \
         Is the build environment created?"
    )]
    CompatibilityLookup {
        /// Package the pin was requested for
        package: String,
        /// What was missing
        reason: String,
    },

    /// `target_platform` is set without an explicit per-language compiler.
    #[error(
        "{key} must be set in the variant config in order to use target_platform for {language}. \
         Set it to the name of the compiler package, including the host (e.g. gcc-centos5)"
    )]
    CrossCompileConfig {
        /// Language whose compiler was requested
        language: String,
        /// The variant key that has to be set
        key: String,
    },

    /// A compiler identifier has no runtime mapping.
    #[error("No runtime is known for the '{compiler}' compiler")]
    RuntimeLookup {
        /// The compiler identifier that could not be mapped
        compiler: String,
    },

    /// An installed version cannot be decomposed into major/minor components.
    #[error(
        "Package '{package}' version '{version}' does not follow semantic versioning style"
    )]
    VersionParse {
        /// Package the pin was requested for
        package: String,
        /// The installed version string
        version: String,
    },

    /// A line selector is malformed or references an unknown name.
    #[error("Invalid selector on line {line}: {message}\noffending line:\n{text}")]
    InvalidSelector {
        /// 1-based line number in the recipe
        line: usize,
        /// The offending line
        text: String,
        /// What went wrong evaluating the selector
        message: String,
    },

    /// A strict render was requested with a variant that lacks used keys.
    #[error("Variant for recipe '{recipe}' is missing required keys: {}", keys.join(", "))]
    MissingVariantKeys {
        /// Recipe (template) name
        recipe: String,
        /// Keys consulted by the recipe but absent from the variant
        keys: Vec<String>,
    },

    /// `compiler()` or `runtime()` was called with an unknown language.
    #[error("Unknown compiler language '{language}' (expected one of: c, cxx, fortran)")]
    UnknownLanguage {
        /// The language argument as given
        language: String,
    },

    /// A platform or subdir string could not be understood.
    #[error("Unsupported platform '{platform}'")]
    UnsupportedPlatform {
        /// The platform string as given
        platform: String,
    },

    /// The build-description script exited unsuccessfully.
    #[error("Executing {path} failed (exit status {status}): {stderr}")]
    SetupScriptFailed {
        /// The script path
        path: PathBuf,
        /// Exit status description
        status: String,
        /// Captured stderr of the interpreter
        stderr: String,
    },

    /// No interpreter is available to execute a build-description script.
    #[error("No Python interpreter found to execute {path}")]
    InterpreterNotFound {
        /// The script that needed an interpreter
        path: PathBuf,
    },

    /// A `load_file_regex` pattern did not compile.
    #[error("Invalid regular expression '{pattern}'")]
    InvalidRegex {
        /// The pattern as given
        pattern: String,
        /// Compilation error
        #[source]
        source: regex::Error,
    },

    /// A JSON manifest or package record could not be parsed.
    #[error("Failed to parse {path}")]
    ManifestParse {
        /// File that failed to parse
        path: PathBuf,
        /// Parse error
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A variant configuration file could not be parsed.
    #[error("Invalid variant configuration in {path}: {reason}")]
    VariantConfig {
        /// File that failed to parse
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// The template loader has no source with this name.
    #[error("Template '{name}' not found")]
    TemplateNotFound {
        /// Template name as requested
        name: String,
    },

    /// I/O failure while reading recipe or auxiliary files.
    #[error("I/O error while {operation} {path}")]
    Io {
        /// What was being done
        operation: String,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The template engine failed.
    #[error(transparent)]
    Template(Box<TemplateError>),
}

impl RenderError {
    /// Wrap an I/O error with the operation and path it happened on.
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Wrap a JSON parse error for the given file.
    pub fn manifest_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::ManifestParse {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Convert into an engine error so it can be raised from a template callable.
    ///
    /// The original error stays reachable through the engine error's source chain.
    pub fn into_engine_error(self) -> minijinja::Error {
        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, self.to_string())
            .with_source(self)
    }
}

impl From<TemplateError> for RenderError {
    fn from(error: TemplateError) -> Self {
        Self::Template(Box::new(error))
    }
}

/// Error wrapper with a suggestion and optional details for CLI display.
#[derive(Debug)]
pub struct ErrorContext {
    /// Headline message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`].
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(render_error) = error.downcast_ref::<RenderError>() {
        return create_error_context(render_error);
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(format!("Invalid configuration file: {toml_error}"))
            .with_suggestion("Check the TOML syntax of the config file passed with --config");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(message)
}

fn create_error_context(error: &RenderError) -> ErrorContext {
    let ctx = ErrorContext::new(error.to_string());
    match error {
        RenderError::SourceNotFound { .. } => ctx
            .with_suggestion(
                "Download or extract the package source into the work directory \
                 before the final render",
            )
            .with_details("Auxiliary files are only optional during the exploratory pass"),
        RenderError::CompatibilityLookup { package, .. } => ctx.with_suggestion(format!(
            "Install '{package}' into the build prefix, or pass a table: \
             pin_compatible('{package}', {{'{package}': '>=1.0,<2'}})"
        )),
        RenderError::CrossCompileConfig { key, .. } => {
            ctx.with_suggestion(format!(
                "Add '{key}' to your variant configuration (-m variants.yaml)"
            ))
        }
        RenderError::RuntimeLookup { compiler } => ctx.with_suggestion(format!(
            "Provide a 'runtimes' section in your variant configuration \
             mapping '{compiler}' to its runtime package"
        )),
        RenderError::VersionParse { package, .. } => ctx.with_suggestion(format!(
            "Add '{package}' to the pin_compatible lookup table for compatible pinning"
        )),
        RenderError::InvalidSelector { .. } => ctx
            .with_suggestion(
                "Selectors are expressions over platform facts such as linux, win, osx, py and np",
            )
            .with_details("Selectors are evaluated before templating and are never lenient"),
        RenderError::MissingVariantKeys { keys, .. } => ctx.with_suggestion(format!(
            "Set {} in a variant configuration file",
            keys.join(", ")
        )),
        RenderError::InterpreterNotFound { .. } => ctx.with_suggestion(
            "Install python3 on PATH or set python_exe in ~/.recipe-render/config.toml",
        ),
        RenderError::Template(template_error) => ErrorContext::new(template_error.to_string())
            .with_details(template_error.format_with_context()),
        _ => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_their_origin() {
        let error = RenderError::CrossCompileConfig {
            language: "c".to_string(),
            key: "c_compiler".to_string(),
        };
        assert!(error.to_string().contains("c_compiler"));

        let error = RenderError::MissingVariantKeys {
            recipe: "meta.yaml".to_string(),
            keys: vec!["c_compiler".to_string(), "target_platform".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Variant for recipe 'meta.yaml' is missing required keys: c_compiler, target_platform"
        );
    }

    #[test]
    fn test_engine_error_keeps_source() {
        let engine_error = RenderError::RuntimeLookup {
            compiler: "icc".to_string(),
        }
        .into_engine_error();

        let source = std::error::Error::source(&engine_error)
            .and_then(|e| e.downcast_ref::<RenderError>())
            .cloned();
        assert!(matches!(
            source,
            Some(RenderError::RuntimeLookup { compiler }) if compiler == "icc"
        ));
    }

    #[test]
    fn test_user_friendly_error_adds_suggestion() {
        let ctx = user_friendly_error(anyhow::Error::from(RenderError::RuntimeLookup {
            compiler: "icc".to_string(),
        }));
        assert!(ctx.suggestion.unwrap().contains("runtimes"));
    }
}
