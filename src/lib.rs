//! recipe-render - two-pass renderer for templated package build recipes
//!
//! A build recipe (`meta.yaml`) is YAML text with line selectors (`# [win]`) and Jinja
//! templating. Rendering it needs facts about the build: target platform, language
//! versions, compilers, packages already installed, and data read from the package
//! source itself (`setup.py`, `package.json`, version files).
//!
//! Those facts are not all available up front, so a recipe is rendered twice:
//!
//! 1. An exploratory **lenient** pass, in which unresolved names render as placeholders
//!    and missing source files degrade to empty results. It reveals what the recipe
//!    references.
//! 2. A **strict** pass from scratch, in which every unresolved name and missing file is
//!    an error. Its output is the final recipe text.
//!
//! # Core Modules
//!
//! ## Rendering
//! - [`templating`] - the renderer, template context, loaders and lenient placeholders
//! - [`selectors`] - line-selector evaluation over platform facts
//! - [`environ`] - build variables bound into the template context
//!
//! ## Build Facts
//! - [`compilers`] - compiler and runtime package names per language and platform
//! - [`buildenv`] - installed packages and `pin_compatible` constraints
//! - [`project`] - `setup.py`, `package.json` and regex data from the package source
//! - [`variants`] - variant points, variant matrices and usage scanning
//!
//! ## Supporting Modules
//! - [`config`] - build configuration and user defaults (`~/.recipe-render/config.toml`)
//! - [`core`] - error types and the undefined-name policy
//! - [`cli`] - command-line interface
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use recipe_render::config::Config;
//! use recipe_render::templating::{MemoryLoader, RecipeRenderer, RenderRequest};
//! use recipe_render::variants::Variant;
//!
//! # fn example() -> anyhow::Result<()> {
//! let loader = MemoryLoader::new().with(
//!     "meta.yaml",
//!     "package:\n  name: demo\nrequirements:\n  build:\n    \
//!      - {{ compiler('c') }}\n    - vc14  # [win]\n",
//! );
//! let config = Arc::new(Config::for_subdir("linux-64")?);
//! let renderer = RecipeRenderer::new(config, Arc::new(loader));
//!
//! let request = RenderRequest::new("meta.yaml")
//!     .with_variant(Variant::new().with("c_compiler", "gcc").with("target_platform", "linux-64"));
//! let outcome = renderer.render(&request)?;
//! assert!(outcome.text.contains("gcc_linux-64"));
//! # Ok(())
//! # }
//! ```

pub mod buildenv;
pub mod cli;
pub mod compilers;
pub mod config;
pub mod constants;
pub mod core;
pub mod environ;
pub mod project;
pub mod selectors;
pub mod templating;
pub mod variants;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
