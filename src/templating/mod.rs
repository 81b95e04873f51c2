//! Jinja templating for build recipes.
//!
//! This module renders recipe templates with [`minijinja`] in two passes, an exploratory
//! lenient pass followed by a strict one (see [`renderer`]).
//!
//! # Overview
//!
//! - [`loader`] - where template text comes from; every source is selector-filtered
//!   before the engine sees it, including `{% include %}`d files
//! - [`context`] - the names a recipe can reference and the callables it can invoke
//! - [`lenient`] - placeholders for unresolved names during the exploratory pass
//! - [`filters`] - filter and test overrides that understand placeholders
//! - [`mapping`] - dictionary values with `get()`, `items()`, `keys()` and `values()`
//! - [`error`] - structured template errors with source context
//!
//! # Template Context
//!
//! | Name | Content |
//! |------|---------|
//! | `PREFIX`, `PY_VER`, `SHLIB_EXT`, ... | derived build variables |
//! | `environ` | process environment overlaid with the build variables |
//! | `variant` | the variant being rendered |
//! | `installed` | packages installed in the build prefix |
//! | `compiler(lang)`, `runtime(lang)` | compiler and runtime package names |
//! | `pin_compatible(name, table=none)` | compatibility constraint for an installed package |
//! | `load_setup_py_data(setup_file='setup.py', from_recipe_dir=false)` | `setup()` keywords |
//! | `load_setuptools(...)` | deprecated alias of `load_setup_py_data` |
//! | `load_file_regex(load_file, regex_pattern, from_recipe_dir=false)` | match object or none |
//! | `load_npm()` | `package.json` of the current directory |
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use recipe_render::config::Config;
//! use recipe_render::templating::{FileSystemLoader, RecipeRenderer, RenderRequest};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Arc::new(Config::native());
//! let renderer = RecipeRenderer::new(config, Arc::new(FileSystemLoader::new("recipes/zlib")));
//! let request = RenderRequest::new("meta.yaml").with_recipe_dir("recipes/zlib");
//! let outcome = renderer.render(&request)?;
//! println!("{}", outcome.text);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod filters;
pub mod lenient;
pub mod loader;
pub mod mapping;
pub mod renderer;

pub use context::{ContextBuilder, RenderContext};
pub use error::{ErrorLocation, TemplateError};
pub use lenient::{LenientValue, UnresolvedNameLog};
pub use loader::{FileSystemLoader, MemoryLoader, RecipeLoader, SourceLoader, TemplateSource};
pub use mapping::Mapping;
pub use renderer::{PassOutput, RecipeRenderer, RenderOutcome, RenderRequest};
