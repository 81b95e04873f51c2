//! Project files a recipe reads through template callables.
//!
//! - [`load_setup_py_data`] - keywords passed to `setup()` by a project's `setup.py`
//! - [`load_file_regex`] - a regex search over a project file
//! - [`load_npm`] - the project's `package.json`
//!
//! `setup.py` and regex files are looked up in the recipe directory when the recipe asks
//! for it (`from_recipe_dir=True`), otherwise in the work directory the package source is
//! extracted into. Before the source exists the lenient pass gets an empty result and the
//! strict pass fails with
//! [`RenderError::SourceNotFound`](crate::core::RenderError::SourceNotFound).

mod file_regex;
mod npm;
mod setup_py;

pub use file_regex::{FileRegexResult, RegexMatch, load_file_regex};
pub use npm::{load_npm, load_npm_from};
pub use setup_py::{SetupData, find_interpreter, load_setup_py_data};

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Where a project file lives and the directory to resolve it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProjectFile {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Directory the file is read relative to
    pub base: PathBuf,
    /// Whether the file lives in the work directory
    pub in_work_dir: bool,
}

/// Resolve `file` per the recipe-dir / work-dir rules. `None` means the source has not
/// been made available yet.
pub(crate) fn locate(
    file: &str,
    from_recipe_dir: bool,
    recipe_dir: Option<&Path>,
    config: &Config,
) -> Option<ProjectFile> {
    if let (true, Some(recipe_dir)) = (from_recipe_dir, recipe_dir) {
        let base = absolute(recipe_dir);
        return Some(ProjectFile {
            path: base.join(file),
            base,
            in_work_dir: false,
        });
    }

    if config.work_dir.exists() {
        let base = absolute(&config.work_dir);
        let path = Path::new(file);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        };
        return Some(ProjectFile {
            path,
            base,
            in_work_dir: true,
        });
    }

    None
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
