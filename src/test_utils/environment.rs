//! Recipe environment setup for integration and library tests.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::buildenv::PackageRecord;
use crate::config::Config;
use crate::constants::{CONDA_META_DIR, RECIPE_FILE};

/// A temporary recipe directory next to a build root.
///
/// ```text
/// <tmp>/recipe/meta.yaml
/// <tmp>/croot/work/           source directory
/// <tmp>/croot/_build_env/     build prefix
/// ```
pub struct RecipeEnvironment {
    pub temp_dir: TempDir,
    pub recipe_dir: PathBuf,
    pub croot: PathBuf,
}

impl RecipeEnvironment {
    /// Create an empty recipe directory and build root.
    pub fn new() -> Result<Self> {
        super::init_test_logging(None);

        let temp_dir = TempDir::new()?;
        let recipe_dir = temp_dir.path().join("recipe");
        let croot = temp_dir.path().join("croot");
        fs::create_dir_all(&recipe_dir)?;
        fs::create_dir_all(&croot)?;

        Ok(Self {
            temp_dir,
            recipe_dir,
            croot,
        })
    }

    /// Create an environment whose recipe file holds `content`.
    pub fn with_recipe(content: &str) -> Result<Self> {
        let env = Self::new()?;
        env.write_recipe(content)?;
        Ok(env)
    }

    /// Configuration for `subdir` rooted at this environment's build root.
    pub fn config(&self, subdir: &str) -> Result<Config> {
        Ok(Config::for_subdir(subdir)?.with_croot(&self.croot))
    }

    pub fn work_dir(&self) -> PathBuf {
        self.croot.join("work")
    }

    pub fn build_prefix(&self) -> PathBuf {
        self.croot.join("_build_env")
    }

    pub fn recipe_path(&self) -> PathBuf {
        self.recipe_dir.join(RECIPE_FILE)
    }

    pub fn write_recipe(&self, content: &str) -> Result<PathBuf> {
        self.create_file(RECIPE_FILE, content)
    }

    /// Create a file relative to the recipe directory.
    pub fn create_file(&self, path: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        write_file(&self.recipe_dir.join(path), content)
    }

    /// Create a file relative to the source directory, creating it if needed.
    pub fn create_work_file(&self, path: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        write_file(&self.work_dir().join(path), content)
    }

    /// Record a package as installed in the build prefix.
    pub fn install_package(&self, name: &str, version: &str, build: &str) -> Result<PathBuf> {
        let record = PackageRecord {
            name: name.to_string(),
            version: version.to_string(),
            build: build.to_string(),
            build_number: 0,
        };
        let path = self
            .build_prefix()
            .join(CONDA_META_DIR)
            .join(format!("{name}-{version}-{build}.json"));
        write_file(&path, &serde_json::to_string_pretty(&record)?)
    }
}

fn write_file(path: &Path, content: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path.to_path_buf())
}
