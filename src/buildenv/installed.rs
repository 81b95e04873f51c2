//! Package records installed into a prefix.
//!
//! Every installed package leaves one JSON record in `<prefix>/conda-meta/`, named
//! `<name>-<version>-<build>.json`. Only the identifying fields are read; everything else
//! in the record is ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constants::CONDA_META_DIR;
use crate::core::RenderError;

/// Identifying fields of one installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub build_number: u64,
}

/// Packages installed into a prefix, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InstalledPackages {
    packages: BTreeMap<String, PackageRecord>,
}

impl InstalledPackages {
    /// Read all records below `prefix`. A prefix without `conda-meta` has no packages.
    ///
    /// # Errors
    ///
    /// [`RenderError::Io`] if the directory or a record cannot be read,
    /// [`RenderError::ManifestParse`] if a record is not valid JSON.
    pub fn load(prefix: &Path) -> Result<Self, RenderError> {
        let meta_dir = prefix.join(CONDA_META_DIR);
        if !meta_dir.is_dir() {
            tracing::debug!("No {} in {}, assuming empty prefix", CONDA_META_DIR, prefix.display());
            return Ok(Self::default());
        }

        let entries = std::fs::read_dir(&meta_dir)
            .map_err(|e| RenderError::io("listing installed packages in", &meta_dir, e))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json") && path.is_file())
            .collect();
        paths.sort();

        let mut packages = BTreeMap::new();
        for path in paths {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| RenderError::io("reading package record", &path, e))?;
            let record: PackageRecord =
                serde_json::from_str(&text).map_err(|e| RenderError::manifest_parse(&path, e))?;
            packages.insert(record.name.clone(), record);
        }

        tracing::debug!("Found {} installed packages in {}", packages.len(), prefix.display());
        Ok(Self { packages })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn insert(&mut self, record: PackageRecord) {
        self.packages.insert(record.name.clone(), record);
    }
}

impl FromIterator<PackageRecord> for InstalledPackages {
    fn from_iter<I: IntoIterator<Item = PackageRecord>>(iter: I) -> Self {
        Self {
            packages: iter.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_meta_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(InstalledPackages::load(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_records() {
        let temp = TempDir::new().unwrap();
        let meta = temp.path().join("conda-meta");
        std::fs::create_dir_all(&meta).unwrap();
        std::fs::write(
            meta.join("numpy-1.11.3-py36_0.json"),
            r#"{"name": "numpy", "version": "1.11.3", "build": "py36_0",
                "build_number": 0, "depends": ["python"]}"#,
        )
        .unwrap();
        std::fs::write(
            meta.join("zlib-1.2.8-3.json"),
            r#"{"name": "zlib", "version": "1.2.8"}"#,
        )
        .unwrap();
        std::fs::write(meta.join("history"), "not json").unwrap();

        let installed = InstalledPackages::load(temp.path()).unwrap();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed.get("numpy").unwrap().version, "1.11.3");
        assert_eq!(installed.get("zlib").unwrap().build, "");
    }

    #[test]
    fn test_invalid_record() {
        let temp = TempDir::new().unwrap();
        let meta = temp.path().join("conda-meta");
        std::fs::create_dir_all(&meta).unwrap();
        std::fs::write(meta.join("broken.json"), "{").unwrap();

        match InstalledPackages::load(temp.path()) {
            Err(RenderError::ManifestParse { path, .. }) => assert!(path.ends_with("broken.json")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
