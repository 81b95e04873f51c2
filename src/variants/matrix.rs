//! Multi-valued variant configuration.
//!
//! Variant files are YAML mappings where each key holds either a single value or a list
//! of alternatives:
//!
//! ```yaml
//! python:
//!   - 2.7
//!   - 3.6
//! c_compiler: gcc
//! runtimes:
//!   icc: icc_rt
//! ```
//!
//! Lists are dimensions of the matrix. Mappings and scalars are single-valued. When
//! several files are merged the later file replaces whole keys.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use super::{Variant, VariantKeySet};
use crate::core::RenderError;

/// Variant configuration with one or more candidate values per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantMatrix {
    dimensions: BTreeMap<String, Vec<Value>>,
}

impl VariantMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one variant file's contents. `origin` is used for error reporting only.
    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, RenderError> {
        let invalid = |reason: String| RenderError::VariantConfig {
            path: origin.to_path_buf(),
            reason,
        };

        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let parsed: Option<BTreeMap<String, serde_yaml::Value>> =
            serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?;

        let mut matrix = Self::new();
        for (key, value) in parsed.unwrap_or_default() {
            let to_json = |item: serde_yaml::Value| {
                serde_json::to_value(item).map_err(|e| invalid(format!("{key}: {e}")))
            };
            let values = match value {
                serde_yaml::Value::Sequence(items) => {
                    items.into_iter().map(to_json).collect::<Result<Vec<_>, _>>()?
                }
                serde_yaml::Value::Null => continue,
                other => vec![to_json(other)?],
            };
            matrix.dimensions.insert(key, values);
        }
        Ok(matrix)
    }

    /// Read and parse a variant file.
    pub fn load_file(path: &Path) -> Result<Self, RenderError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RenderError::io("reading variant config", path, e))?;
        Self::from_yaml_str(&text, path)
    }

    /// Merge `other` into `self`; keys present in `other` replace ours.
    pub fn merge(&mut self, other: Self) {
        self.dimensions.extend(other.dimensions);
    }

    /// Replace a key with the given alternatives. An empty list removes the key.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<Value>) {
        let key = key.into();
        if values.is_empty() {
            self.dimensions.remove(&key);
        } else {
            self.dimensions.insert(key, values);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[Value]> {
        self.dimensions.get(key).map(Vec::as_slice)
    }

    /// All keys the matrix defines.
    #[must_use]
    pub fn keys(&self) -> VariantKeySet {
        self.dimensions.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Expand into variant points.
    ///
    /// Only keys in `used` contribute alternatives; every other key takes its first value.
    /// The result is the cartesian product in key order, earliest key varying slowest, so
    /// identical inputs always produce the same sequence.
    #[must_use]
    pub fn combinations(&self, used: &VariantKeySet) -> Vec<Variant> {
        let mut points = vec![BTreeMap::<String, Value>::new()];

        for (key, values) in &self.dimensions {
            let Some(first) = values.first() else {
                continue;
            };
            if used.contains(key) && values.len() > 1 {
                points = points
                    .into_iter()
                    .flat_map(|point| {
                        values.iter().map(move |value| {
                            let mut next = point.clone();
                            next.insert(key.clone(), value.clone());
                            next
                        })
                    })
                    .collect();
            } else {
                for point in &mut points {
                    point.insert(key.clone(), first.clone());
                }
            }
        }

        points.into_iter().map(Variant::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn used(keys: &[&str]) -> VariantKeySet {
        keys.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn test_parse_lists_scalars_and_mappings() {
        let matrix = VariantMatrix::from_yaml_str(
            "python:\n  - 2.7\n  - 3.6\nc_compiler: gcc\nruntimes:\n  icc: icc_rt\nempty:\n",
            Path::new("v.yaml"),
        )
        .unwrap();

        assert_eq!(matrix.get("python"), Some(&[json!(2.7), json!(3.6)][..]));
        assert_eq!(matrix.get("c_compiler"), Some(&[json!("gcc")][..]));
        assert_eq!(matrix.get("runtimes"), Some(&[json!({"icc": "icc_rt"})][..]));
        assert!(matrix.get("empty").is_none());
    }

    #[test]
    fn test_empty_document() {
        let matrix = VariantMatrix::from_yaml_str("", Path::new("v.yaml")).unwrap();
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_invalid_yaml_names_file() {
        let err =
            VariantMatrix::from_yaml_str("- just\n- a list\n", Path::new("bad.yaml")).unwrap_err();
        match err {
            RenderError::VariantConfig { path, .. } => assert_eq!(path, Path::new("bad.yaml")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unused_dimensions_collapse() {
        let mut matrix = VariantMatrix::new();
        matrix.set("python", vec![json!("2.7"), json!("3.6")]);
        matrix.set("numpy", vec![json!("1.11"), json!("1.12")]);

        let points = matrix.combinations(&used(&["python"]));
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].get_str("python").as_deref(), Some("2.7"));
        assert_eq!(points[1].get_str("python").as_deref(), Some("3.6"));
        assert!(points.iter().all(|p| p.get_str("numpy").as_deref() == Some("1.11")));
    }

    #[test]
    fn test_cartesian_product_order() {
        let mut matrix = VariantMatrix::new();
        matrix.set("a", vec![json!("1"), json!("2")]);
        matrix.set("b", vec![json!("x"), json!("y")]);

        let labels: Vec<String> =
            matrix.combinations(&used(&["a", "b"])).iter().map(Variant::label).collect();
        assert_eq!(labels, vec!["a=1 b=x", "a=1 b=y", "a=2 b=x", "a=2 b=y"]);
    }

    #[test]
    fn test_merge_replaces_whole_keys() {
        let mut base = VariantMatrix::new();
        base.set("python", vec![json!("2.7"), json!("3.6")]);
        base.set("numpy", vec![json!("1.11")]);
        let mut over = VariantMatrix::new();
        over.set("python", vec![json!("3.5")]);

        base.merge(over);
        assert_eq!(base.get("python"), Some(&[json!("3.5")][..]));
        assert_eq!(base.get("numpy"), Some(&[json!("1.11")][..]));
    }

    #[test]
    fn test_empty_matrix_yields_one_empty_point() {
        let points = VariantMatrix::new().combinations(&used(&["python"]));
        assert_eq!(points, vec![Variant::new()]);
    }
}
