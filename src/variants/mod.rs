//! Variant points, variant matrices and variant-usage scanning.
//!
//! A [`Variant`] is one point in the build matrix: an ordered mapping from variant key
//! (`python`, `c_compiler`, `target_platform`, ...) to a single value. It is read-only
//! during a render pass.
//!
//! A [`VariantMatrix`] is the multi-valued configuration loaded from variant files; it
//! expands into variants for the dimensions a recipe actually consults.
//!
//! [`used_variant_keys`] statically scans recipe text for the keys it needs.

mod matrix;
mod usage;

pub use matrix::VariantMatrix;
pub use usage::{used_variant_keys, used_variant_keys_in};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Set of variant keys, ordered for deterministic reporting.
pub type VariantKeySet = BTreeSet<String>;

/// Key holding the optional compiler → runtime override mapping.
pub const RUNTIMES_KEY: &str = "runtimes";

/// Key naming the cross-compilation target subdir.
pub const TARGET_PLATFORM_KEY: &str = "target_platform";

/// One point in the build matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variant(BTreeMap<String, Value>);

impl Variant {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a string value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), Value::String(value.into()));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Value as a string; numbers and booleans are coerced, `null` and containers are not.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `runtimes` override mapping, if the variant carries one.
    #[must_use]
    pub fn runtimes(&self) -> Option<BTreeMap<String, String>> {
        let Value::Object(map) = self.0.get(RUNTIMES_KEY)? else {
            return None;
        };
        Some(
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
        )
    }

    /// Keys of `used` that this variant does not define.
    #[must_use]
    pub fn missing_keys(&self, used: &VariantKeySet) -> Vec<String> {
        used.iter().filter(|k| !self.0.contains_key(k.as_str())).cloned().collect()
    }

    /// Short human-readable label of the form `python=3.6 target_platform=linux-64`.
    #[must_use]
    pub fn label(&self) -> String {
        self.0
            .keys()
            .filter(|k| k.as_str() != RUNTIMES_KEY)
            .filter_map(|k| self.get_str(k).map(|v| format!("{k}={v}")))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Variant {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<BTreeMap<String, Value>> for Variant {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_str_coerces_scalars() {
        let variant: Variant = [
            ("python", json!(2.7)),
            ("numpy", json!("1.11")),
            ("debug", json!(true)),
            ("runtimes", json!({"icc": "icc_rt"})),
        ]
        .into_iter()
        .collect();

        assert_eq!(variant.get_str("python").as_deref(), Some("2.7"));
        assert_eq!(variant.get_str("numpy").as_deref(), Some("1.11"));
        assert_eq!(variant.get_str("debug").as_deref(), Some("true"));
        assert_eq!(variant.get_str("runtimes"), None);
        assert_eq!(variant.get_str("absent"), None);
    }

    #[test]
    fn test_runtimes_override() {
        let variant: Variant =
            [("runtimes", json!({"icc": "icc_rt", "bad": 3}))].into_iter().collect();
        let runtimes = variant.runtimes().unwrap();
        assert_eq!(runtimes.get("icc").map(String::as_str), Some("icc_rt"));
        assert!(!runtimes.contains_key("bad"));

        assert!(Variant::new().runtimes().is_none());
    }

    #[test]
    fn test_missing_keys() {
        let variant = Variant::new().with("c_compiler", "gcc");
        let used: VariantKeySet =
            ["c_compiler", "target_platform"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(variant.missing_keys(&used), vec!["target_platform".to_string()]);
    }

    #[test]
    fn test_label_skips_runtimes() {
        let mut variant = Variant::new().with("python", "3.6").with("target_platform", "linux-64");
        variant.insert("runtimes", json!({"gcc": "libgcc"}));
        assert_eq!(variant.label(), "python=3.6 target_platform=linux-64");
    }
}
