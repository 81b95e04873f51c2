//! Dictionary values with the methods recipes call on them.
//!
//! Recipes treat `environ`, `variant` and the data returned by `load_setup_py_data` as
//! Python dictionaries: `environ.get('GIT_DESCRIBE_TAG', '0')`, `data.get('version')`,
//! `variant.items()`. The engine's own maps do not have these methods, so such values are
//! bound as [`Mapping`] objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use minijinja::value::{Enumerator, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind, State};

/// String-keyed mapping exposing `get`, `keys`, `values` and `items`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: BTreeMap<String, Value>,
}

impl Mapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build from a JSON object, turning nested objects into mappings too.
    #[must_use]
    pub fn from_json(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect()
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::from_object(self)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Convert JSON into an engine value, with objects as [`Mapping`]s.
#[must_use]
pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Object(map) => Mapping::from_json(map).into_value(),
        serde_json::Value::Array(items) => items.iter().map(json_to_value).collect(),
        scalar => Value::from_serialize(scalar),
    }
}

impl Object for Mapping {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.entries.get(key.as_str()?).cloned()
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.entries.keys().map(|k| Value::from(k.as_str())).collect())
    }

    fn enumerator_len(self: &Arc<Self>) -> Option<usize> {
        Some(self.entries.len())
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match (method, args) {
            ("get", [key]) => Ok(self.get_value(key).unwrap_or_else(|| Value::from(()))),
            ("get", [key, default]) => Ok(self.get_value(key).unwrap_or_else(|| default.clone())),
            ("keys", []) => Ok(self.entries.keys().map(|k| Value::from(k.as_str())).collect()),
            ("values", []) => Ok(self.entries.values().cloned().collect()),
            ("items", []) => Ok(self
                .entries
                .iter()
                .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
                .collect()),
            ("get" | "keys" | "values" | "items", _) => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("wrong number of arguments to {method}()"),
            )),
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::Environment;

    #[test]
    fn test_dict_methods() {
        let data = Mapping::from_json(
            serde_json::json!({"name": "pkg", "version": "1.0", "extras": {"test": ["pytest"]}})
                .as_object()
                .unwrap(),
        );
        let env = Environment::new();
        let out = env
            .render_str(
                "{{ data.get('version') }}|{{ data.get('license', 'MIT') }}|\
                 {{ data.extras.get('test')[0] }}|\
                 {% for k, v in data.items() %}{{ k }};{% endfor %}|\
                 {{ data|length }}|{{ data.version }}",
                minijinja::context! { data => data.into_value() },
            )
            .unwrap();
        assert_eq!(out, "1.0|MIT|pytest|extras;name;version;|3|1.0");
    }

    #[test]
    fn test_missing_key_is_none() {
        let env = Environment::new();
        let out = env
            .render_str(
                "{{ m.get('nope') is none }}",
                minijinja::context! { m => Mapping::new().into_value() },
            )
            .unwrap();
        assert_eq!(out, "true");
    }
}
