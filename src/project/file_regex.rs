//! Regex search over a project file, e.g. to pick a version out of `__init__.py`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use minijinja::value::{Enumerator, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind, State};
use regex::Regex;

use super::locate;
use crate::config::Config;
use crate::core::{RenderError, UndefinedPolicy};

/// Outcome of [`load_file_regex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRegexResult {
    /// The source directory is not available yet (lenient only)
    SourceUnavailable,
    /// The file is missing (lenient only) or the pattern did not match
    NoMatch,
    /// First match of the pattern
    Match(RegexMatch),
}

/// A successful search, usable from templates like a Python match object:
/// `m.group(1)`, `m.groups()`, `m.groupdict()`, `m.start()`, `m.end()`, `m.span()`, and
/// `m[1]` / `m['name']`. Rendering the match yields the matched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexMatch {
    /// Group 0 followed by the capture groups; `None` for groups that did not participate
    groups: Vec<Option<String>>,
    names: BTreeMap<String, usize>,
    /// Character offsets of the whole match
    span: (usize, usize),
}

impl RegexMatch {
    fn from_captures(regex: &Regex, haystack: &str, captures: &regex::Captures<'_>) -> Self {
        let groups = captures
            .iter()
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();
        let names = regex
            .capture_names()
            .enumerate()
            .filter_map(|(index, name)| name.map(|n| (n.to_string(), index)))
            .collect();
        let whole = captures.get(0).map_or(0..0, |m| m.range());
        let chars = |byte: usize| haystack[..byte].chars().count();
        Self {
            groups,
            names,
            span: (chars(whole.start), chars(whole.end)),
        }
    }

    /// Text matched by the whole pattern.
    #[must_use]
    pub fn matched(&self) -> &str {
        self.group(0).unwrap_or_default()
    }

    /// Text of capture group `index`; group 0 is the whole match.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// Text of the named capture group.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&str> {
        self.names.get(name).and_then(|&index| self.group(index))
    }

    #[must_use]
    pub fn span(&self) -> (usize, usize) {
        self.span
    }

    fn group_value(&self, key: &Value) -> Result<Value, Error> {
        let index = if let Some(name) = key.as_str() {
            self.names.get(name).copied()
        } else {
            key.as_i64().and_then(|i| usize::try_from(i).ok())
        };
        match index {
            Some(index) if index < self.groups.len() => Ok(Value::from(self.groups[index].clone())),
            _ => Err(Error::new(ErrorKind::InvalidOperation, format!("no such group: {key}"))),
        }
    }
}

impl Object for RegexMatch {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.group_value(key).ok()
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::NonEnumerable
    }

    fn is_true(self: &Arc<Self>) -> bool {
        true
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "group" => match args {
                [] => self.group_value(&Value::from(0)),
                [key] => self.group_value(key),
                keys => keys
                    .iter()
                    .map(|key| self.group_value(key))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::from),
            },
            "groups" => Ok(Value::from(self.groups.iter().skip(1).cloned().collect::<Vec<_>>())),
            "groupdict" => Ok(Value::from_iter(
                self.names
                    .iter()
                    .map(|(name, &index)| (name.clone(), Value::from(self.groups[index].clone()))),
            )),
            "start" => Ok(Value::from(self.span.0)),
            "end" => Ok(Value::from(self.span.1)),
            "span" => Ok(Value::from(vec![self.span.0, self.span.1])),
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.matched())
    }
}

/// Search `load_file` for the first match of `regex_pattern`.
///
/// # Errors
///
/// - [`RenderError::SourceNotFound`] under the strict policy when the source directory or the
///   file is missing
/// - [`RenderError::InvalidRegex`] when the pattern does not compile
/// - [`RenderError::Io`] when the file cannot be read
pub fn load_file_regex(
    config: &Config,
    recipe_dir: Option<&Path>,
    load_file: &str,
    regex_pattern: &str,
    from_recipe_dir: bool,
    policy: UndefinedPolicy,
) -> Result<FileRegexResult, RenderError> {
    let Some(located) = locate(load_file, from_recipe_dir, recipe_dir, config) else {
        let reason = format!(
            "Did not find {load_file} file in manually specified location, \
             and source not downloaded yet"
        );
        if policy.permits_undefined() {
            tracing::debug!("{reason}");
            return Ok(FileRegexResult::SourceUnavailable);
        }
        return Err(RenderError::SourceNotFound {
            path: config.work_dir.join(load_file),
            reason,
        });
    };

    if !located.path.is_file() {
        if policy.permits_undefined() {
            tracing::debug!("{} does not exist yet", located.path.display());
            return Ok(FileRegexResult::NoMatch);
        }
        return Err(RenderError::SourceNotFound {
            path: located.path,
            reason: "not a file that can be read".to_string(),
        });
    }

    let regex = Regex::new(regex_pattern).map_err(|source| RenderError::InvalidRegex {
        pattern: regex_pattern.to_string(),
        source,
    })?;
    let text = std::fs::read_to_string(&located.path)
        .map_err(|e| RenderError::io("reading", &located.path, e))?;

    Ok(match regex.captures(&text) {
        Some(captures) => {
            FileRegexResult::Match(RegexMatch::from_captures(&regex, &text, &captures))
        }
        None => FileRegexResult::NoMatch,
    })
}
