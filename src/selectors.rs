//! Line selectors: platform-conditional recipe lines.
//!
//! A recipe line may end in a selector marker, either as a comment or as a bare trailing
//! bracket:
//!
//! ```yaml
//! requirements:
//!   build:
//!     - m2-patch     # [win]
//!     - patch        # [not win]
//!     - python [py3k and linux]
//! ```
//!
//! [`select_lines`] evaluates each marker against a [`SelectorNamespace`] of platform
//! facts before any templating happens. Lines whose selector is false become empty lines
//! so that line numbers in later template errors still point at the recipe source; lines
//! whose selector is true are kept with the marker removed. Comment-only lines, blank
//! lines and lines without a marker are left untouched.
//!
//! Selector expressions are evaluated by the template engine's expression evaluator with
//! undefined names forbidden. A malformed selector or one naming an unknown fact is always
//! an error, whichever undefined policy the surrounding render uses.

use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::config::{Config, Platform};
use crate::constants::FEATURE_NOMKL_ENV;
use crate::core::RenderError;

/// Linux machine names that get their own selector fact.
pub const NON_X86_LINUX_MACHINES: &[&str] = &["armv6l", "armv7l", "ppc64le", "aarch64"];

/// Words the identifier check never treats as fact names.
const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "true", "false", "none", "True", "False", "None",
];

/// `content  # [expr]` with anything allowed after the closing bracket.
static COMMENTED_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*(#.*)\[([^\[\]]+)\].*$").expect("valid regex"));

/// `content [expr]` where the bracket closes the line.
static BARE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\[([^\[\]]+)\]$").expect("valid regex"));

static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).expect("valid regex"));

static TEST_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bis\s+(?:not\s+)?[A-Za-z_]\w*").expect("valid regex"));

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.|]\s*)?\b([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

/// Platform facts selectors are evaluated against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorNamespace {
    facts: BTreeMap<String, Value>,
}

impl SelectorNamespace {
    /// Facts for `config` plus the current process environment.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let env: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_config_and_env(config, &env)
    }

    /// Facts for `config` with an explicit environment.
    #[must_use]
    pub fn from_config_and_env(config: &Config, env: &BTreeMap<String, String>) -> Self {
        let mut facts = BTreeMap::new();
        let subdir = config.subdir();
        let is_linux = config.platform == Platform::Linux;
        let is_osx = config.platform == Platform::Osx;
        let is_win = config.platform == Platform::Win;
        let is_x86 = matches!(config.arch.as_str(), "32" | "64");

        let mut flag = |name: &str, value: bool| {
            facts.insert(name.to_string(), Value::Bool(value));
        };
        flag("linux", is_linux);
        flag("linux32", subdir == "linux-32");
        flag("linux64", subdir == "linux-64");
        flag("arm", is_linux && config.arch.starts_with("arm"));
        flag("osx", is_osx);
        flag("unix", is_linux || is_osx);
        flag("win", is_win);
        flag("win32", subdir == "win-32");
        flag("win64", subdir == "win-64");
        flag("x86", is_x86);
        flag("x86_64", config.arch == "64");
        for machine in NON_X86_LINUX_MACHINES {
            flag(machine, is_linux && config.arch == *machine);
        }

        let nomkl = env
            .get(FEATURE_NOMKL_ENV)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .is_some_and(|v| v != 0);
        flag("nomkl", nomkl);

        if let Some(py) = config.versions.python.as_deref().and_then(two_component_number) {
            flag("py3k", (30..40).contains(&py));
            flag("py2k", (20..30).contains(&py));
            for minor in [26, 27, 33, 34, 35, 36] {
                flag(&format!("py{minor}"), py == minor);
            }
            facts.insert("py".to_string(), Value::from(py));
        }
        if let Some(np) = config.versions.numpy.as_deref().and_then(two_component_number) {
            facts.insert("np".to_string(), Value::from(np));
        }

        facts.insert(
            "environ".to_string(),
            Value::Object(env.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect()),
        );
        for (key, value) in env {
            if is_identifier(key) && !facts.contains_key(key) {
                facts.insert(key.clone(), Value::String(value.clone()));
            }
        }

        Self { facts }
    }

    /// Add or replace a fact.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.facts.insert(name.into(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.facts.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.facts.keys().map(String::as_str)
    }

    /// Evaluate one selector expression to a boolean.
    ///
    /// # Errors
    ///
    /// Returns a message when the expression names an unknown fact, does not parse, or
    /// evaluates to an undefined value.
    pub fn evaluate(&self, expr: &str) -> Result<bool, String> {
        let env = selector_environment();
        self.evaluate_in(&env, expr)
    }

    fn evaluate_in(&self, env: &Environment<'_>, expr: &str) -> Result<bool, String> {
        self.check_names(expr)?;

        let compiled = env.compile_expression(expr).map_err(|e| e.to_string())?;
        let result = compiled
            .eval(minijinja::Value::from_serialize(&self.facts))
            .map_err(|e| e.to_string())?;
        if result.is_undefined() {
            return Err(format!("selector '{expr}' evaluated to an undefined value"));
        }
        Ok(result.is_true())
    }

    /// Reject identifiers that are not facts before the engine sees the expression.
    fn check_names(&self, expr: &str) -> Result<(), String> {
        let without_strings = STRING_LITERAL.replace_all(expr, " ");
        let without_tests = TEST_CLAUSE.replace_all(&without_strings, " ");

        for caps in IDENTIFIER.captures_iter(&without_tests) {
            if caps.get(1).is_some() {
                continue;
            }
            let Some(name) = caps.get(2).map(|m| m.as_str()) else {
                continue;
            };
            if KEYWORDS.contains(&name) || self.contains(name) {
                continue;
            }
            let mut message = format!("unknown name '{name}'");
            if let Some(suggestion) = self.closest_name(name) {
                message.push_str(&format!(", did you mean '{suggestion}'?"));
            }
            return Err(message);
        }
        Ok(())
    }

    fn closest_name(&self, name: &str) -> Option<&str> {
        self.facts
            .keys()
            .map(|candidate| (candidate, strsim::levenshtein(name, candidate)))
            .filter(|(_, distance)| *distance <= 2)
            .min_by_key(|(_, distance)| *distance)
            .map(|(candidate, _)| candidate.as_str())
    }
}

fn selector_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

/// `"3.6"` → 36, `"1.11"` → 111; `None` if the first two components are not numeric.
fn two_component_number(version: &str) -> Option<i64> {
    let joined: String = version.split('.').take(2).collect();
    if joined.is_empty() || !joined.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    joined.parse().ok()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Apply line selectors to recipe text.
///
/// The output has exactly as many lines as the input and keeps a trailing newline if the
/// input had one.
///
/// # Errors
///
/// [`RenderError::InvalidSelector`] for the first selector that cannot be evaluated.
///
/// # Examples
///
/// ```rust
/// use recipe_render::config::Config;
/// use recipe_render::selectors::{select_lines, SelectorNamespace};
///
/// let ns = SelectorNamespace::from_config(&Config::for_subdir("linux-64").unwrap());
/// let out = select_lines("a: 1  # [win]\nb: 2  # [linux]\nc: 3\n", &ns).unwrap();
/// assert_eq!(out, "\nb: 2\nc: 3\n");
/// ```
pub fn select_lines(text: &str, namespace: &SelectorNamespace) -> Result<String, RenderError> {
    let env = selector_environment();
    let (body, trailing_newline) = match text.strip_suffix('\n') {
        Some(body) => (body, true),
        None => (text, false),
    };

    let mut out = Vec::new();
    for (index, raw) in body.split('\n').enumerate() {
        let (line, cr) = match raw.strip_suffix('\r') {
            Some(line) => (line, "\r"),
            None => (raw, ""),
        };
        let trimmed = line.trim_end();

        if trimmed.trim_start().starts_with('#') {
            out.push(raw.to_string());
            continue;
        }

        let Some((content, expr)) = split_marker(trimmed) else {
            out.push(raw.to_string());
            continue;
        };

        let keep = namespace.evaluate_in(&env, expr.trim()).map_err(|message| {
            RenderError::InvalidSelector {
                line: index + 1,
                text: line.to_string(),
                message,
            }
        })?;

        if keep {
            let trailing_quote = match trimmed.chars().last() {
                Some(q @ ('\'' | '"')) if !content.ends_with(q) => q.to_string(),
                _ => String::new(),
            };
            tracing::trace!("selector [{expr}] kept line {}", index + 1);
            out.push(format!("{content}{trailing_quote}{cr}"));
        } else {
            tracing::trace!("selector [{expr}] removed line {}", index + 1);
            out.push(cr.to_string());
        }
    }

    let mut result = out.join("\n");
    if trailing_newline {
        result.push('\n');
    }
    Ok(result)
}

/// Split a line into its content and selector expression, if it carries a marker.
fn split_marker(line: &str) -> Option<(&str, &str)> {
    if let Some(caps) = COMMENTED_MARKER.captures(line) {
        return Some((caps.get(1)?.as_str(), caps.get(3)?.as_str()));
    }
    let caps = BARE_MARKER.captures(line)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}
