//! Template context for one render pass.
//!
//! [`ContextBuilder`] assembles everything a recipe can reference: the derived build
//! variables (see [`crate::environ`]), `environ`, `variant`, `installed`, and the callables
//! `compiler`, `runtime`, `pin_compatible`, `load_setup_py_data`, `load_setuptools`,
//! `load_file_regex` and `load_npm`. Every callable captures the configuration, variant and
//! undefined policy of the pass it was built for, so recipes call them with their own
//! arguments only:
//!
//! ```jinja
//! {% set data = load_setup_py_data() %}
//! {% set version = load_file_regex(load_file='pkg/__init__.py',
//!                                  regex_pattern="__version__ = '(.+)'") %}
//! requirements:
//!   build:
//!     - {{ compiler('c') }}
//!   run:
//!     - numpy {{ pin_compatible('numpy') }}
//! ```
//!
//! The resulting [`RenderContext`] is the engine's root context object. Names it does not
//! bind are resolved by policy: the lenient pass gets a
//! [`LenientValue`](super::lenient::LenientValue) placeholder, the strict pass gets nothing
//! and the engine reports an undefined value. Both record the name in the pass's
//! [`UnresolvedNameLog`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use minijinja::value::{ArgType, Enumerator, Kwargs, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind};

use super::lenient::{LenientValue, SUBSTITUTE_NAME, UnresolvedNameLog};
use super::mapping::{Mapping, json_to_value};
use crate::buildenv::{InstalledPackages, pin_compatible};
use crate::compilers::{self, Language};
use crate::config::Config;
use crate::constants::SETUP_PY;
use crate::core::{RenderError, UndefinedPolicy};
use crate::environ::{RecipeMetadata, build_environ};
use crate::project::{self, FileRegexResult};
use crate::variants::Variant;

/// Names the engine provides itself; the root context must not shadow them.
const ENGINE_NAMES: &[&str] = &[
    "range", "dict", "namespace", "debug", "lipsum", "cycler", "joiner", "loop", "self", "super",
    "caller", "varargs", "kwargs",
];

/// Root context object of a render pass.
#[derive(Debug)]
pub struct RenderContext {
    bindings: BTreeMap<String, Value>,
    policy: UndefinedPolicy,
    log: UnresolvedNameLog,
}

impl RenderContext {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Names bound in this context, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    #[must_use]
    pub const fn policy(&self) -> UndefinedPolicy {
        self.policy
    }

    #[must_use]
    pub fn log(&self) -> &UnresolvedNameLog {
        &self.log
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::from_object(self)
    }
}

impl Object for RenderContext {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let name = key.as_str()?;
        if let Some(value) = self.bindings.get(name) {
            return Some(value.clone());
        }
        if ENGINE_NAMES.contains(&name) {
            return None;
        }
        if !self.policy.permits_undefined() {
            self.log.record(name);
            return None;
        }
        if name == SUBSTITUTE_NAME {
            Some(LenientValue::substitute(self.log.clone()).into_value())
        } else {
            Some(LenientValue::new(name, self.log.clone()).into_value())
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.bindings.keys().map(|k| Value::from(k.as_str())).collect())
    }
}

/// State shared by the callables of one context.
#[derive(Debug)]
struct Scope {
    config: Arc<Config>,
    recipe_dir: Option<PathBuf>,
    variant: Variant,
    policy: UndefinedPolicy,
    installed: InstalledPackages,
}

/// Builds the [`RenderContext`] of one render pass.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    config: Arc<Config>,
    recipe_dir: Option<PathBuf>,
    variant: Variant,
    policy: UndefinedPolicy,
    metadata: RecipeMetadata,
    installed: Option<InstalledPackages>,
    process_env: Option<BTreeMap<String, String>>,
}

impl ContextBuilder {
    pub fn new(
        config: Arc<Config>,
        recipe_dir: Option<PathBuf>,
        variant: Variant,
        policy: UndefinedPolicy,
    ) -> Self {
        Self {
            config,
            recipe_dir,
            variant,
            policy,
            metadata: RecipeMetadata::default(),
            installed: None,
            process_env: None,
        }
    }

    #[must_use]
    pub fn metadata(mut self, metadata: RecipeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Use these packages instead of reading the build prefix.
    #[must_use]
    pub fn installed(mut self, installed: InstalledPackages) -> Self {
        self.installed = Some(installed);
        self
    }

    /// Use this environment instead of the process environment for `environ`.
    #[must_use]
    pub fn process_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.process_env = Some(env);
        self
    }

    /// Build the context, recording unresolved names into `log`.
    ///
    /// # Errors
    ///
    /// Errors reading the packages installed in the build prefix.
    pub fn build(self, log: UnresolvedNameLog) -> Result<RenderContext, RenderError> {
        let installed = match self.installed {
            Some(installed) => installed,
            None => InstalledPackages::load(&self.config.build_prefix)?,
        };
        let derived =
            build_environ(&self.config, self.recipe_dir.as_deref(), &self.metadata, &self.variant);

        let mut bindings: BTreeMap<String, Value> = derived
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();

        let mut environ = self.process_env.unwrap_or_else(|| std::env::vars().collect());
        environ.extend(derived);
        bindings.insert(
            "environ".to_string(),
            environ.into_iter().map(|(k, v)| (k, Value::from(v))).collect::<Mapping>().into_value(),
        );
        bindings.insert(
            "variant".to_string(),
            self.variant
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect::<Mapping>()
                .into_value(),
        );
        bindings.insert("installed".to_string(), Value::from_serialize(&installed));

        let scope = Arc::new(Scope {
            config: self.config,
            recipe_dir: self.recipe_dir,
            variant: self.variant,
            policy: self.policy,
            installed,
        });
        bindings.insert("compiler".to_string(), compiler_function(scope.clone()));
        bindings.insert("runtime".to_string(), runtime_function(scope.clone()));
        bindings.insert("pin_compatible".to_string(), pin_compatible_function(scope.clone()));
        bindings.insert("load_setup_py_data".to_string(), setup_py_function(scope.clone(), false));
        bindings.insert("load_setuptools".to_string(), setup_py_function(scope.clone(), true));
        bindings.insert("load_file_regex".to_string(), file_regex_function(scope));
        bindings.insert("load_npm".to_string(), Value::from_function(load_npm));

        Ok(RenderContext {
            bindings,
            policy: self.policy,
            log,
        })
    }
}

fn none() -> Value {
    Value::from(())
}

fn engine<T>(result: Result<T, RenderError>) -> Result<T, Error> {
    result.map_err(RenderError::into_engine_error)
}

/// Positional argument if given, otherwise the keyword argument of the same name.
fn argument<'a, T>(
    positional: Option<T>,
    kwargs: &'a Kwargs,
    name: &'a str,
) -> Result<Option<T>, Error>
where
    Option<T>: ArgType<'a, Output = Option<T>>,
{
    match positional {
        Some(value) => Ok(Some(value)),
        None => kwargs.get::<Option<T>>(name),
    }
}

fn required<T>(value: Option<T>, function: &str, name: &str) -> Result<T, Error> {
    value.ok_or_else(|| {
        Error::new(ErrorKind::MissingArgument, format!("{function}() missing argument '{name}'"))
    })
}

fn compiler_function(scope: Arc<Scope>) -> Value {
    Value::from_function(move |language: String| -> Result<String, Error> {
        let language: Language = engine(language.parse())?;
        engine(compilers::compiler(language, &scope.config, &scope.variant, scope.policy))
    })
}

fn runtime_function(scope: Arc<Scope>) -> Value {
    Value::from_function(move |language: String| -> Result<String, Error> {
        let language: Language = engine(language.parse())?;
        engine(compilers::runtime(language, &scope.config, &scope.variant, scope.policy))
    })
}

fn pin_compatible_function(scope: Arc<Scope>) -> Value {
    Value::from_function(
        move |package: String, table: Option<Value>, kwargs: Kwargs| -> Result<Value, Error> {
            let table = argument(table, &kwargs, "table")?;
            kwargs.assert_all_used()?;
            let table = match table {
                Some(table) => lookup_table(&table)?,
                None => None,
            };
            let pin =
                pin_compatible(&scope.installed, &package, table.as_ref(), scope.policy);
            let pin = engine(pin)?;
            Ok(pin.map_or_else(none, Value::from))
        },
    )
}

/// Read a `{package: constraint}` table passed from a template.
fn lookup_table(table: &Value) -> Result<Option<BTreeMap<String, String>>, Error> {
    if table.is_none() || table.is_undefined() || LenientValue::is_placeholder(table) {
        return Ok(None);
    }
    let mut entries = BTreeMap::new();
    for key in table.try_iter()? {
        let value = table.get_item(&key)?;
        let value = value.as_str().map_or_else(|| value.to_string(), str::to_string);
        entries.insert(key.to_string(), value);
    }
    Ok(Some(entries))
}

fn setup_py_function(scope: Arc<Scope>, deprecated: bool) -> Value {
    Value::from_function(
        move |setup_file: Option<String>,
              from_recipe_dir: Option<bool>,
              kwargs: Kwargs|
              -> Result<Value, Error> {
            if deprecated {
                tracing::warn!(
                    "Deprecation notice: the load_setuptools function has been renamed to \
                     load_setup_py_data. load_setuptools will be removed in a future release."
                );
            }
            let setup_file = argument(setup_file, &kwargs, "setup_file")?
                .unwrap_or_else(|| SETUP_PY.to_string());
            let from_recipe_dir =
                argument(from_recipe_dir, &kwargs, "from_recipe_dir")?.unwrap_or(false);
            kwargs.assert_all_used()?;

            let data = engine(project::load_setup_py_data(
                &scope.config,
                scope.recipe_dir.as_deref(),
                &setup_file,
                from_recipe_dir,
                scope.policy,
            ))?;
            Ok(data.map_or_else(none, |data| Mapping::from_json(&data).into_value()))
        },
    )
}

fn file_regex_function(scope: Arc<Scope>) -> Value {
    Value::from_function(
        move |load_file: Option<String>,
              regex_pattern: Option<String>,
              from_recipe_dir: Option<bool>,
              kwargs: Kwargs|
              -> Result<Value, Error> {
            let load_file = argument(load_file, &kwargs, "load_file")?;
            let load_file = required(load_file, "load_file_regex", "load_file")?;
            let regex_pattern = argument(regex_pattern, &kwargs, "regex_pattern")?;
            let regex_pattern = required(regex_pattern, "load_file_regex", "regex_pattern")?;
            let from_recipe_dir =
                argument(from_recipe_dir, &kwargs, "from_recipe_dir")?.unwrap_or(false);
            kwargs.assert_all_used()?;

            let result = engine(project::load_file_regex(
                &scope.config,
                scope.recipe_dir.as_deref(),
                &load_file,
                &regex_pattern,
                from_recipe_dir,
                scope.policy,
            ))?;
            Ok(match result {
                FileRegexResult::SourceUnavailable => Mapping::new().into_value(),
                FileRegexResult::NoMatch => none(),
                FileRegexResult::Match(found) => Value::from_object(found),
            })
        },
    )
}

fn load_npm() -> Result<Value, Error> {
    let manifest = engine(project::load_npm())?;
    Ok(json_to_value(&manifest))
}
