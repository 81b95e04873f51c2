//! Two-pass recipe rendering.
//!
//! A recipe is rendered twice. The exploratory pass runs with the lenient policy: unknown
//! names become placeholders and missing project files degrade to empty results, so a
//! recipe renders before its source has been downloaded. The final pass starts from scratch
//! with the strict policy and fails on anything still unresolved. Nothing computed by the
//! exploratory pass is carried into the final one; its output is returned for inspection
//! only.
//!
//! Each pass gets its own engine environment, selector-filtering loader, context and
//! [`UnresolvedNameLog`].
//!
//! When the engine itself rejects an operation during the lenient pass (arithmetic,
//! slicing or negation of a placeholder), the failing expression in the recipe text is
//! replaced by [`SUBSTITUTE_NAME`] and the pass is rendered again. Replacement keeps line
//! numbers intact and only applies to the top-level recipe, not to included templates.

use std::path::PathBuf;
use std::sync::Arc;

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use strsim::levenshtein;

use super::context::ContextBuilder;
use super::error::{ErrorLocation, TemplateError};
use super::filters;
use super::lenient::{self, SUBSTITUTE_NAME, UnresolvedNameLog};
use super::loader::{RecipeLoader, SourceLoader, TemplateSource};
use crate::config::Config;
use crate::core::{RenderError, UndefinedPolicy};
use crate::environ::RecipeMetadata;
use crate::variants::{Variant, VariantKeySet, used_variant_keys};

/// Maximum allowed Levenshtein distance as a percentage of target length for suggestions.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Lines shown before and after the failing line in template errors.
const CONTEXT_LINES: usize = 5;

/// Upper bound on expression replacements in one lenient pass.
const MAX_SUBSTITUTIONS: usize = 64;

/// What to render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Template name as known to the loader
    pub template: String,
    /// Directory `from_recipe_dir` lookups resolve against
    pub recipe_dir: Option<PathBuf>,
    pub variant: Variant,
    pub metadata: RecipeMetadata,
}

impl RenderRequest {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            metadata: RecipeMetadata::new(&template),
            template,
            recipe_dir: None,
            variant: Variant::new(),
        }
    }

    #[must_use]
    pub fn with_recipe_dir(mut self, recipe_dir: impl Into<PathBuf>) -> Self {
        self.recipe_dir = Some(recipe_dir.into());
        self
    }

    #[must_use]
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: RecipeMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Output of a single render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutput {
    pub policy: UndefinedPolicy,
    pub text: String,
    /// Names the pass could not resolve, sorted
    pub unresolved: Vec<String>,
}

/// Result of a complete two-pass render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Output of the exploratory pass
    pub exploratory: PassOutput,
    /// Final rendered recipe text
    pub text: String,
    /// Variant keys the recipe consults
    pub used_variant_keys: VariantKeySet,
}

/// Renders recipes from a [`SourceLoader`] for one build configuration.
pub struct RecipeRenderer {
    config: Arc<Config>,
    loader: Arc<dyn SourceLoader>,
}

impl RecipeRenderer {
    pub fn new(config: Arc<Config>, loader: Arc<dyn SourceLoader>) -> Self {
        Self { config, loader }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the exploratory pass, then the final pass.
    ///
    /// # Errors
    ///
    /// Any error of either pass; see [`render_pass`](Self::render_pass).
    pub fn render(&self, request: &RenderRequest) -> Result<RenderOutcome, RenderError> {
        tracing::debug!(
            "Rendering '{}' for {} ({})",
            request.template,
            self.config.subdir(),
            request.variant.label()
        );

        let exploratory = self.render_pass(request, UndefinedPolicy::Lenient)?;
        if !exploratory.unresolved.is_empty() {
            tracing::debug!(
                "Exploratory pass left {} unresolved: {}",
                exploratory.unresolved.len(),
                exploratory.unresolved.join(", ")
            );
        }

        let raw = self.loader.get_source(&request.template)?;
        let used = used_variant_keys(&raw.text);
        let final_pass = self.render_pass(request, UndefinedPolicy::Strict)?;

        tracing::debug!("Rendered '{}'", request.template);
        Ok(RenderOutcome {
            exploratory,
            text: final_pass.text,
            used_variant_keys: used,
        })
    }

    /// Render once under `policy` with a fresh environment, loader and context.
    ///
    /// # Errors
    ///
    /// - [`RenderError::MissingVariantKeys`] (strict only) when the variant lacks keys the
    ///   recipe's `compiler()` calls need, checked before the engine runs
    /// - [`RenderError::InvalidSelector`] and loader errors
    /// - errors raised by template callables, unchanged
    /// - [`RenderError::Template`] for every other engine failure
    pub fn render_pass(
        &self,
        request: &RenderRequest,
        policy: UndefinedPolicy,
    ) -> Result<PassOutput, RenderError> {
        let recipe_loader = Arc::new(RecipeLoader::new(Arc::clone(&self.loader), &self.config));

        if policy == UndefinedPolicy::Strict {
            let raw = recipe_loader.get_raw_source(&request.template)?;
            let missing = request.variant.missing_keys(&used_variant_keys(&raw.text));
            if !missing.is_empty() {
                return Err(RenderError::MissingVariantKeys {
                    recipe: request.template.clone(),
                    keys: missing,
                });
            }
        }

        let source = recipe_loader.get_source(&request.template)?;

        let log = UnresolvedNameLog::new();
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        match policy {
            UndefinedPolicy::Lenient => {
                env.set_undefined_behavior(UndefinedBehavior::Chainable);
                filters::register_lenient(&mut env);
                lenient::register_unknown_methods(&mut env, &log);
            }
            UndefinedPolicy::Strict => env.set_undefined_behavior(UndefinedBehavior::Strict),
        }
        env.set_loader(Arc::clone(&recipe_loader).engine_loader());

        let context = ContextBuilder::new(
            Arc::clone(&self.config),
            request.recipe_dir.clone(),
            request.variant.clone(),
            policy,
        )
        .metadata(request.metadata.clone())
        .build(log.clone())?;
        let bound: Vec<String> = context.names().map(str::to_string).collect();
        let root = context.into_value();

        tracing::debug!("Starting {policy} pass of '{}'", request.template);
        let mut recipe_text = source.text.clone();
        let mut substituted: Option<minijinja::Error> = None;
        let mut substitutions = 0;
        let text = loop {
            let error = match env.render_named_str(&request.template, &recipe_text, root.clone()) {
                Ok(rendered) => break rendered,
                Err(error) => error,
            };

            let rewritten = (policy.permits_undefined() && substitutions < MAX_SUBSTITUTIONS)
                .then(|| substitute_failed_expression(&error, &request.template, &recipe_text))
                .flatten();
            if let Some(rewritten) = rewritten {
                tracing::debug!(
                    "Substituting placeholder for failed expression at {}:{}: {}",
                    request.template,
                    error.line().unwrap_or_default(),
                    error.detail().unwrap_or_default()
                );
                substitutions += 1;
                recipe_text = rewritten;
                substituted = Some(error);
                continue;
            }

            // A replacement that broke the syntax reports the failure it replaced.
            let error = match substituted {
                Some(previous) if error.kind() == ErrorKind::SyntaxError => previous,
                _ => error,
            };
            return Err(Self::parse_engine_error(
                &error,
                request,
                &source,
                &recipe_loader,
                &log,
                &bound,
                policy,
            ));
        };

        Ok(PassOutput {
            policy,
            text,
            unresolved: log.names(),
        })
    }

    /// Return the typed error a callable raised, or describe the engine failure.
    fn parse_engine_error(
        error: &minijinja::Error,
        request: &RenderRequest,
        source: &TemplateSource,
        loader: &RecipeLoader,
        log: &UnresolvedNameLog,
        bound: &[String],
        policy: UndefinedPolicy,
    ) -> RenderError {
        if let Some(typed) = typed_source(error) {
            return typed;
        }

        let template_name = error.name().unwrap_or(request.template.as_str()).to_string();
        let (text, file_path) = if template_name == request.template {
            (source.text.clone(), source.origin.clone())
        } else {
            loader
                .get_source(&template_name)
                .map(|s| (s.text, s.origin))
                .unwrap_or_default()
        };
        let line_number = error.line();
        let context_lines = line_number
            .map(|line| Self::extract_context_lines(&text, line, CONTEXT_LINES))
            .filter(|lines| !lines.is_empty());
        let error_line = line_number.and_then(|line| text.lines().nth(line.saturating_sub(1)));

        let location = Box::new(ErrorLocation {
            template_name,
            file_path,
            line_number,
            context_lines,
            policy,
        });
        let message = error.detail().map_or_else(|| error.to_string(), str::to_string);

        match error.kind() {
            ErrorKind::UndefinedError => {
                let unresolved = log.names();
                let variable = unresolved
                    .iter()
                    .filter(|name| error_line.is_some_and(|line| line.contains(name.as_str())))
                    .max_by_key(|name| name.len())
                    .or_else(|| unresolved.first())
                    .cloned()
                    .unwrap_or(message);
                let suggestions = Self::find_similar_variables(&variable, bound);
                TemplateError::UndefinedVariable {
                    variable,
                    unresolved,
                    suggestions,
                    location,
                }
                .into()
            }
            ErrorKind::SyntaxError => TemplateError::SyntaxError { message, location }.into(),
            kind => TemplateError::RenderFailed {
                kind: format!("{kind:?}"),
                message,
                location,
            }
            .into(),
        }
    }

    /// Find similar variable names using Levenshtein distance
    fn find_similar_variables(target: &str, available: &[String]) -> Vec<String> {
        let mut scored: Vec<_> = available
            .iter()
            .map(|var| (var, levenshtein(target, var)))
            .filter(|(_, dist)| *dist <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
            .collect();
        scored.sort_by_key(|(_, dist)| *dist);
        scored.into_iter().take(3).map(|(var, _)| var.clone()).collect()
    }

    /// Up to `context_size` lines before and after `error_line` (1-based), with their
    /// line numbers.
    fn extract_context_lines(
        content: &str,
        error_line: usize,
        context_size: usize,
    ) -> Vec<(usize, String)> {
        let lines: Vec<&str> = content.lines().collect();
        if error_line == 0 || error_line > lines.len() {
            return Vec::new();
        }

        let start = error_line.saturating_sub(context_size + 1);
        let end = (error_line + context_size).min(lines.len());
        lines[start..end]
            .iter()
            .enumerate()
            .map(|(idx, line)| (start + idx + 1, (*line).to_string()))
            .collect()
    }
}

impl std::fmt::Debug for RecipeRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeRenderer").field("config", &self.config).finish_non_exhaustive()
    }
}

/// `text` with the expression an operation error points at replaced by
/// [`SUBSTITUTE_NAME`], or `None` when the error cannot be recovered that way.
///
/// Newlines inside the replaced expression are kept so later line numbers still match the
/// recipe.
fn substitute_failed_expression(
    error: &minijinja::Error,
    template: &str,
    text: &str,
) -> Option<String> {
    if error.kind() != ErrorKind::InvalidOperation
        || error.name() != Some(template)
        || typed_source(error).is_some()
    {
        return None;
    }
    let range = error.range()?;
    let failed = text.get(range.clone())?;
    if failed.trim().is_empty() || failed.trim() == SUBSTITUTE_NAME {
        return None;
    }

    let mut rewritten = String::with_capacity(text.len() + SUBSTITUTE_NAME.len());
    rewritten.push_str(&text[..range.start]);
    rewritten.push_str(SUBSTITUTE_NAME);
    rewritten.extend(failed.chars().filter(|&c| c == '\n'));
    rewritten.push_str(&text[range.end..]);
    Some(rewritten)
}

/// First [`RenderError`] in the source chain of an engine error.
fn typed_source(error: &minijinja::Error) -> Option<RenderError> {
    let mut current = std::error::Error::source(error);
    while let Some(err) = current {
        if let Some(typed) = err.downcast_ref::<RenderError>() {
            return Some(typed.clone());
        }
        current = err.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templating::loader::MemoryLoader;
    use tempfile::TempDir;

    fn renderer(temp: &TempDir, loader: MemoryLoader) -> RecipeRenderer {
        let config = Config::for_subdir("linux-64").unwrap().with_croot(temp.path().join("croot"));
        RecipeRenderer::new(Arc::new(config), Arc::new(loader))
    }

    fn recipe(temp: &TempDir, text: &str) -> RecipeRenderer {
        renderer(temp, MemoryLoader::new().with("meta.yaml", text))
    }

    fn pass(renderer: &RecipeRenderer, policy: UndefinedPolicy) -> Result<PassOutput, RenderError> {
        renderer.render_pass(&RenderRequest::new("meta.yaml"), policy)
    }

    #[test]
    fn test_lenient_then_strict() {
        let temp = TempDir::new().unwrap();
        let loader = MemoryLoader::new().with(
            "meta.yaml",
            "package:\n  name: demo\n  version: {{ version }}\n\
             build:\n  number: {{ build_number|int }}  # [linux]\n",
        );
        let renderer = renderer(&temp, loader);
        let request = RenderRequest::new("meta.yaml");

        let lenient = renderer.render_pass(&request, UndefinedPolicy::Lenient).unwrap();
        assert_eq!(lenient.text, "package:\n  name: demo\n  version: \nbuild:\n  number: 0\n");
        assert_eq!(lenient.unresolved, vec!["build_number".to_string(), "version".to_string()]);

        let error = renderer.render(&request).unwrap_err();
        let RenderError::Template(template_error) = error else {
            panic!("expected a template error, got {error:?}");
        };
        match *template_error {
            TemplateError::UndefinedVariable {
                ref variable,
                ref location,
                ..
            } => {
                assert_eq!(variable, "version");
                assert_eq!(location.line_number, Some(3));
                assert_eq!(location.policy, UndefinedPolicy::Strict);
            }
            ref other => panic!("unexpected error: {other:?}"),
        }
    }

    fn lenient_text(temp: &TempDir, template: &str) -> String {
        pass(&recipe(temp, template), UndefinedPolicy::Lenient).unwrap().text
    }

    #[test]
    fn test_lenient_arithmetic_on_placeholders() {
        let temp = TempDir::new().unwrap();
        for template in [
            "[{{ data + 1 }}]",
            "[{{ 1 + data }}]",
            "[{{ data - 1 }}]",
            "[{{ -data }}]",
            "[{{ data // 2 }}]",
            "[{{ data ** 2 }}]",
            "[{{ data / 2 }}]",
            "[{{ data % 2 }}]",
            "[{{ data.x * 2 }}]",
            "[{{ (data + 1) * 2 }}]",
        ] {
            assert_eq!(lenient_text(&temp, template), "[]", "{template}");
        }
    }

    #[test]
    fn test_lenient_slice_then_filter() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            lenient_text(
                &temp,
                "[{{ data[:2]|upper }}][{{ data.items[1:]|length }}][{{ data[::-1] }}]"
            ),
            "[][0][]"
        );
    }

    #[test]
    fn test_lenient_substitution_keeps_names() {
        let temp = TempDir::new().unwrap();
        let renderer = recipe(&temp, "a: {{ major + 1 }}\nb: {{ minor }}\nc: {{ 2 + 3 }}\n");
        let output = pass(&renderer, UndefinedPolicy::Lenient).unwrap();
        assert_eq!(output.text, "a: \nb: \nc: 5\n");
        assert_eq!(output.unresolved, vec!["major".to_string(), "minor".to_string()]);
    }

    #[test]
    fn test_lenient_substitution_keeps_line_numbers() {
        let temp = TempDir::new().unwrap();
        assert_eq!(lenient_text(&temp, "a: {{ data[:2\n] }}\nb: {{ minor }}\n"), "a: \nb: \n");

        let renderer =
            recipe(&temp, "a: {{ data[:2\n] }}\nb: {{ load_file_regex(load_file='x') }}\n");
        let error = pass(&renderer, UndefinedPolicy::Lenient).unwrap_err();
        let RenderError::Template(template_error) = error else {
            panic!("expected a template error, got {error:?}");
        };
        match *template_error {
            TemplateError::RenderFailed { ref location, .. } => {
                assert_eq!(location.line_number, Some(3));
            }
            ref other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lenient_ordering_follows_engine() {
        let temp = TempDir::new().unwrap();
        let text = lenient_text(
            &temp,
            "{% if data > 1 %}gt{% endif %}{% if data < 1 %}lt{% endif %}\
             {% if data == 1 %}eq{% endif %}{% if 'x' in data %}in{% endif %}\
             {% if not data %}|falsy{% endif %}",
        );
        assert_eq!(text, "gt|falsy");
    }

    #[test]
    fn test_strict_pass_keeps_operation_errors() {
        let temp = TempDir::new().unwrap();
        let renderer = recipe(&temp, "{{ SUBDIR + 1 }}\n");
        let error = pass(&renderer, UndefinedPolicy::Strict).unwrap_err();
        assert!(matches!(
            error,
            RenderError::Template(ref e) if matches!(**e, TemplateError::RenderFailed { .. })
        ));
        assert_eq!(lenient_text(&temp, "[{{ SUBDIR + 1 }}]"), "[]");
    }

    #[test]
    fn test_lenient_methods_on_project_data_before_source() {
        let temp = TempDir::new().unwrap();
        let text = lenient_text(
            &temp,
            "{% set m = load_file_regex('x.py', 'v(.+)') %}\
             [{{ m.group(1) }}][{{ m.groups()|length }}] \
             {% set data = load_setup_py_data() %}\
             [{{ data.get('version', '0') }}][{{ data.version }}][{{ data.setdefault('name') }}]",
        );
        assert_eq!(text, "[][0] [0][][]");
    }

    #[test]
    fn test_lenient_method_on_unmatched_regex() {
        let temp = TempDir::new().unwrap();
        let renderer =
            recipe(&temp, "{% set m = load_file_regex('x.py', 'v(.+)') %}[{{ m.group(1) }}]");
        std::fs::create_dir_all(&renderer.config().work_dir).unwrap();
        std::fs::write(renderer.config().work_dir.join("x.py"), "nothing here\n").unwrap();

        let output = pass(&renderer, UndefinedPolicy::Lenient).unwrap();
        assert_eq!(output.text, "[]");
        assert_eq!(output.unresolved, vec!["group".to_string()]);
        assert!(pass(&renderer, UndefinedPolicy::Strict).is_err());
    }

    #[test]
    fn test_missing_variant_keys_checked_first() {
        let temp = TempDir::new().unwrap();
        let renderer = recipe(&temp, "- {{ compiler('c') }}\n");

        let error = pass(&renderer, UndefinedPolicy::Strict).unwrap_err();
        let expected = vec!["c_compiler".to_string(), "target_platform".to_string()];
        assert!(matches!(
            error,
            RenderError::MissingVariantKeys { ref keys, .. } if keys == &expected
        ));

        let variant = Variant::new().with("c_compiler", "gcc").with("target_platform", "linux-64");
        let request = RenderRequest::new("meta.yaml").with_variant(variant);
        let outcome = renderer.render(&request).unwrap();
        assert_eq!(outcome.text, "- gcc_linux-64\n");
        assert!(outcome.used_variant_keys.contains("c_compiler"));
    }

    #[test]
    fn test_typed_errors_pass_through() {
        let temp = TempDir::new().unwrap();
        let renderer = recipe(&temp, "{{ runtime('c') }}\n");
        let variant = Variant::new().with("c_compiler", "icc");
        let request = RenderRequest::new("meta.yaml").with_variant(variant);
        let error = renderer.render(&request).unwrap_err();
        assert!(matches!(error, RenderError::RuntimeLookup { ref compiler } if compiler == "icc"));
    }

    #[test]
    fn test_includes_are_selector_filtered() {
        let temp = TempDir::new().unwrap();
        let loader = MemoryLoader::new()
            .with("meta.yaml", "top\n{% include 'extra.yaml' %}")
            .with("extra.yaml", "only-win  # [win]\nonly-linux  # [linux]\n");
        let outcome = renderer(&temp, loader).render(&RenderRequest::new("meta.yaml")).unwrap();
        assert_eq!(outcome.text, "top\n\nonly-linux\n");
    }

    #[test]
    fn test_syntax_error() {
        let temp = TempDir::new().unwrap();
        let renderer = renderer(&temp, MemoryLoader::new().with("meta.yaml", "a\n{% if %}\n"));
        let error = renderer.render(&RenderRequest::new("meta.yaml")).unwrap_err();
        assert!(matches!(
            error,
            RenderError::Template(ref e) if matches!(**e, TemplateError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_invalid_selector_fails_both_passes() {
        let temp = TempDir::new().unwrap();
        let renderer = renderer(&temp, MemoryLoader::new().with("meta.yaml", "x  # [lnux]\n"));
        for policy in [UndefinedPolicy::Lenient, UndefinedPolicy::Strict] {
            let error = renderer.render_pass(&RenderRequest::new("meta.yaml"), policy).unwrap_err();
            assert!(matches!(error, RenderError::InvalidSelector { line: 1, .. }));
        }
    }

    #[test]
    fn test_suggestions_and_context_lines() {
        let suggestions = RecipeRenderer::find_similar_variables(
            "PY_VR",
            &["PY_VER".to_string(), "NPY_VER".to_string(), "SUBDIR".to_string()],
        );
        assert_eq!(suggestions, vec!["PY_VER".to_string(), "NPY_VER".to_string()]);

        let lines = RecipeRenderer::extract_context_lines("a\nb\nc\nd\n", 2, 1);
        assert_eq!(lines, vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())]);
        assert!(RecipeRenderer::extract_context_lines("a\n", 5, 1).is_empty());
    }

    #[test]
    fn test_deterministic_output() {
        let temp = TempDir::new().unwrap();
        let renderer =
            recipe(&temp, "{% for k in ['b', 'a'] | sort %}{{ k }}{% endfor %} {{ SUBDIR }}\n");
        let first = renderer.render(&RenderRequest::new("meta.yaml")).unwrap();
        let second = renderer.render(&RenderRequest::new("meta.yaml")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.text, "ab linux-64\n");
    }
}
