//! Template source loading with selector pre-filtering.
//!
//! [`SourceLoader`] is the seam between the renderer and wherever recipe text lives.
//! [`FileSystemLoader`] reads from a recipe directory, [`MemoryLoader`] from a map.
//! [`RecipeLoader`] wraps any of them and applies line selectors to every source it hands
//! out, so the template engine only ever sees selector-filtered text, for the main recipe
//! and for everything it includes.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::Config;
use crate::core::RenderError;
use crate::selectors::{SelectorNamespace, select_lines};

/// Template text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub text: String,
    /// File the text was read from, if any
    pub origin: Option<PathBuf>,
    /// Modification time of `origin` when it was read
    pub modified: Option<SystemTime>,
}

impl TemplateSource {
    /// Source that did not come from a file.
    pub fn in_memory(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: None,
            modified: None,
        }
    }

    /// Whether the origin file is unchanged since it was read.
    ///
    /// In-memory sources are always up to date.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        match (&self.origin, self.modified) {
            (Some(path), Some(modified)) => std::fs::metadata(path)
                .and_then(|m| m.modified())
                .is_ok_and(|current| current == modified),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Where recipe templates are read from.
pub trait SourceLoader: Send + Sync {
    /// Fetch a template by name.
    ///
    /// # Errors
    ///
    /// [`RenderError::TemplateNotFound`] if no template has this name.
    fn get_source(&self, name: &str) -> Result<TemplateSource, RenderError>;

    /// Names of all templates this loader can serve, sorted.
    fn list_templates(&self) -> Vec<String>;
}

/// Loads templates from files below a root directory.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` below the root, refusing anything that would leave it.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        let mut depth: i32 = 0;
        for component in path.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return None;
                    }
                }
                Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(self.root.join(path))
    }
}

impl SourceLoader for FileSystemLoader {
    fn get_source(&self, name: &str) -> Result<TemplateSource, RenderError> {
        let not_found = || RenderError::TemplateNotFound {
            name: name.to_string(),
        };
        let path = self.resolve(name).ok_or_else(not_found)?;
        if !path.is_file() {
            return Err(not_found());
        }

        let text = std::fs::read_to_string(&path)
            .map_err(|e| RenderError::io("reading template", &path, e))?;
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        tracing::debug!("Loaded template '{name}' from {}", path.display());

        Ok(TemplateSource {
            text,
            origin: Some(path),
            modified,
        })
    }

    fn list_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = walkdir::WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?;
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some(parts.join("/"))
            })
            .collect();
        names.sort();
        names
    }
}

/// Loads templates from an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: BTreeMap<String, String>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn get_source(&self, name: &str) -> Result<TemplateSource, RenderError> {
        self.templates
            .get(name)
            .map(TemplateSource::in_memory)
            .ok_or_else(|| RenderError::TemplateNotFound {
                name: name.to_string(),
            })
    }

    fn list_templates(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

/// Pass-through loader that applies line selectors to every source.
pub struct RecipeLoader {
    inner: Arc<dyn SourceLoader>,
    namespace: SelectorNamespace,
}

impl RecipeLoader {
    /// Wrap `inner`, filtering with the selector facts of `config`.
    pub fn new(inner: Arc<dyn SourceLoader>, config: &Config) -> Self {
        Self::with_namespace(inner, SelectorNamespace::from_config(config))
    }

    pub fn with_namespace(inner: Arc<dyn SourceLoader>, namespace: SelectorNamespace) -> Self {
        Self { inner, namespace }
    }

    /// Fetch `name` from the wrapped loader and apply selectors. Origin and
    /// modification time are passed through unchanged.
    ///
    /// # Errors
    ///
    /// Errors of the wrapped loader, or [`RenderError::InvalidSelector`].
    pub fn get_source(&self, name: &str) -> Result<TemplateSource, RenderError> {
        let source = self.inner.get_source(name)?;
        let text = select_lines(&source.text, &self.namespace)?;
        Ok(TemplateSource { text, ..source })
    }

    /// Unfiltered source, as the wrapped loader returns it.
    ///
    /// # Errors
    ///
    /// Errors of the wrapped loader.
    pub fn get_raw_source(&self, name: &str) -> Result<TemplateSource, RenderError> {
        self.inner.get_source(name)
    }

    #[must_use]
    pub fn list_templates(&self) -> Vec<String> {
        self.inner.list_templates()
    }

    /// Callback for the engine's loader hook.
    ///
    /// Unknown names yield `Ok(None)` so the engine reports a missing template itself;
    /// any other failure is raised with the typed error attached.
    pub fn engine_loader(
        self: Arc<Self>,
    ) -> impl Fn(&str) -> Result<Option<String>, minijinja::Error> + Send + Sync + 'static {
        move |name: &str| match self.get_source(name) {
            Ok(source) => Ok(Some(source.text)),
            Err(RenderError::TemplateNotFound { .. }) => Ok(None),
            Err(error) => Err(error.into_engine_error()),
        }
    }
}

impl std::fmt::Debug for RecipeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeLoader")
            .field("templates", &self.inner.list_templates())
            .finish_non_exhaustive()
    }
}
