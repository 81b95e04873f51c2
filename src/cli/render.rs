//! Render a recipe for every variant combination it uses.
//!
//! The recipe's raw text is scanned for the variant keys it can observe, the variant
//! matrix is pruned to those dimensions, and each remaining combination is rendered in
//! two passes on tokio's blocking pool.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::CliConfig;
use crate::compilers::with_native_defaults;
use crate::config::{Config, GlobalConfig, LanguageVersions, Platform, native_arch};
use crate::constants::RECIPE_FILE;
use crate::core::{RenderError, UndefinedPolicy};
use crate::environ::RecipeMetadata;
use crate::templating::{FileSystemLoader, RecipeRenderer, RenderRequest, SourceLoader};
use crate::variants::{Variant, VariantMatrix, used_variant_keys_in};

/// Render a recipe directory or recipe file.
#[derive(Debug, Args)]
pub struct RenderCommand {
    /// Recipe directory containing meta.yaml, or a path to a recipe file
    recipe_path: PathBuf,

    /// Python version to render for (repeat for several)
    #[arg(long = "python", value_name = "VERSION")]
    python: Vec<String>,

    /// NumPy version to render for
    #[arg(long, value_name = "VERSION")]
    numpy: Option<String>,

    /// Perl version to render for
    #[arg(long, value_name = "VERSION")]
    perl: Option<String>,

    /// Lua version to render for
    #[arg(long, value_name = "VERSION")]
    lua: Option<String>,

    /// R version to render for
    #[arg(long = "R", value_name = "VERSION")]
    r_base: Option<String>,

    /// Variant configuration file (repeat for several; later files win)
    #[arg(short = 'm', long = "variant-config-files", value_name = "FILE")]
    variant_config_files: Vec<PathBuf>,

    /// Target platform (linux, osx, win)
    #[arg(long)]
    platform: Option<String>,

    /// Target architecture (64, 32, aarch64, ppc64le, ...)
    #[arg(long)]
    arch: Option<String>,

    /// Write the rendered recipe to FILE instead of stdout
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the variant keys the recipe uses and exit
    #[arg(long)]
    used_variants: bool,

    /// Run only the exploratory pass and print its output
    #[arg(long)]
    exploratory: bool,
}

impl RenderCommand {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if the global config or a variant file cannot be loaded, the
    /// recipe cannot be found, either render pass fails for any variant, or the output
    /// file cannot be written.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config_path = cli.config_path.as_ref().map(PathBuf::from);
        let global = GlobalConfig::load_with_optional(config_path).await?;
        let mut config = Config::from_global(&global, self.target_subdir()?.as_deref())?;
        self.apply_versions(&mut config.versions);

        let (recipe_dir, template) = resolve_recipe(&self.recipe_path).await?;
        let loader = Arc::new(FileSystemLoader::new(&recipe_dir));
        let raw = loader.get_source(&template)?;

        let matrix = self.load_matrix(&global).await?;
        let used = used_variant_keys_in(&raw.text, &matrix.keys());
        debug!("Recipe uses variant keys: {:?}", used);

        if self.used_variants {
            for key in &used {
                println!("{key}");
            }
            return Ok(());
        }

        let variants = matrix.combinations(&used);
        info!(
            "Rendering {} for {} variant(s)",
            recipe_dir.join(&template).display(),
            variants.len()
        );

        let mut rendered = Vec::with_capacity(variants.len());
        for variant in variants {
            let versions = versions_for(&variant, &config.versions);
            let variant_config = Arc::new(config.clone().with_versions(versions));
            let variant = with_native_defaults(variant, &variant_config);
            let label = variant.label();

            let renderer =
                RecipeRenderer::new(variant_config, Arc::clone(&loader) as Arc<dyn SourceLoader>);
            let request = RenderRequest::new(template.clone())
                .with_recipe_dir(recipe_dir.clone())
                .with_metadata(RecipeMetadata::new(recipe_dir.join(&template)))
                .with_variant(variant);

            let exploratory_only = self.exploratory;
            let text = tokio::task::spawn_blocking(move || {
                if exploratory_only {
                    let pass = renderer.render_pass(&request, UndefinedPolicy::Lenient)?;
                    if !pass.unresolved.is_empty() {
                        info!("Unresolved during exploratory pass: {}", pass.unresolved.join(", "));
                    }
                    Ok(pass.text)
                } else {
                    renderer.render(&request).map(|outcome| outcome.text)
                }
            })
            .await
            .context("Render task failed")?
            .with_context(|| format!("Failed to render variant {label}"))?;

            rendered.push((label, text));
        }

        let output = join_renders(rendered);
        match &self.output {
            Some(path) => {
                tokio::fs::write(path, &output)
                    .await
                    .with_context(|| {
                        format!("Failed to write rendered recipe to {}", path.display())
                    })?;
                println!("{} Wrote {}", "✓".green(), path.display());
            }
            None => print!("{output}"),
        }
        Ok(())
    }

    /// The subdir named by `--platform`/`--arch`, or `None` for the native one.
    fn target_subdir(&self) -> Result<Option<String>, RenderError> {
        let subdir = match (&self.platform, &self.arch) {
            (None, None) => return Ok(None),
            (Some(platform), arch) => {
                let platform: Platform = platform.parse()?;
                format!("{platform}-{}", arch.as_deref().unwrap_or(native_arch()))
            }
            (None, Some(arch)) => format!("{}-{arch}", Platform::native()),
        };
        Ok(Some(subdir))
    }

    /// Override configured language versions with the command-line ones.
    fn apply_versions(&self, versions: &mut LanguageVersions) {
        if let Some(python) = self.python.first() {
            versions.python = Some(python.clone());
        }
        let overrides = [
            (&mut versions.numpy, &self.numpy),
            (&mut versions.perl, &self.perl),
            (&mut versions.lua, &self.lua),
            (&mut versions.r_base, &self.r_base),
        ];
        for (slot, value) in overrides {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }
    }

    /// Merge global variant files, `-m` files, then the command-line versions.
    async fn load_matrix(&self, global: &GlobalConfig) -> Result<VariantMatrix> {
        let files: Vec<PathBuf> = global
            .variant_config_paths()
            .into_iter()
            .chain(self.variant_config_files.iter().cloned())
            .collect();

        let matrix = tokio::task::spawn_blocking(move || -> Result<VariantMatrix, RenderError> {
            let mut matrix = VariantMatrix::new();
            for file in &files {
                debug!("Loading variant config {}", file.display());
                matrix.merge(VariantMatrix::load_file(file)?);
            }
            Ok(matrix)
        })
        .await
        .context("Variant loading task failed")??;

        Ok(self.apply_cli_dimensions(matrix))
    }

    fn apply_cli_dimensions(&self, mut matrix: VariantMatrix) -> VariantMatrix {
        let string = |v: &String| serde_json::Value::String(v.clone());
        if !self.python.is_empty() {
            matrix.set("python", self.python.iter().map(string).collect());
        }
        let singles = [
            ("numpy", &self.numpy),
            ("perl", &self.perl),
            ("lua", &self.lua),
            ("r_base", &self.r_base),
        ];
        for (key, value) in singles {
            if let Some(value) = value {
                matrix.set(key, vec![string(value)]);
            }
        }
        matrix
    }
}

/// Split a recipe path into its directory and the template name inside it.
async fn resolve_recipe(path: &Path) -> Result<(PathBuf, String), RenderError> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| RenderError::io("resolve recipe path", path, e))?;

    if canonical.is_dir() {
        if !canonical.join(RECIPE_FILE).is_file() {
            return Err(RenderError::TemplateNotFound {
                name: canonical.join(RECIPE_FILE).display().to_string(),
            });
        }
        return Ok((canonical, RECIPE_FILE.to_string()));
    }

    let dir = canonical.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let name = canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| RenderError::TemplateNotFound {
            name: path.display().to_string(),
        })?;
    Ok((dir, name))
}

/// Language versions for selectors and build variables, preferring the variant's own.
fn versions_for(variant: &Variant, base: &LanguageVersions) -> LanguageVersions {
    let pick =
        |key: &str, fallback: &Option<String>| variant.get_str(key).or_else(|| fallback.clone());
    LanguageVersions {
        python: pick("python", &base.python),
        numpy: pick("numpy", &base.numpy),
        perl: pick("perl", &base.perl),
        lua: pick("lua", &base.lua),
        r_base: pick("r_base", &base.r_base),
    }
}

/// Concatenate renders, labelling each when there is more than one.
fn join_renders(rendered: Vec<(String, String)>) -> String {
    if rendered.len() == 1 {
        return rendered.into_iter().map(|(_, text)| text).collect();
    }
    let mut output = String::new();
    for (label, text) in rendered {
        output.push_str(&format!("# variant: {label}\n"));
        output.push_str(&text);
        if !text.ends_with('\n') {
            output.push('\n');
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn command(args: &[&str]) -> RenderCommand {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            cmd: RenderCommand,
        }
        let mut argv = vec!["render"];
        argv.extend_from_slice(args);
        Wrapper::try_parse_from(argv).unwrap().cmd
    }

    #[test]
    fn test_target_subdir() {
        assert_eq!(command(&["r"]).target_subdir().unwrap(), None);
        assert_eq!(
            command(&["r", "--platform", "win", "--arch", "32"]).target_subdir().unwrap(),
            Some("win-32".to_string())
        );
        assert_eq!(
            command(&["r", "--platform", "linux"]).target_subdir().unwrap(),
            Some(format!("linux-{}", native_arch()))
        );
        assert!(command(&["r", "--platform", "beos"]).target_subdir().is_err());
    }

    #[test]
    fn test_cli_versions_override_config() {
        let cmd = command(&["r", "--python", "3.9", "--python", "3.10", "--R", "4.1"]);
        let mut versions = LanguageVersions::default();
        cmd.apply_versions(&mut versions);
        assert_eq!(versions.python.as_deref(), Some("3.9"));
        assert_eq!(versions.r_base.as_deref(), Some("4.1"));

        let matrix = cmd.apply_cli_dimensions(VariantMatrix::new());
        assert_eq!(matrix.get("python").map(<[_]>::len), Some(2));
        assert!(matrix.get("numpy").is_none());
    }

    #[test]
    fn test_variant_versions_win() {
        let variant = Variant::new().with("python", "2.7");
        let versions = versions_for(&variant, &LanguageVersions::default());
        assert_eq!(versions.python.as_deref(), Some("2.7"));
        assert_eq!(versions.numpy, LanguageVersions::default().numpy);
    }

    #[tokio::test]
    async fn test_resolve_recipe_dir_and_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(RECIPE_FILE), "package: {}\n").unwrap();
        std::fs::write(temp.path().join("other.yaml"), "x\n").unwrap();

        let (dir, name) = resolve_recipe(temp.path()).await.unwrap();
        assert_eq!(name, RECIPE_FILE);
        assert_eq!(dir, temp.path().canonicalize().unwrap());

        let (_, name) = resolve_recipe(&temp.path().join("other.yaml")).await.unwrap();
        assert_eq!(name, "other.yaml");

        let empty = TempDir::new().unwrap();
        assert!(matches!(
            resolve_recipe(empty.path()).await,
            Err(RenderError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_join_renders_labels_multiple() {
        assert_eq!(join_renders(vec![("a=1".into(), "x\n".into())]), "x\n");
        assert_eq!(
            join_renders(vec![("a=1".into(), "x".into()), ("a=2".into(), "y\n".into())]),
            "# variant: a=1\nx\n# variant: a=2\ny\n"
        );
    }
}
