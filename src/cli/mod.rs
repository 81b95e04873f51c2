//! Command-line interface for recipe-render.
//!
//! The binary has a single command today, `render`, which renders a recipe for each
//! variant combination the recipe can observe.
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Only report errors
//! - `--config` - Path to a custom global config file
//!
//! `RUST_LOG` overrides the log level chosen by `--verbose` and `--quiet`.
//!
//! # Example
//!
//! ```bash
//! # Render a recipe for the native platform
//! recipe-render render recipes/zlib
//!
//! # Render for two Python versions on Windows
//! recipe-render render recipes/numpy --python 3.8 --python 3.9 --platform win
//!
//! # Show which variant keys a recipe uses
//! recipe-render render recipes/numpy -m variants.yaml --used-variants
//! ```

mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Runtime settings derived from the global command-line flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level for the tracing subscriber (`debug`, `info`, `error`)
    pub log_level: String,

    /// Path to a global config file given with `--config`
    pub config_path: Option<String>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process-wide tracing subscriber.
    ///
    /// `RUST_LOG` wins over the configured level when set. Calling this twice is harmless.
    pub fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(&self.log_level)
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

#[derive(Parser)]
#[command(
    name = "recipe-render",
    about = "Render templated package build recipes",
    version,
    author,
    long_about = "recipe-render evaluates line selectors and Jinja templating in build recipes, \
                  once leniently to discover what a recipe uses and once strictly to produce \
                  the final text."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to a custom global config file
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a recipe for every variant combination it uses
    Render(render::RenderCommand),
}

impl Cli {
    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Returns the error of the executed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        };

        CliConfig {
            log_level: log_level.to_string(),
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration instead of the global flags.
    ///
    /// # Errors
    ///
    /// Returns the error of the executed command.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Render(cmd) => cmd.execute(&config).await,
        }
    }
}
