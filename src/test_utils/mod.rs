//! Test utilities for recipe-render
//!
//! Helpers for writing tests: a temporary recipe environment with a build root, and
//! one-time tracing setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use recipe_render::test_utils::RecipeEnvironment;
//!
//! # fn example() -> anyhow::Result<()> {
//! let env = RecipeEnvironment::with_recipe("package:\n  name: demo\n")?;
//! env.install_package("numpy", "1.21.2", "py39h_0")?;
//! let config = env.config("linux-64")?;
//! # Ok(())
//! # }
//! ```

pub mod environment;

pub use environment::RecipeEnvironment;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` if given, else `RUST_LOG`; with
/// neither, tests run without a subscriber.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true) // targets like "setup_py"
            .with_thread_ids(false)
            .try_init();
    });
}
