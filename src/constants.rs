//! Global constants used throughout the crate.
//!
//! Default language versions, the names of the files the renderer looks for, and the
//! environment variables it reads. Defining them centrally keeps the CLI, the config
//! layer and the context builder in agreement.

/// Default Python version when neither the config file nor the CLI sets one.
pub const DEFAULT_PYTHON: &str = "3.6";

/// Default NumPy version.
pub const DEFAULT_NUMPY: &str = "1.11";

/// Default Perl version.
pub const DEFAULT_PERL: &str = "5.22.2.1";

/// Default Lua version.
pub const DEFAULT_LUA: &str = "5.2";

/// Default R version.
pub const DEFAULT_R: &str = "3.3.2";

/// Recipe file rendered when a directory is given.
pub const RECIPE_FILE: &str = "meta.yaml";

/// Build-description script read by `load_setup_py_data`.
pub const SETUP_PY: &str = "setup.py";

/// Package manifest read by `load_npm`.
pub const PACKAGE_JSON: &str = "package.json";

/// Directory under a prefix that holds one JSON record per installed package.
pub const CONDA_META_DIR: &str = "conda-meta";

/// Environment variable overriding the global config file location.
pub const CONFIG_PATH_ENV: &str = "RECIPE_RENDER_CONFIG";

/// Environment variable toggling the `nomkl` selector fact.
pub const FEATURE_NOMKL_ENV: &str = "FEATURE_NOMKL";

/// Default macOS deployment target exported to builds.
pub const MACOSX_DEPLOYMENT_TARGET: &str = "10.9";
