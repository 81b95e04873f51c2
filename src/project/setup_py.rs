//! Keywords a project's `setup.py` passes to `setup()`.
//!
//! The script is executed by a Python interpreter with `setuptools.setup`,
//! `distutils.core.setup` and (when importable) `numpy.distutils.core.setup` replaced by a
//! function that records its keyword arguments. The recorded keywords are printed as JSON
//! after a marker line and parsed back here.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::locate;
use crate::config::Config;
use crate::core::{RenderError, UndefinedPolicy};

/// Keyword arguments passed to `setup()`.
pub type SetupData = serde_json::Map<String, serde_json::Value>;

const CAPTURE_SCRIPT: &str = include_str!("setup_py_capture.py");
const CAPTURE_MARKER: &str = "__RECIPE_RENDER_SETUP_DATA__";

/// Run `setup_file` and return what it passed to `setup()`.
///
/// Returns `Some(empty map)` when the source is not available yet under the lenient policy,
/// and `None` when the script does not exist (lenient) or never called `setup()` with any
/// keywords.
///
/// # Errors
///
/// - [`RenderError::SourceNotFound`] under the strict policy when the source directory or
///   the script is missing
/// - [`RenderError::InterpreterNotFound`] when no Python is available
/// - [`RenderError::SetupScriptFailed`] when the script exits unsuccessfully
pub fn load_setup_py_data(
    config: &Config,
    recipe_dir: Option<&Path>,
    setup_file: &str,
    from_recipe_dir: bool,
    policy: UndefinedPolicy,
) -> Result<Option<SetupData>, RenderError> {
    let Some(located) = locate(setup_file, from_recipe_dir, recipe_dir, config) else {
        let reason =
            "Did not find setup.py file in manually specified location, \
             and source not downloaded yet"
                .to_string();
        if policy.permits_undefined() {
            tracing::debug!("{reason}");
            return Ok(Some(SetupData::new()));
        }
        return Err(RenderError::SourceNotFound {
            path: config.work_dir.join(setup_file),
            reason,
        });
    };

    if !located.path.is_file() {
        if policy.permits_undefined() {
            tracing::debug!("{} does not exist yet", located.path.display());
            return Ok(None);
        }
        return Err(RenderError::SourceNotFound {
            path: located.path,
            reason: "not a file that can be read".to_string(),
        });
    }

    let python = find_interpreter(config, &located.path)?;
    let mut cmd = Command::new(&python);
    cmd.arg("-c")
        .arg(CAPTURE_SCRIPT)
        .arg(&located.path)
        .current_dir(&located.base)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if located.in_work_dir {
        // modules next to setup.py (versioneer.py and friends) must shadow installed ones
        cmd.env("PYTHONPATH", prepend_path(&located.base));
    }

    tracing::debug!(
        target: "setup_py",
        "Executing {} with {}",
        located.path.display(),
        python.display()
    );
    let output = cmd
        .output()
        .map_err(|e| RenderError::io("executing setup script", &located.path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::debug!(
            target: "setup_py",
            "Script failed with exit code: {:?}",
            output.status.code()
        );
        return Err(RenderError::SetupScriptFailed {
            path: located.path,
            status: output.status.to_string(),
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let data = parse_captured(&stdout, &located.path)?;
    tracing::debug!(target: "setup_py", "Captured {} setup() keywords", data.len());
    Ok((!data.is_empty()).then_some(data))
}

/// Python interpreter used to execute `setup.py`.
///
/// Uses the configured `python_exe`, then the build prefix interpreter, then `python3` or
/// `python` on `PATH`.
///
/// # Errors
///
/// [`RenderError::InterpreterNotFound`] if none of them exist.
pub fn find_interpreter(config: &Config, script: &Path) -> Result<PathBuf, RenderError> {
    if let Some(exe) = &config.python_exe {
        if exe.is_file() {
            return Ok(exe.clone());
        }
        tracing::warn!("Configured python_exe {} does not exist", exe.display());
    }

    let prefixed = config.python_in(&config.build_prefix);
    if prefixed.is_file() {
        return Ok(prefixed);
    }

    which::which("python3")
        .or_else(|_| which::which("python"))
        .map_err(|_| RenderError::InterpreterNotFound {
            path: script.to_path_buf(),
        })
}

fn prepend_path(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PYTHONPATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_os_string())
}

fn parse_captured(stdout: &str, script: &Path) -> Result<SetupData, RenderError> {
    let mut lines = stdout.lines().skip_while(|line| line.trim_end() != CAPTURE_MARKER);
    if lines.next().is_none() {
        return Err(RenderError::SetupScriptFailed {
            path: script.to_path_buf(),
            status: "exit status: 0".to_string(),
            stderr: "script exited before setup() returned".to_string(),
        });
    }
    let payload = lines.next().unwrap_or("{}");
    serde_json::from_str(payload).map_err(|e| RenderError::manifest_parse(script, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use tempfile::TempDir;

    fn load(
        config: &Config,
        temp: &TempDir,
        from_recipe_dir: bool,
        policy: UndefinedPolicy,
    ) -> Result<Option<SetupData>, RenderError> {
        load_setup_py_data(config, Some(temp.path()), "setup.py", from_recipe_dir, policy)
    }

    #[test]
    fn test_parse_captured() {
        let stdout = "running setup\n\n__RECIPE_RENDER_SETUP_DATA__\n\
                      {\"name\": \"pkg\", \"version\": \"1.0\"}\n";
        let data = parse_captured(stdout, Path::new("setup.py")).unwrap();
        assert_eq!(data["version"], "1.0");

        assert!(matches!(
            parse_captured("sys.exit(0)\n", Path::new("setup.py")),
            Err(RenderError::SetupScriptFailed { .. })
        ));
    }

    #[test]
    fn test_lenient_without_source_is_empty_map() {
        let temp = TempDir::new().unwrap();
        let config = Config::new(Platform::Linux, "64", temp.path().join("croot"));

        let data = load(&config, &temp, false, UndefinedPolicy::Lenient).unwrap();
        assert_eq!(data, Some(SetupData::new()));

        let error = load(&config, &temp, false, UndefinedPolicy::Strict).unwrap_err();
        assert!(matches!(error, RenderError::SourceNotFound { .. }));
    }

    #[test]
    fn test_missing_script() {
        let temp = TempDir::new().unwrap();
        let config = Config::new(Platform::Linux, "64", temp.path().join("croot"));
        std::fs::create_dir_all(&config.work_dir).unwrap();

        let data = load(&config, &temp, false, UndefinedPolicy::Lenient).unwrap();
        assert_eq!(data, None);
        assert!(matches!(
            load(&config, &temp, false, UndefinedPolicy::Strict),
            Err(RenderError::SourceNotFound { ref path, .. }) if path.ends_with("work/setup.py")
        ));
    }

    #[test]
    fn test_configured_interpreter_must_exist() {
        let temp = TempDir::new().unwrap();
        let config = Config::new(Platform::Linux, "64", temp.path())
            .with_python_exe(temp.path().join("no-python"))
            .with_build_prefix(temp.path().join("prefix"));
        // falls through to PATH lookup; only the error shape is checked when nothing is found
        match find_interpreter(&config, Path::new("setup.py")) {
            Ok(path) => assert_ne!(path, temp.path().join("no-python")),
            Err(error) => assert!(matches!(error, RenderError::InterpreterNotFound { .. })),
        }
    }

    #[test]
    fn test_runs_setup_py_from_recipe_dir() {
        if which::which("python3").is_err() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("setup.py"),
            "from setuptools import setup\n\
             setup(name='demo', version='0.3.1', install_requires=['six'])\n",
        )
        .unwrap();
        let config = Config::new(Platform::Linux, "64", temp.path().join("croot"));

        let data = load(&config, &temp, true, UndefinedPolicy::Strict).unwrap().unwrap();
        assert_eq!(data["name"], "demo");
        assert_eq!(data["version"], "0.3.1");
        assert_eq!(data["install_requires"][0], "six");
    }

    #[test]
    fn test_failing_setup_py() {
        if which::which("python3").is_err() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("setup.py"), "raise SystemExit(3)\n").unwrap();
        let config = Config::new(Platform::Linux, "64", temp.path().join("croot"));

        let error = load(&config, &temp, true, UndefinedPolicy::Lenient).unwrap_err();
        assert!(matches!(error, RenderError::SetupScriptFailed { .. }));
    }
}
