//! `package.json` of Node projects.

use std::path::Path;

use crate::constants::PACKAGE_JSON;
use crate::core::RenderError;

/// Parse `package.json` in the current working directory.
///
/// # Errors
///
/// See [`load_npm_from`].
pub fn load_npm() -> Result<serde_json::Value, RenderError> {
    let cwd = std::env::current_dir().map_err(|e| RenderError::io("resolving", ".", e))?;
    load_npm_from(&cwd)
}

/// Parse `package.json` in `dir`.
///
/// # Errors
///
/// [`RenderError::SourceNotFound`] if the file does not exist, [`RenderError::Io`] if it
/// cannot be read and [`RenderError::ManifestParse`] if it is not valid JSON.
pub fn load_npm_from(dir: &Path) -> Result<serde_json::Value, RenderError> {
    let path = dir.join(PACKAGE_JSON);
    let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RenderError::SourceNotFound {
            path: path.clone(),
            reason: "load_npm() reads package.json from the current directory".to_string(),
        },
        _ => RenderError::io("reading", &path, e),
    })?;
    serde_json::from_str(&text).map_err(|e| RenderError::manifest_parse(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_load_npm_from() {
        let temp = TempDir::new().unwrap();
        let manifest = r#"{"name": "left-pad", "version": "1.3.0"}"#;
        std::fs::write(temp.path().join("package.json"), manifest).unwrap();
        let manifest = load_npm_from(temp.path()).unwrap();
        assert_eq!(manifest["version"], "1.3.0");
    }

    #[test]
    fn test_invalid_and_missing() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(load_npm_from(temp.path()), Err(RenderError::SourceNotFound { .. })));

        std::fs::write(temp.path().join("package.json"), "{ nope").unwrap();
        assert!(matches!(load_npm_from(temp.path()), Err(RenderError::ManifestParse { .. })));
    }

    #[test]
    #[serial]
    fn test_load_npm_uses_cwd() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), r#"{"name": "cwd-pkg"}"#).unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp.path()).unwrap();
        let result = load_npm();
        std::env::set_current_dir(previous).unwrap();
        assert_eq!(result.unwrap()["name"], "cwd-pkg");
    }
}
