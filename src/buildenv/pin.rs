//! Compatibility pins for packages already in the build environment.

use std::collections::BTreeMap;

use super::InstalledPackages;
use crate::core::{RenderError, UndefinedPolicy};

/// Constraint compatible with the installed version of `package`.
///
/// An entry for `package` in `table` is returned as-is. Otherwise the installed version is
/// assumed to follow semantic versioning and bug-fix releases are allowed:
/// `1.4.2` → `>=1.4.2,1.4.*`.
///
/// Under the lenient policy a package that is not installed, or whose version has no
/// numeric major and minor component, yields `None`.
///
/// # Errors
///
/// Under the strict policy, [`RenderError::CompatibilityLookup`] if the package is not
/// installed and [`RenderError::VersionParse`] if its version cannot be split.
///
/// # Examples
///
/// ```rust
/// use recipe_render::buildenv::{pin_compatible, InstalledPackages, PackageRecord};
/// use recipe_render::core::UndefinedPolicy;
///
/// let installed: InstalledPackages = [PackageRecord {
///     name: "numpy".into(),
///     version: "1.4.2".into(),
///     build: String::new(),
///     build_number: 0,
/// }]
/// .into_iter()
/// .collect();
/// let pin = pin_compatible(&installed, "numpy", None, UndefinedPolicy::Strict).unwrap();
/// assert_eq!(pin.as_deref(), Some(">=1.4.2,1.4.*"));
/// ```
pub fn pin_compatible(
    installed: &InstalledPackages,
    package: &str,
    table: Option<&BTreeMap<String, String>>,
    policy: UndefinedPolicy,
) -> Result<Option<String>, RenderError> {
    let Some(record) = installed.get(package) else {
        if policy.permits_undefined() {
            tracing::debug!(
                "'{package}' is not installed; no compatibility pin during exploratory pass"
            );
            return Ok(None);
        }
        return Err(RenderError::CompatibilityLookup {
            package: package.to_string(),
            reason: "package is not installed in the build prefix".to_string(),
        });
    };

    if let Some(entry) = table.and_then(|t| t.get(package)) {
        return Ok(Some(entry.clone()));
    }

    tracing::info!(
        "Package {package} does not have a compatibility entry; assuming semantic versioning \
         and allowing bug-fix revisions"
    );
    match major_minor(&record.version) {
        Some((major, minor)) => Ok(Some(format!(">={},{major}.{minor}.*", record.version))),
        None if policy.permits_undefined() => {
            tracing::debug!("Cannot derive a pin for {package} {}", record.version);
            Ok(None)
        }
        None => Err(RenderError::VersionParse {
            package: package.to_string(),
            version: record.version.clone(),
        }),
    }
}

fn major_minor(version: &str) -> Option<(&str, &str)> {
    let mut parts = version.split('.');
    let major = parts.next()?;
    let minor = parts.next()?;
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    (numeric(major) && numeric(minor)).then_some((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildenv::PackageRecord;

    fn installed(name: &str, version: &str) -> InstalledPackages {
        [PackageRecord {
            name: name.to_string(),
            version: version.to_string(),
            build: "0".to_string(),
            build_number: 0,
        }]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_derived_pin() {
        let installed = installed("numpy", "1.4.2");
        let pin = pin_compatible(&installed, "numpy", None, UndefinedPolicy::Strict).unwrap();
        assert_eq!(pin.as_deref(), Some(">=1.4.2,1.4.*"));
    }

    #[test]
    fn test_table_entry_wins() {
        let table: BTreeMap<String, String> =
            [("numpy".to_string(), ">=1.11,<2".to_string())].into_iter().collect();
        let installed = installed("numpy", "1.11.3");
        let pin =
            pin_compatible(&installed, "numpy", Some(&table), UndefinedPolicy::Strict).unwrap();
        assert_eq!(pin.as_deref(), Some(">=1.11,<2"));
    }

    #[test]
    fn test_not_installed() {
        let empty = InstalledPackages::default();
        assert_eq!(pin_compatible(&empty, "numpy", None, UndefinedPolicy::Lenient).unwrap(), None);
        assert!(matches!(
            pin_compatible(&empty, "numpy", None, UndefinedPolicy::Strict),
            Err(RenderError::CompatibilityLookup { ref package, .. }) if package == "numpy"
        ));
    }

    #[test]
    fn test_unversionable() {
        let pkgs = installed("openssl", "1");
        assert_eq!(pin_compatible(&pkgs, "openssl", None, UndefinedPolicy::Lenient).unwrap(), None);
        assert!(matches!(
            pin_compatible(&pkgs, "openssl", None, UndefinedPolicy::Strict),
            Err(RenderError::VersionParse { ref version, .. }) if version == "1"
        ));

        let pkgs = installed("openssl", "1.0.2k");
        assert_eq!(
            pin_compatible(&pkgs, "openssl", None, UndefinedPolicy::Strict).unwrap().as_deref(),
            Some(">=1.0.2k,1.0.*")
        );
    }
}
