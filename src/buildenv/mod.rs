//! Read-only view of the build environment prefix.
//!
//! - [`InstalledPackages`] - package records found in `<prefix>/conda-meta`
//! - [`pin_compatible`] - compatibility constraints derived from installed versions

mod installed;
mod pin;

pub use installed::{InstalledPackages, PackageRecord};
pub use pin::pin_compatible;
