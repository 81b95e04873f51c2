//! Core types shared by every rendering component.
//!
//! - [`RenderError`] - the error taxonomy for all fatal rendering conditions
//! - [`ErrorContext`] / [`user_friendly_error`] - CLI-facing error presentation
//! - [`UndefinedPolicy`] - the lenient/strict switch threaded through a render pass

pub mod error;

pub use error::{ErrorContext, RenderError, user_friendly_error};

use serde::{Deserialize, Serialize};
use std::fmt;

/// How unresolved template references are treated during one render pass.
///
/// The exploratory pass runs [`UndefinedPolicy::Lenient`]: unknown names become
/// placeholders and missing auxiliary files degrade to empty results. The final pass runs
/// [`UndefinedPolicy::Strict`] and fails on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndefinedPolicy {
    /// Tolerate unresolved names (exploratory pass)
    Lenient,
    /// Fail on unresolved names (final pass)
    Strict,
}

impl UndefinedPolicy {
    /// Whether undefined values are permitted under this policy.
    #[must_use]
    pub const fn permits_undefined(self) -> bool {
        matches!(self, Self::Lenient)
    }
}

impl fmt::Display for UndefinedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lenient => f.write_str("lenient"),
            Self::Strict => f.write_str("strict"),
        }
    }
}
