//! Structured template errors.
//!
//! Engine failures are converted into [`TemplateError`] by the renderer, carrying the
//! template name, line, surrounding source lines and, for undefined values, the names the
//! pass could not resolve along with "did you mean" suggestions.

use std::path::PathBuf;

use crate::core::UndefinedPolicy;

/// Template errors with location context.
#[derive(Debug, Clone)]
pub enum TemplateError {
    /// A referenced name or attribute does not exist.
    UndefinedVariable {
        variable: String,
        unresolved: Vec<String>,
        suggestions: Vec<String>,
        location: Box<ErrorLocation>,
    },

    /// The template does not parse.
    SyntaxError {
        message: String,
        location: Box<ErrorLocation>,
    },

    /// Evaluation failed for another reason (bad filter argument, type mismatch, ...).
    RenderFailed {
        kind: String,
        message: String,
        location: Box<ErrorLocation>,
    },
}

/// Where a template error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    /// Template name as given to the loader
    pub template_name: String,
    /// File the template came from, if known
    pub file_path: Option<PathBuf>,
    /// 1-based line number reported by the engine
    pub line_number: Option<usize>,
    /// Lines around the error, with their line numbers
    pub context_lines: Option<Vec<(usize, String)>>,
    /// Policy of the failing pass
    pub policy: UndefinedPolicy,
}

impl TemplateError {
    #[must_use]
    pub fn location(&self) -> &ErrorLocation {
        match self {
            Self::UndefinedVariable { location, .. }
            | Self::SyntaxError { location, .. }
            | Self::RenderFailed { location, .. } => location,
        }
    }

    /// Names the failing pass could not resolve, if any.
    #[must_use]
    pub fn unresolved(&self) -> &[String] {
        match self {
            Self::UndefinedVariable { unresolved, .. } => unresolved.as_slice(),
            _ => &[],
        }
    }

    /// Generate user-friendly error message with context and suggestions
    #[must_use]
    pub fn format_with_context(&self) -> String {
        match self {
            Self::UndefinedVariable {
                variable,
                unresolved,
                suggestions,
                location,
            } => format_undefined_variable_error(variable, unresolved, suggestions, location),
            Self::SyntaxError { message, location } => format_syntax_error(message, location),
            Self::RenderFailed {
                kind,
                message,
                location,
            } => format_render_error(kind, message, location),
        }
    }
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let location = self.location();
        let at = match location.line_number {
            Some(line) => format!("{}:{line}", location.template_name),
            None => location.template_name.clone(),
        };
        match self {
            Self::UndefinedVariable { variable, .. } => {
                write!(f, "Template variable not found: '{variable}' ({at})")
            }
            Self::SyntaxError { message, .. } => {
                write!(f, "Template syntax error in {at}: {message}")
            }
            Self::RenderFailed { message, .. } => {
                write!(f, "Template rendering failed in {at}: {message}")
            }
        }
    }
}

impl std::error::Error for TemplateError {}

fn push_location(msg: &mut String, location: &ErrorLocation) {
    msg.push_str(&format!("Recipe: {} ({} pass)\n", location.template_name, location.policy));
    if let Some(path) = &location.file_path {
        msg.push_str(&format!("File: {}\n", path.display()));
    }
    if let Some(line) = location.line_number {
        msg.push_str(&format!("Line: {line}\n"));
    }
    if let Some(lines) = &location.context_lines {
        msg.push('\n');
        for (number, text) in lines {
            let marker = if Some(*number) == location.line_number {
                ">"
            } else {
                " "
            };
            msg.push_str(&format!("{marker} {number:>4} | {text}\n"));
        }
    }
    msg.push('\n');
}

fn format_undefined_variable_error(
    variable: &str,
    unresolved: &[String],
    suggestions: &[String],
    location: &ErrorLocation,
) -> String {
    let mut msg = String::new();

    msg.push_str("ERROR: Template Variable Not Found\n\n");
    msg.push_str(&format!("Variable: {variable}\n"));
    push_location(&mut msg, location);

    if !suggestions.is_empty() {
        msg.push_str("Did you mean one of these?\n");
        for suggestion in suggestions {
            msg.push_str(&format!("  - {suggestion}\n"));
        }
        msg.push('\n');
    }

    let others: Vec<&String> = unresolved.iter().filter(|n| n.as_str() != variable).collect();
    if !others.is_empty() {
        msg.push_str("Other unresolved names in this pass:\n");
        for name in others.iter().take(10) {
            msg.push_str(&format!("  {name}\n"));
        }
        if others.len() > 10 {
            msg.push_str(&format!("  ... and {} more\n", others.len() - 10));
        }
        msg.push('\n');
    }

    msg.push_str(
        "SUGGESTION: Names that only exist after the source is downloaded must be defined \
         before the final render (variant config, build environment or work directory).\n",
    );

    msg
}

fn format_syntax_error(message: &str, location: &ErrorLocation) -> String {
    let mut msg = String::new();

    msg.push_str("ERROR: Template Syntax Error\n\n");
    msg.push_str(&format!("Error: {message}\n"));
    push_location(&mut msg, location);

    msg.push_str("SUGGESTION: Check template syntax for unclosed tags or invalid expressions.\n");
    msg.push_str("Common issues:\n");
    msg.push_str("  - Unclosed {{ }} or {% %} delimiters\n");
    msg.push_str("  - Invalid filter names\n");
    msg.push_str("  - Missing quotes around string values\n");

    msg
}

fn format_render_error(kind: &str, message: &str, location: &ErrorLocation) -> String {
    let mut msg = String::new();

    msg.push_str("ERROR: Template Rendering Failed\n\n");
    msg.push_str(&format!("Kind: {kind}\n"));
    msg.push_str(&format!("Error: {message}\n"));
    push_location(&mut msg, location);

    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> ErrorLocation {
        ErrorLocation {
            template_name: "meta.yaml".to_string(),
            file_path: None,
            line_number: Some(2),
            context_lines: Some(vec![(1, "a".to_string()), (2, "{{ vesion }}".to_string())]),
            policy: UndefinedPolicy::Strict,
        }
    }

    #[test]
    fn test_display_names_template_and_line() {
        let error = TemplateError::UndefinedVariable {
            variable: "vesion".to_string(),
            unresolved: vec!["vesion".to_string()],
            suggestions: vec!["version".to_string()],
            location: Box::new(location()),
        };
        assert_eq!(error.to_string(), "Template variable not found: 'vesion' (meta.yaml:2)");
        assert_eq!(error.unresolved(), ["vesion".to_string()]);
    }

    #[test]
    fn test_format_with_context_marks_line() {
        let error = TemplateError::UndefinedVariable {
            variable: "vesion".to_string(),
            unresolved: vec!["vesion".to_string(), "other".to_string()],
            suggestions: vec!["version".to_string()],
            location: Box::new(location()),
        };
        let text = error.format_with_context();
        assert!(text.contains(">    2 | {{ vesion }}"));
        assert!(text.contains("  - version"));
        assert!(text.contains("  other"));
        assert!(text.contains("strict pass"));
    }
}
