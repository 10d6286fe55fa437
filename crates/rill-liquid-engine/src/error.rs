// SPDX-License-Identifier: Apache-2.0 OR MIT
use thiserror::Error;

/// Unified error type for the template engine.
///
/// Errors carry the message, the 1-based line number when the failure
/// originates from a concrete region of the template, and – for wrapped
/// failures – the original cause. Prefer the constructor helpers over
/// building variants by hand so line provenance stays consistent.
#[derive(Debug, Error)]
pub enum Error {
    #[error("liquid syntax error: {message} (line {line})")]
    Syntax {
        message: String,
        line: usize,
        template: Option<String>,
    },
    #[error("liquid type error: {message}")]
    Type { message: String, line: Option<usize> },
    #[error("undefined variable: {message}")]
    Undefined { message: String, line: Option<usize> },
    #[error("tag '{name}' is not allowed in this context (line {line})")]
    DisabledTag { name: String, line: usize },
    #[error("template not found: {name}")]
    TemplateNotFound { name: String },
    #[error("unknown filter '{name}'")]
    UnknownFilter { name: String, line: Option<usize> },
    #[error("filter argument error: {message}")]
    FilterArgument { message: String },
    #[error("filter value error: {message}")]
    FilterValue { message: String },
    #[error("context depth limit reached: {message}")]
    ContextDepth { message: String },
    #[error("loop iteration limit reached: {message}")]
    LoopIterationLimit { message: String },
    #[error("output stream limit reached: {message}")]
    OutputStreamLimit { message: String },
    #[error("liquid error: {message}")]
    Other {
        message: String,
        line: Option<usize>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Error::Syntax {
            message: message.into(),
            line,
            template: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type {
            message: message.into(),
            line: None,
        }
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        Error::Undefined {
            message: message.into(),
            line: None,
        }
    }

    pub fn disabled_tag(name: impl Into<String>, line: usize) -> Self {
        Error::DisabledTag {
            name: name.into(),
            line,
        }
    }

    pub fn template_not_found(name: impl Into<String>) -> Self {
        Error::TemplateNotFound { name: name.into() }
    }

    pub fn unknown_filter(name: impl Into<String>) -> Self {
        Error::UnknownFilter {
            name: name.into(),
            line: None,
        }
    }

    pub fn filter_argument(message: impl Into<String>) -> Self {
        Error::FilterArgument {
            message: message.into(),
        }
    }

    pub fn filter_value(message: impl Into<String>) -> Self {
        Error::FilterValue {
            message: message.into(),
        }
    }

    pub fn context_depth(message: impl Into<String>) -> Self {
        Error::ContextDepth {
            message: message.into(),
        }
    }

    pub fn loop_limit(message: impl Into<String>) -> Self {
        Error::LoopIterationLimit {
            message: message.into(),
        }
    }

    pub fn output_limit(message: impl Into<String>) -> Self {
        Error::OutputStreamLimit {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Error::Other {
            message: message.into(),
            line: None,
            source: None,
        }
    }

    pub fn wrap(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Error::Other {
            message: message.into(),
            line: None,
            source: Some(source),
        }
    }

    /// The 1-based template line this error points at, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Syntax { line, .. } | Error::DisabledTag { line, .. } => Some(*line),
            Error::Type { line, .. }
            | Error::Undefined { line, .. }
            | Error::UnknownFilter { line, .. }
            | Error::Other { line, .. } => *line,
            _ => None,
        }
    }

    /// Attaches a line number to errors raised without one. Errors that
    /// already carry a line are left untouched.
    #[must_use]
    pub fn with_line(mut self, at: usize) -> Self {
        match &mut self {
            Error::Type { line, .. }
            | Error::Undefined { line, .. }
            | Error::UnknownFilter { line, .. }
            | Error::Other { line, .. } => {
                if line.is_none() {
                    *line = Some(at);
                }
            }
            _ => {}
        }
        self
    }

    /// Attaches the template name to syntax errors raised while parsing it.
    #[must_use]
    pub fn with_template(mut self, name: &str) -> Self {
        if let Error::Syntax { template, .. } = &mut self {
            if template.is_none() {
                *template = Some(name.to_string());
            }
        }
        self
    }

    /// Whether warn and lax mode may absorb this error and keep rendering.
    ///
    /// Syntax errors, disabled tags and the resource-limit errors always
    /// abort the render regardless of mode.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Type { .. }
                | Error::Undefined { .. }
                | Error::TemplateNotFound { .. }
                | Error::UnknownFilter { .. }
                | Error::FilterArgument { .. }
                | Error::FilterValue { .. }
                | Error::Other { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_line_fills_missing_line_only() {
        let err = Error::type_error("bad operand").with_line(3);
        assert_eq!(err.line(), Some(3));

        let err = err.with_line(9);
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn syntax_errors_are_fatal() {
        assert!(!Error::syntax("unexpected token", 1).is_recoverable());
        assert!(!Error::loop_limit("too many iterations").is_recoverable());
        assert!(Error::filter_value("not a number").is_recoverable());
    }

    #[test]
    fn display_includes_line_for_syntax_errors() {
        let err = Error::syntax("unexpected '}'", 4);
        assert!(err.to_string().contains("line 4"));
    }
}
