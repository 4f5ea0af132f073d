//! Error types for parameter binding and evaluation

use thiserror::Error;

/// Errors that can occur while binding parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    /// No supplied value and no default
    #[error("missing value for parameter '{name}'")]
    Missing { name: String },

    /// Value outside the declared AllowedValues
    #[error("value '{value}' is not allowed for parameter '{name}' (allowed: {})", allowed.join(", "))]
    NotAllowed {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Value of the wrong shape for the declared type
    #[error("parameter '{name}' expects {expected}, found {found}")]
    InvalidType {
        name: String,
        expected: String,
        found: String,
    },

    /// Pattern, length or range constraint failed
    #[error("parameter '{name}': {message}")]
    ConstraintViolated { name: String, message: String },

    /// AllowedPattern that does not compile
    #[error("parameter '{name}' has an invalid AllowedPattern '{pattern}': {message}")]
    InvalidPattern {
        name: String,
        pattern: String,
        message: String,
    },
}

impl ParameterError {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::Missing { name: name.into() }
    }

    /// Name of the offending parameter
    pub fn name(&self) -> &str {
        match self {
            Self::Missing { name }
            | Self::NotAllowed { name, .. }
            | Self::InvalidType { name, .. }
            | Self::ConstraintViolated { name, .. }
            | Self::InvalidPattern { name, .. } => name,
        }
    }
}

/// Errors that can occur while evaluating expressions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// `Ref` or Sub placeholder naming nothing in the environment
    #[error("undefined reference '{name}'")]
    Undefined { name: String },

    /// Reference to a logical name that is not declared
    #[error("unknown resource '{name}'{}", format_suggestions(suggestions))]
    UnknownResource {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("unknown condition '{name}'{}", format_suggestions(suggestions))]
    UnknownCondition {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("{function}: expected {expected}, found {found}")]
    TypeMismatch {
        function: String,
        expected: String,
        found: String,
    },

    #[error("Fn::Select: index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Fn::FindInMap: no entry [{top_key}][{second_key}] in mapping '{map}'")]
    MapLookupFailed {
        map: String,
        top_key: String,
        second_key: String,
    },

    #[error("circular condition reference: {}", cycle.join(" -> "))]
    CyclicCondition { cycle: Vec<String> },

    /// Output depends on a resource excluded by its condition
    #[error("output '{output}' references excluded resource '{resource}'")]
    UnresolvedOutput { output: String, resource: String },

    #[error("no export named '{name}' to import")]
    UnknownImport { name: String },

    #[error("intrinsic function {function} is not supported")]
    Unsupported { function: String },
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean {}?)", suggestions.join(", "))
    }
}

impl EvalError {
    pub fn undefined(name: impl Into<String>) -> Self {
        Self::Undefined { name: name.into() }
    }

    pub fn unknown_resource(name: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::UnknownResource {
            name: name.into(),
            suggestions,
        }
    }

    pub fn unknown_condition(name: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::UnknownCondition {
            name: name.into(),
            suggestions,
        }
    }

    pub fn type_mismatch(
        function: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            function: function.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn cyclic(cycle: Vec<String>) -> Self {
        Self::CyclicCondition { cycle }
    }

    /// Get suggestions if available
    pub fn suggestions(&self) -> Option<&[String]> {
        match self {
            Self::UnknownResource { suggestions, .. }
            | Self::UnknownCondition { suggestions, .. } => Some(suggestions),
            _ => None,
        }
    }
}
