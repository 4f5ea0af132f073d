//! Error types for loading templates

use std::path::PathBuf;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Position reported by the YAML layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// Byte offset into the source
    pub index: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

impl SourceLocation {
    pub fn span(&self) -> Span {
        self.index..self.index + 1
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    /// Malformed document, including duplicate mapping keys
    #[error("{}", format_syntax(.message, .location))]
    Syntax {
        message: String,
        location: Option<SourceLocation>,
    },

    /// A top-level section or one of its entries has the wrong shape
    #[error("invalid {section}: {message}")]
    InvalidSection { section: String, message: String },

    /// An intrinsic function with malformed arguments
    #[error("invalid {function}: {message}")]
    InvalidIntrinsic { function: String, message: String },

    #[error("cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_syntax(message: &str, location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(
            "syntax error at line {} column {}: {}",
            loc.line, loc.column, message
        ),
        None => format!("syntax error: {}", message),
    }
}

impl ParseError {
    pub fn section(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSection {
            section: section.into(),
            message: message.into(),
        }
    }

    pub fn intrinsic(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidIntrinsic {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Source span if the error carries a location
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Syntax {
                location: Some(loc),
                ..
            } => Some(loc.span()),
            _ => None,
        }
    }

    /// Format the error with source context using ariadne
    ///
    /// Errors without a location fall back to their plain message.
    pub fn format(&self, source: &str, filename: &str) -> String {
        let (span, message) = match (self, self.span()) {
            (ParseError::Syntax { message, .. }, Some(span)) => (span, message),
            _ => return self.to_string(),
        };
        // The YAML layer may point one past the end on truncated input
        let end = source.len();
        let span = span.start.min(end)..span.end.min(end.max(1));

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(message)
            .with_label(
                Label::new((filename, span))
                    .with_message(message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ParseError {
    fn from(err: serde_yaml::Error) -> Self {
        let location = err.location().map(|loc| SourceLocation {
            index: loc.index(),
            line: loc.line(),
            column: loc.column(),
        });
        ParseError::Syntax {
            message: err.to_string(),
            location,
        }
    }
}
