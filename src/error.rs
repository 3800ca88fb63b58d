//! Error types for template compilation

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Errors raised while compiling template text into a node tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Malformed tag or directive (unterminated tag, `for` without `in`, ...)
    #[error("syntax error at {span:?}: {message}")]
    Syntax { span: Span, message: String },

    /// Directives that do not nest properly
    #[error("structure error at {span:?}: {message}")]
    Structure { span: Span, message: String },
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            span,
            message: message.into(),
        }
    }

    pub fn structure(message: impl Into<String>, span: Span) -> Self {
        Self::Structure {
            span,
            message: message.into(),
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            ParseError::Syntax { span, .. } | ParseError::Structure { span, .. } => span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Syntax { message, .. } | ParseError::Structure { message, .. } => message,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let (title, color) = match self {
            ParseError::Syntax { .. } => ("syntax error", Color::Red),
            ParseError::Structure { .. } => ("structure error", Color::Yellow),
        };
        let span = self.span().clone();

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(title)
            .with_label(
                Label::new((filename, span))
                    .with_message(self.message())
                    .with_color(color),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => format!("{filename}: {self}"),
        }
    }
}
