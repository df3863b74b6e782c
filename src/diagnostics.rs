use std::{collections::TryReserveError, fmt};

use thiserror::Error;

/// Represents a byte span within a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 1-based line/column position of a token or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Syntax,
    TypeMismatch,
    UndefinedVariable,
    DivisionByZero,
    InvalidArgument,
    OutOfMemory,
    StackOverflow,
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::Syntax => "SyntaxError",
            DiagnosticKind::TypeMismatch => "TypeMismatch",
            DiagnosticKind::UndefinedVariable => "UndefinedVariable",
            DiagnosticKind::DivisionByZero => "DivisionByZero",
            DiagnosticKind::InvalidArgument => "InvalidArgument",
            DiagnosticKind::OutOfMemory => "OutOfMemory",
            DiagnosticKind::StackOverflow => "StackOverflow",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rich diagnostic information surfaced to hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub location: Option<Location>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            location: None,
            notes: Vec::new(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Syntax, message)
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::TypeMismatch, message)
    }

    pub fn undefined(name: &str) -> Self {
        Self::new(
            DiagnosticKind::UndefinedVariable,
            format!("undefined variable `{name}`"),
        )
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attaches a location only if none was recorded closer to the fault.
    pub fn or_at(mut self, location: Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location);
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = self.location {
            write!(f, " ({location})")?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

impl From<TryReserveError> for Diagnostic {
    fn from(err: TryReserveError) -> Self {
        Diagnostic::new(DiagnosticKind::OutOfMemory, err.to_string())
    }
}

/// Unified error type for the dmscript runtime and its hosts.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    pub fn kind(&self) -> Option<DiagnosticKind> {
        match self {
            ScriptError::Diagnostic(diag) => Some(diag.kind),
            ScriptError::Io(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            ScriptError::Diagnostic(diag) => Some(diag),
            ScriptError::Io(_) => None,
        }
    }
}

impl From<TryReserveError> for ScriptError {
    fn from(err: TryReserveError) -> Self {
        ScriptError::Diagnostic(Diagnostic::from(err))
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
