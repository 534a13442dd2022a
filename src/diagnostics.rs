//! Diagnostic accumulation shared across every compiler phase.
//!
//! Every phase (lexer, parser, semantic analyzer, lowering, codegen) is
//! handed a `&mut DiagnosticSink` and pushes into it instead of aborting.
//! The driver decides, between phases, whether to continue (see
//! [`DiagnosticSink::has_errors`]).

use std::fmt;
use std::path::PathBuf;

/// A half-open byte range in the source, plus the line/column of its start.
///
/// Lines and columns are 1-indexed for human-facing display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        debug_assert!(start <= end, "Span: start ({start}) must be <= end ({end})");
        Span { start, end, line, column }
    }

    /// A zero-length span at a given position, used for diagnostics that
    /// point at "end of input" or synthetic locations.
    pub fn point(pos: u32, line: u32, column: u32) -> Self {
        Span::new(pos, pos, line, column)
    }

    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line,
            column: self.column,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// The closed set of diagnostic kinds fixed by the language spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    LexError,
    ParseError,
    Redeclaration,
    UnknownName,
    TypeMismatch,
    ArityMismatch,
    NotAssignable,
    ReturnOutsideProcedure,
    ReturnTypeMismatch,
    AssetNotFound,
    Ice,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::LexError => "lex-error",
            DiagnosticKind::ParseError => "parse-error",
            DiagnosticKind::Redeclaration => "redeclaration",
            DiagnosticKind::UnknownName => "unknown-name",
            DiagnosticKind::TypeMismatch => "type-mismatch",
            DiagnosticKind::ArityMismatch => "arity-mismatch",
            DiagnosticKind::NotAssignable => "not-assignable",
            DiagnosticKind::ReturnOutsideProcedure => "return-outside-procedure",
            DiagnosticKind::ReturnTypeMismatch => "return-type-mismatch",
            DiagnosticKind::AssetNotFound => "asset-not-found",
            DiagnosticKind::Ice => "ice",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub primary: Span,
    pub secondary: Option<Span>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, primary: Span, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Error, kind, primary, secondary: None, message: message.into() }
    }

    pub fn warning(kind: DiagnosticKind, primary: Span, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, kind, primary, secondary: None, message: message.into() }
    }

    pub fn ice(primary: Span, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Error, kind: DiagnosticKind::Ice, primary, secondary: None, message: message.into() }
    }

    pub fn with_secondary(mut self, secondary: Span) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Render as `path:line:col: severity[kind]: message`, the shape used
    /// by the CLI to print to stderr.
    pub fn render(&self, path: &PathBuf) -> String {
        format!(
            "{}:{}: {}[{}]: {}",
            path.display(),
            self.primary,
            self.severity,
            self.kind.as_str(),
            self.message
        )
    }
}

/// Append-only, single-writer diagnostic accumulator threaded through the
/// whole pipeline. Never read until the driver decides to flush it between
/// phases or at the end of compilation.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_errors_is_false_for_warnings_only() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::warning(
            DiagnosticKind::TypeMismatch,
            Span::point(0, 1, 1),
            "unused variable",
        ));
        assert!(!sink.has_errors());
        assert!(sink.has_warnings());
    }

    #[test]
    fn has_errors_is_true_once_an_error_is_pushed() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::error(
            DiagnosticKind::UnknownName,
            Span::point(0, 1, 1),
            "undefined name `foo`",
        ));
        assert!(sink.has_errors());
    }

    #[test]
    fn span_merge_takes_the_widest_bounds() {
        let a = Span::new(5, 10, 1, 6);
        let b = Span::new(2, 7, 1, 3);
        let m = a.merge(&b);
        assert_eq!(m.start, 2);
        assert_eq!(m.end, 10);
    }
}
