//! # Compiler Diagnostics
//!
//! Accumulating diagnostics sink shared by every compile phase.
//! Phases report errors here and continue past recoverable ones, so a single
//! run can surface multiple issues. Phase boundaries consult [`Diagnostics::has_errors`]
//! and abort the pipeline with a `CompilationFailed` error carrying the summary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of a token or node in the original source text (1-based line/column).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInfo {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceInfo {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        SourceInfo {
            file: file.into(),
            line,
            column,
        }
    }

    /// Placeholder for synthesized items that have no source position.
    pub fn internal() -> Self {
        SourceInfo {
            file: "<internal>".to_string(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A single reported issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub source: SourceInfo,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.source, self.severity, self.message)
    }
}

/// Accumulating sink for compile-phase diagnostics
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn error(&mut self, message: impl Into<String>, source: SourceInfo) {
        self.push(Severity::Error, message.into(), source);
    }

    pub fn warning(&mut self, message: impl Into<String>, source: SourceInfo) {
        self.push(Severity::Warning, message.into(), source);
    }

    pub fn info(&mut self, message: impl Into<String>, source: SourceInfo) {
        self.push(Severity::Info, message.into(), source);
    }

    fn push(&mut self, severity: Severity, message: String, source: SourceInfo) {
        self.entries.push(Diagnostic {
            severity,
            message,
            source,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }

    /// One-line-per-diagnostic summary, errors first.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(ToString::to_string)
            .collect();
        lines.extend(
            self.entries
                .iter()
                .filter(|d| d.severity != Severity::Error)
                .map(ToString::to_string),
        );
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_errors_only_counts_errors() {
        let mut diags = Diagnostics::new();
        diags.warning("shadowed alias", SourceInfo::new("a.s", 1, 1));
        diags.info("unused label", SourceInfo::new("a.s", 2, 1));
        assert!(!diags.has_errors());

        diags.error("unknown opcode", SourceInfo::new("a.s", 3, 5));
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_summary_lists_errors_first() {
        let mut diags = Diagnostics::new();
        diags.warning("w", SourceInfo::new("a.s", 1, 1));
        diags.error("e", SourceInfo::new("a.s", 2, 1));
        let summary = diags.summary();
        let first = summary.lines().next().expect("summary is non-empty");
        assert!(first.contains("error"));
    }
}
