//! # Source Tokens
//!
//! Token types produced by the lexer. Tokens keep their original text
//! (case-preserving) next to an optional numeric value and their source
//! position; symbol comparisons happen on the upper-cased text.

use crate::compiler::diagnostics::SourceInfo;
use serde::{Deserialize, Serialize};

/// Lexical token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// `.NAME` assembler directive
    Directive,
    /// Known instruction mnemonic (case-insensitive)
    Opcode,
    /// Bare name: label, constant, alias, keyword such as `REF`/`VAL`
    Identifier,
    /// `%DR0`, `%PR1`, `%FPR2`, `%LR3`
    Register,
    /// Signed decimal or `0x` hexadecimal integer
    Number,
    /// Double-quoted string literal
    StringLit,
    /// `|` between vector components
    VectorSep,
    /// `..` inside a placement range
    DotDot,
    Colon,
    Comma,
    Newline,
    Eof,
}

/// A single lexed token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Original text as written, including sigils (`.`, `%`, quotes stripped for strings)
    pub text: String,
    /// Scalar value for `Number` tokens
    pub value: Option<i64>,
    pub source: SourceInfo,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, source: SourceInfo) -> Self {
        Token {
            kind,
            text: text.into(),
            value: None,
            source,
        }
    }

    pub fn number(text: impl Into<String>, value: i64, source: SourceInfo) -> Self {
        Token {
            kind: TokenKind::Number,
            text: text.into(),
            value: Some(value),
            source,
        }
    }

    /// Upper-cased text, used for all case-insensitive comparisons.
    pub fn upper(&self) -> String {
        self.text.to_uppercase()
    }

    /// Directive name without the leading dot, upper-cased.
    pub fn directive_name(&self) -> String {
        self.text.trim_start_matches('.').to_uppercase()
    }

    /// True for identifiers whose upper-cased text equals `keyword`.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Identifier && self.upper() == keyword
    }
}
