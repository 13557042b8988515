//! # Lexer
//!
//! Turns source text into a flat token stream ending in `Eof`. Comments start
//! with `#` and run to end of line. Opcode recognition consults the global
//! instruction-set registry; everything else that looks like a name becomes an
//! identifier and is classified later.

use crate::compiler::diagnostics::{Diagnostics, SourceInfo};
use crate::compiler::token::{Token, TokenKind};
use crate::runtime::isa;
use regex::Regex;
use std::sync::OnceLock;

/// Register tokens are `%` + class prefix + non-negative index.
fn register_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i)(DR|PR|FPR|LR)([0-9]+)$").expect("register pattern is valid")
    })
}

/// Tokenize `source` as the contents of `file`.
///
/// Always produces a stream terminated by a single `Eof` token; lexical
/// problems are reported to `diags` and the offending characters skipped.
pub fn tokenize(source: &str, file: &str, diags: &mut Diagnostics) -> Vec<Token> {
    Lexer::new(source, file).run(diags)
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    file: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, file: &'a str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            file,
        }
    }

    fn run(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let source = self.here();
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\n' => {
                    self.bump();
                    tokens.push(Token::new(TokenKind::Newline, "\n", source));
                    self.line += 1;
                    self.column = 1;
                }
                ':' => {
                    self.bump();
                    tokens.push(Token::new(TokenKind::Colon, ":", source));
                }
                ',' => {
                    self.bump();
                    tokens.push(Token::new(TokenKind::Comma, ",", source));
                }
                '|' => {
                    self.bump();
                    tokens.push(Token::new(TokenKind::VectorSep, "|", source));
                }
                '*' => {
                    self.bump();
                    tokens.push(Token::new(TokenKind::Identifier, "*", source));
                }
                '"' => {
                    self.bump();
                    tokens.push(self.lex_string(source, diags));
                }
                '.' => {
                    if self.peek_at(1) == Some('.') {
                        self.bump();
                        self.bump();
                        tokens.push(Token::new(TokenKind::DotDot, "..", source));
                    } else if self.peek_at(1).is_some_and(is_ident_start) {
                        self.bump();
                        let name = self.lex_ident_text();
                        tokens.push(Token::new(
                            TokenKind::Directive,
                            format!(".{name}"),
                            source,
                        ));
                    } else {
                        diags.error("illegal character '.'", source);
                        self.bump();
                    }
                }
                '%' => {
                    self.bump();
                    let name = self.lex_ident_text();
                    if register_pattern().is_match(&name) {
                        tokens.push(Token::new(TokenKind::Register, format!("%{name}"), source));
                    } else {
                        diags.error(format!("malformed register '%{name}'"), source);
                    }
                }
                '-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    tokens.push(self.lex_number(source, diags));
                }
                c if c.is_ascii_digit() => {
                    tokens.push(self.lex_number(source, diags));
                }
                c if is_ident_start(c) => {
                    let name = self.lex_ident_text();
                    let kind = if isa::registry().is_opcode(&name.to_uppercase()) {
                        TokenKind::Opcode
                    } else {
                        TokenKind::Identifier
                    };
                    tokens.push(Token::new(kind, name, source));
                }
                other => {
                    diags.error(format!("illegal character '{other}'"), source);
                    self.bump();
                }
            }
        }
        tokens.push(Token::new(TokenKind::Eof, "", self.here()));
        tokens
    }

    fn lex_string(&mut self, source: SourceInfo, diags: &mut Diagnostics) -> Token {
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\n') | None => {
                    diags.error("unterminated string literal", source.clone());
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        Token::new(TokenKind::StringLit, text, source)
    }

    fn lex_number(&mut self, source: SourceInfo, diags: &mut Diagnostics) -> Token {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }
        let hex = self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X'));
        if hex {
            text.push_str("0x");
            self.bump();
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        } else {
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        let parsed = if hex {
            let digits = text.trim_start_matches('-').trim_start_matches("0x");
            i64::from_str_radix(digits, 16)
                .map(|v| if text.starts_with('-') { -v } else { v })
        } else {
            text.parse::<i64>()
        };
        match parsed {
            Ok(value) => Token::number(text, value, source),
            Err(_) => {
                diags.error(format!("malformed number '{text}'"), source.clone());
                Token::number(text, 0, source)
            }
        }
    }

    /// Identifier text: letters, digits, underscores, and interior dots
    /// (for qualified names such as `LIB.INC`).
    fn lex_ident_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else if c == '.' && self.peek_at(1).is_some_and(is_ident_start) {
                text.push('.');
                self.bump();
            } else {
                break;
            }
        }
        text
    }

    fn here(&self) -> SourceInfo {
        SourceInfo::new(self.file, self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
        self.column += 1;
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = tokenize(source, "test.s", &mut diags);
        (tokens, diags)
    }

    #[test]
    fn test_single_instruction() {
        let (tokens, diags) = lex("SETI %DR0 DATA:42");
        assert!(!diags.has_errors());
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Opcode,
                TokenKind::Register,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[4].value, Some(42));
    }

    #[test]
    fn test_opcode_recognition_is_case_insensitive() {
        let (tokens, _) = lex("seti %dr0 5");
        assert_eq!(tokens[0].kind, TokenKind::Opcode);
        assert_eq!(tokens[0].text, "seti");
        assert_eq!(tokens[0].upper(), "SETI");
    }

    #[test]
    fn test_vector_literal_and_comment() {
        let (tokens, diags) = lex("1|-2|3 # trailing comment\n");
        assert!(!diags.has_errors());
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Number,
                TokenKind::VectorSep,
                TokenKind::Number,
                TokenKind::VectorSep,
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[2].value, Some(-2));
    }

    #[test]
    fn test_hex_number() {
        let (tokens, _) = lex("0x1F");
        assert_eq!(tokens[0].value, Some(31));
    }

    #[test]
    fn test_directive_and_string() {
        let (tokens, diags) = lex(".INCLUDE \"lib/util.s\"");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].directive_name(), "INCLUDE");
        assert_eq!(tokens[1].kind, TokenKind::StringLit);
        assert_eq!(tokens[1].text, "lib/util.s");
    }

    #[test]
    fn test_unterminated_string_reports_error() {
        let (_, diags) = lex("\"oops");
        assert!(diags.has_errors());
        assert!(diags.summary().contains("unterminated string"));
    }

    #[test]
    fn test_malformed_register_reports_error() {
        let (_, diags) = lex("%XY3");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_range_tokens() {
        let (tokens, diags) = lex("0..10");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[1].kind, TokenKind::DotDot);
        assert_eq!(tokens[2].kind, TokenKind::Number);
    }

    #[test]
    fn test_qualified_identifier_keeps_dot() {
        let (tokens, _) = lex("CALL LIB.INC");
        assert_eq!(tokens[0].kind, TokenKind::Opcode);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].text, "LIB.INC");
    }

    #[test]
    fn test_source_positions_are_one_based() {
        let (tokens, _) = lex("NOP\nNOP");
        assert_eq!(tokens[0].source.line, 1);
        assert_eq!(tokens[0].source.column, 1);
        assert_eq!(tokens[2].source.line, 2);
        assert_eq!(tokens[2].source.column, 1);
    }
}
