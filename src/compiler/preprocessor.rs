//! # Preprocessor
//!
//! Token-stream rewriting between the lexer and the parser. `.INCLUDE`
//! expands the included file in place, bracketed by synthetic
//! `.PUSH_CTX`/`.POP_CTX` directives so layout can restore its cursor when
//! leaving the region. `.REQUIRE` pulls whole files into the compilation as
//! separate units: their streams are appended after the requiring stream, and
//! the directive's path token is rewritten to the resolved, normalized path
//! the semantic phase keys its alias map on.
//!
//! File handles are only held inside [`SourceResolver::read`].

use crate::compiler::diagnostics::{Diagnostics, SourceInfo};
use crate::compiler::lexer;
use crate::compiler::token::{Token, TokenKind};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Source lookup errors; all are reported through the diagnostics sink.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Where source text comes from. The filesystem implementation is the normal
/// one; tests use the in-memory resolver.
pub trait SourceResolver {
    fn read(&self, path: &str) -> Result<String, SourceError>;
}

/// Reads from the filesystem.
#[derive(Debug, Default)]
pub struct FsResolver;

impl SourceResolver for FsResolver {
    fn read(&self, path: &str) -> Result<String, SourceError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(path.to_string()))
            }
            Err(e) => Err(SourceError::Io {
                path: path.to_string(),
                source: e,
            }),
        }
    }
}

/// Fixed set of in-memory files, keyed by normalized path.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    files: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        MemoryResolver::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.insert(normalize_path(&path.into()), text.into());
        self
    }
}

impl SourceResolver for MemoryResolver {
    fn read(&self, path: &str) -> Result<String, SourceError> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))
    }
}

/// Forward slashes, no `.` segments, `..` collapsed lexically.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let mut normalized = parts.join("/");
    if unified.starts_with('/') {
        normalized.insert(0, '/');
    }
    normalized
}

fn resolve_relative(current_file: &str, relative: &str) -> String {
    let dir = Path::new(current_file)
        .parent()
        .unwrap_or_else(|| Path::new(""));
    normalize_path(&dir.join(relative).to_string_lossy())
}

/// Result of preprocessing one entry file and everything it pulls in.
#[derive(Debug)]
pub struct PreprocessedProgram {
    /// Entry stream followed by each required unit's stream, `Eof`-terminated
    pub tokens: Vec<Token>,
    /// File path -> source lines, for the artifact
    pub sources: HashMap<String, Vec<String>>,
    /// Source file -> compilation unit (entry or required root) it belongs to
    pub unit_of_file: HashMap<String, String>,
}

/// Expand includes and collect required units starting from `entry_path`.
pub fn preprocess(
    entry_path: &str,
    resolver: &dyn SourceResolver,
    diags: &mut Diagnostics,
) -> PreprocessedProgram {
    let mut pre = Preprocessor {
        resolver,
        sources: HashMap::new(),
        unit_of_file: HashMap::new(),
        require_queue: VecDeque::new(),
        required_seen: HashSet::new(),
    };

    let entry = normalize_path(entry_path);
    pre.required_seen.insert(entry.clone());
    let mut tokens = pre.expand_unit(&entry, diags);

    while let Some(unit) = pre.require_queue.pop_front() {
        if !pre.required_seen.insert(unit.clone()) {
            continue;
        }
        let site = SourceInfo::new(unit.clone(), 1, 1);
        let mut unit_tokens = pre.expand_unit(&unit, diags);
        tokens.push(synthetic_directive(".PUSH_CTX", &site));
        tokens.append(&mut unit_tokens);
        tokens.push(synthetic_directive(".POP_CTX", &site));
    }

    tokens.push(Token::new(
        TokenKind::Eof,
        "",
        SourceInfo::new(entry, 1, 1),
    ));
    PreprocessedProgram {
        tokens,
        sources: pre.sources,
        unit_of_file: pre.unit_of_file,
    }
}

struct Preprocessor<'r> {
    resolver: &'r dyn SourceResolver,
    sources: HashMap<String, Vec<String>>,
    unit_of_file: HashMap<String, String>,
    require_queue: VecDeque<String>,
    required_seen: HashSet<String>,
}

impl Preprocessor<'_> {
    /// Lex and expand one compilation unit, without its trailing `Eof`.
    fn expand_unit(&mut self, unit_path: &str, diags: &mut Diagnostics) -> Vec<Token> {
        let mut include_stack = vec![unit_path.to_string()];
        self.expand_file(unit_path, unit_path, &mut include_stack, diags)
    }

    fn expand_file(
        &mut self,
        path: &str,
        unit: &str,
        include_stack: &mut Vec<String>,
        diags: &mut Diagnostics,
    ) -> Vec<Token> {
        let text = match self.resolver.read(path) {
            Ok(text) => text,
            Err(e) => {
                diags.error(e.to_string(), SourceInfo::new(path, 1, 1));
                return Vec::new();
            }
        };
        self.sources
            .insert(path.to_string(), text.lines().map(str::to_string).collect());
        self.unit_of_file
            .entry(path.to_string())
            .or_insert_with(|| unit.to_string());
        debug!(file = path, unit, "expanding source file");

        let mut raw = lexer::tokenize(&text, path, diags);
        // drop the per-file Eof; the program gets a single one at the end
        if raw.last().is_some_and(|t| t.kind == TokenKind::Eof) {
            raw.pop();
        }

        let mut out = Vec::with_capacity(raw.len());
        let mut iter = raw.into_iter().peekable();
        while let Some(token) = iter.next() {
            if token.kind == TokenKind::Directive {
                match token.directive_name().as_str() {
                    "INCLUDE" => {
                        let Some(path_token) = iter.next_if(|t| t.kind == TokenKind::StringLit)
                        else {
                            diags.error("expected a quoted path after .INCLUDE", token.source);
                            continue;
                        };
                        let resolved = resolve_relative(path, &path_token.text);
                        if include_stack.contains(&resolved) {
                            diags.error(
                                format!("include cycle through '{resolved}'"),
                                path_token.source,
                            );
                            continue;
                        }
                        include_stack.push(resolved.clone());
                        let included = self.expand_file(&resolved, unit, include_stack, diags);
                        include_stack.pop();

                        out.push(synthetic_directive(".PUSH_CTX", &token.source));
                        out.extend(included);
                        out.push(synthetic_directive(".POP_CTX", &token.source));
                        continue;
                    }
                    "REQUIRE" => {
                        // keep the directive for the semantic phase, but
                        // rewrite the path token to its resolved form
                        out.push(token.clone());
                        let Some(mut path_token) = iter.next_if(|t| t.kind == TokenKind::StringLit)
                        else {
                            diags.error("expected a quoted path after .REQUIRE", token.source);
                            continue;
                        };
                        let resolved = resolve_relative(path, &path_token.text);
                        path_token.text = resolved.clone();
                        out.push(path_token);
                        self.require_queue.push_back(resolved);
                        continue;
                    }
                    _ => {}
                }
            }
            out.push(token);
        }
        out
    }
}

fn synthetic_directive(name: &str, site: &SourceInfo) -> Token {
    Token::new(TokenKind::Directive, name, site.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_of(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Directive)
            .map(Token::directive_name)
            .collect()
    }

    #[test]
    fn test_include_is_bracketed_by_ctx_markers() {
        let resolver = MemoryResolver::new()
            .with_file("main.s", ".INCLUDE \"lib.s\"\nNOP\n")
            .with_file("lib.s", "NOP\n");
        let mut diags = Diagnostics::new();
        let result = preprocess("main.s", &resolver, &mut diags);
        assert!(!diags.has_errors(), "{}", diags.summary());
        assert_eq!(kinds_of(&result.tokens), vec!["PUSH_CTX", "POP_CTX"]);
        assert!(result.sources.contains_key("lib.s"));
        assert_eq!(result.unit_of_file["lib.s"], "main.s");
    }

    #[test]
    fn test_include_cycle_is_detected() {
        let resolver = MemoryResolver::new()
            .with_file("a.s", ".INCLUDE \"b.s\"\n")
            .with_file("b.s", ".INCLUDE \"a.s\"\n");
        let mut diags = Diagnostics::new();
        preprocess("a.s", &resolver, &mut diags);
        assert!(diags.has_errors());
        assert!(diags.summary().contains("include cycle"));
    }

    #[test]
    fn test_missing_include_is_reported() {
        let resolver = MemoryResolver::new().with_file("main.s", ".INCLUDE \"nope.s\"\n");
        let mut diags = Diagnostics::new();
        preprocess("main.s", &resolver, &mut diags);
        assert!(diags.has_errors());
        assert!(diags.summary().contains("not found"));
    }

    #[test]
    fn test_require_appends_unit_and_rewrites_path() {
        let resolver = MemoryResolver::new()
            .with_file("dir/main.s", ".REQUIRE \"lib.s\" AS LIB\nNOP\n")
            .with_file("dir/lib.s", "NOP\n");
        let mut diags = Diagnostics::new();
        let result = preprocess("dir/main.s", &resolver, &mut diags);
        assert!(!diags.has_errors(), "{}", diags.summary());

        let path_token = result
            .tokens
            .iter()
            .find(|t| t.kind == TokenKind::StringLit)
            .expect("require path token survives");
        assert_eq!(path_token.text, "dir/lib.s");
        assert_eq!(result.unit_of_file["dir/lib.s"], "dir/lib.s");
        // required unit is bracketed so layout resets its cursor
        assert_eq!(kinds_of(&result.tokens), vec!["REQUIRE", "PUSH_CTX", "POP_CTX"]);
    }

    #[test]
    fn test_require_is_deduplicated() {
        let resolver = MemoryResolver::new()
            .with_file("main.s", ".REQUIRE \"lib.s\" AS A\n.REQUIRE \"lib.s\" AS B\n")
            .with_file("lib.s", "NOP\n");
        let mut diags = Diagnostics::new();
        let result = preprocess("main.s", &resolver, &mut diags);
        assert!(!diags.has_errors());
        let pushes = kinds_of(&result.tokens)
            .iter()
            .filter(|n| n.as_str() == "PUSH_CTX")
            .count();
        assert_eq!(pushes, 1);
    }

    #[test]
    fn test_relative_resolution_from_including_file() {
        let resolver = MemoryResolver::new()
            .with_file("a/main.s", ".INCLUDE \"sub/x.s\"\n")
            .with_file("a/sub/x.s", "NOP\n");
        let mut diags = Diagnostics::new();
        let result = preprocess("a/main.s", &resolver, &mut diags);
        assert!(!diags.has_errors(), "{}", diags.summary());
        assert!(result.sources.contains_key("a/sub/x.s"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a\\b\\c.s"), "a/b/c.s");
        assert_eq!(normalize_path("a/./b/../c.s"), "a/c.s");
        assert_eq!(normalize_path("./lib.s"), "lib.s");
    }
}
