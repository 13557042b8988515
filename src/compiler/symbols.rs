//! # Symbol Table
//!
//! Arena-backed scope tree. Scopes refer to their parent by [`ScopeId`], so
//! there are no owned back-pointers; the analyzer carries the current scope
//! through its walk context. Within a scope, entries are keyed by upper-cased
//! name and then by compilation unit (file), which keeps required files from
//! leaking symbols into each other.

use crate::compiler::token::Token;
use crate::runtime::molecule::MoleculeType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub type ScopeId = usize;

/// The root scope is always index zero.
pub const ROOT_SCOPE: ScopeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Label,
    Procedure,
    Variable,
    Alias,
    Constant,
}

/// Value of a `.DEFINE` constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Number(i64),
    Vector(Vec<i64>),
    Typed(MoleculeType, i64),
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolMeta {
    None,
    Constant(ConstValue),
    /// Canonical register text, e.g. `%DR0`
    RegisterAlias(String),
    /// Formal parameter; resolves to `%FPR<index>`
    Variable { fpr_index: usize },
    Procedure {
        exported: bool,
        /// Globally unique layout label
        qualified: String,
        params: Vec<String>,
    },
    Label { qualified: String },
    /// Local alias created by `.IMPORT`, pointing at an exported procedure
    ProcedureRef { qualified: String, params: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: Token,
    pub kind: SymbolKind,
    pub meta: SymbolMeta,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("symbol '{0}' already defined")]
    AlreadyDefined(String),

    #[error("unknown alias '{0}'")]
    UnknownAlias(String),

    #[error("unresolved symbol '{0}'")]
    Unresolved(String),

    #[error("procedure '{0}' is not exported")]
    NotExported(String),
}

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    /// upper-cased name -> file -> symbol
    symbols: HashMap<String, HashMap<String, Symbol>>,
}

/// The scope tree plus per-file `.REQUIRE` alias maps.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    /// requiring file -> alias -> target file
    aliases: HashMap<String, HashMap<String, String>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::default()],
            aliases: HashMap::new(),
        }
    }

    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(parent),
            symbols: HashMap::new(),
        });
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope].parent
    }

    /// Define a symbol in `scope` for `file`. Duplicate definitions within
    /// the same (scope, file) are rejected.
    pub fn define(
        &mut self,
        scope: ScopeId,
        file: &str,
        symbol: Symbol,
    ) -> Result<(), SymbolError> {
        let key = symbol.name.upper();
        let per_file = self.scopes[scope].symbols.entry(key.clone()).or_default();
        if per_file.contains_key(file) {
            return Err(SymbolError::AlreadyDefined(symbol.name.text.clone()));
        }
        per_file.insert(file.to_string(), symbol);
        Ok(())
    }

    /// Resolve `name` for `file`, walking from `scope` toward the root. The
    /// first scope holding a file-qualified entry wins.
    pub fn resolve(&self, scope: ScopeId, file: &str, name: &str) -> Option<&Symbol> {
        let key = name.to_uppercase();
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(per_file) = self.scopes[id].symbols.get(&key) {
                if let Some(symbol) = file_entry(per_file, file) {
                    return Some(symbol);
                }
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// Search the whole tree for `name` defined in `file`, for cross-file
    /// lookups that ignore lexical scoping.
    pub fn resolve_in_file(&self, file: &str, name: &str) -> Option<&Symbol> {
        let key = name.to_uppercase();
        self.scopes.iter().find_map(|scope| {
            scope
                .symbols
                .get(&key)
                .and_then(|per_file| file_entry(per_file, file))
        })
    }

    /// Resolve a dotted `ALIAS.NAME` from `requesting_file`. The target must
    /// be an exported procedure.
    pub fn resolve_qualified(
        &self,
        requesting_file: &str,
        alias: &str,
        name: &str,
    ) -> Result<&Symbol, SymbolError> {
        let target_file = self
            .alias_target(requesting_file, alias)
            .ok_or_else(|| SymbolError::UnknownAlias(alias.to_string()))?;
        let symbol = self
            .resolve_in_file(&target_file, name)
            .ok_or_else(|| SymbolError::Unresolved(format!("{alias}.{name}")))?;
        if symbol.kind == SymbolKind::Procedure {
            if let SymbolMeta::Procedure { exported: false, .. } = symbol.meta {
                return Err(SymbolError::NotExported(name.to_string()));
            }
        }
        Ok(symbol)
    }

    pub fn record_alias(&mut self, requesting_file: &str, alias: &str, target_file: &str) {
        self.aliases
            .entry(requesting_file.to_string())
            .or_default()
            .insert(alias.to_uppercase(), target_file.to_string());
    }

    pub fn alias_target(&self, requesting_file: &str, alias: &str) -> Option<String> {
        file_entry(&self.aliases, requesting_file)?
            .get(&alias.to_uppercase())
            .cloned()
    }
}

/// Exact file-key lookup, falling back to a path-suffix match so the same
/// source compiles whether it was addressed absolutely or relatively.
fn file_entry<'a, V>(map: &'a HashMap<String, V>, file: &str) -> Option<&'a V> {
    if let Some(v) = map.get(file) {
        return Some(v);
    }
    map.iter()
        .find(|(key, _)| {
            key.ends_with(&format!("/{file}")) || file.ends_with(&format!("/{key}"))
        })
        .map(|(_, v)| v)
}
