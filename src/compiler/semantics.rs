//! # Semantic Analysis
//!
//! Two passes over the AST. Pass 1 walks the tree collecting labels,
//! procedures, formal parameters, and `.REQUIRE` aliases, allocating the
//! scope tree as it goes. Pass 2 re-walks the same structure (re-entering
//! scopes in allocation order) and dispatches each node kind to its analysis
//! handler: instruction signature checks, constant definition, register
//! alias validation, imports. Errors accumulate; analysis never stops early.

use crate::compiler::ast::{AstNode, ProcedureNode};
use crate::compiler::diagnostics::{Diagnostics, SourceInfo};
use crate::compiler::symbols::{
    ConstValue, ScopeId, Symbol, SymbolError, SymbolKind, SymbolMeta, SymbolTable, ROOT_SCOPE,
};
use crate::compiler::token::Token;
use crate::runtime::environment::EnvironmentProperties;
use crate::runtime::isa::{self, ArgType};
use crate::runtime::molecule::MoleculeType;
use crate::runtime::organism::{RegisterClass, RegisterRef, NUM_FORMAL_PARAM_REGISTERS};
use std::collections::HashMap;
use tracing::debug;

/// Everything later phases need from analysis.
#[derive(Debug)]
pub struct Analysis {
    pub table: SymbolTable,
    /// Scope ids in allocation order; later walks re-enter scopes by cursor
    pub scope_order: Vec<ScopeId>,
    /// Alias name -> encoded register id, for the artifact
    pub register_alias_map: HashMap<String, i32>,
    /// Qualified procedure name -> formal parameter names
    pub proc_params: HashMap<String, Vec<String>>,
}

/// Compilation-unit lookup for a token's file.
pub fn unit_of<'a>(units: &'a HashMap<String, String>, file: &'a str) -> &'a str {
    units.get(file).map_or(file, String::as_str)
}

/// Resolve an identifier operand, handling dotted cross-file names.
pub fn resolve_name<'t>(
    table: &'t SymbolTable,
    scope: ScopeId,
    unit: &str,
    name: &str,
) -> Result<&'t Symbol, SymbolError> {
    if let Some((alias, rest)) = name.split_once('.') {
        return table.resolve_qualified(unit, alias, rest);
    }
    table
        .resolve(scope, unit, name)
        .ok_or_else(|| SymbolError::Unresolved(name.to_string()))
}

/// Run both passes.
pub fn analyze(
    ast: &[AstNode],
    units: &HashMap<String, String>,
    env_props: &EnvironmentProperties,
    diags: &mut Diagnostics,
) -> Analysis {
    let mut table = SymbolTable::new();
    let mut scope_order = Vec::new();

    let mut pass1 = Pass1 {
        table: &mut table,
        scope_order: &mut scope_order,
        units,
        diags,
        scope_path: Vec::new(),
    };
    pass1.collect(ast, ROOT_SCOPE);
    debug!(scopes = scope_order.len() + 1, "label collection finished");

    let mut pass2 = Pass2 {
        table: &mut table,
        scope_order: &scope_order,
        scope_cursor: 0,
        units,
        env_props,
        diags,
        register_alias_map: HashMap::new(),
        proc_params: HashMap::new(),
    };
    pass2.analyze_nodes(ast, ROOT_SCOPE);

    Analysis {
        register_alias_map: pass2.register_alias_map,
        proc_params: pass2.proc_params,
        table,
        scope_order,
    }
}

// ----------------------------------------------------------------------
// Pass 1: label and procedure collection
// ----------------------------------------------------------------------

struct Pass1<'a> {
    table: &'a mut SymbolTable,
    scope_order: &'a mut Vec<ScopeId>,
    units: &'a HashMap<String, String>,
    diags: &'a mut Diagnostics,
    scope_path: Vec<String>,
}

impl Pass1<'_> {
    fn qualify(&self, unit: &str, name: &str) -> String {
        let mut qualified = String::from(unit);
        for segment in &self.scope_path {
            qualified.push_str("::");
            qualified.push_str(segment);
        }
        qualified.push_str("::");
        qualified.push_str(&name.to_uppercase());
        qualified
    }

    fn define(&mut self, scope: ScopeId, unit: &str, symbol: Symbol) {
        let source = symbol.name.source.clone();
        if let Err(e) = self.table.define(scope, unit, symbol) {
            self.diags.error(e.to_string(), source);
        }
    }

    fn collect(&mut self, nodes: &[AstNode], scope: ScopeId) {
        for node in nodes {
            match node {
                AstNode::Label { name, .. } => {
                    let unit = unit_of(self.units, &name.source.file).to_string();
                    let qualified = self.qualify(&unit, &name.text);
                    self.define(
                        scope,
                        &unit,
                        Symbol {
                            name: name.clone(),
                            kind: SymbolKind::Label,
                            meta: SymbolMeta::Label { qualified },
                        },
                    );
                }
                AstNode::Procedure(proc) => self.collect_procedure(proc, scope),
                AstNode::Scope { name, body, .. } => {
                    let child = self.table.push_scope(scope);
                    self.scope_order.push(child);
                    self.scope_path.push(name.upper());
                    self.collect(body, child);
                    self.scope_path.pop();
                }
                AstNode::Require { path, alias, .. } => {
                    let unit = unit_of(self.units, &alias.source.file).to_string();
                    self.table.record_alias(&unit, &alias.upper(), &path.text);
                }
                _ => {}
            }
        }
    }

    fn collect_procedure(&mut self, proc: &ProcedureNode, scope: ScopeId) {
        let unit = unit_of(self.units, &proc.name.source.file).to_string();
        let qualified = self.qualify(&unit, &proc.name.text);
        let params: Vec<String> = proc.params.iter().map(|p| p.name.upper()).collect();

        // formal registers are assigned refs-first, so declaration order
        // must match
        let mut seen_val = false;
        for param in &proc.params {
            match param.mode {
                crate::compiler::ast::ParamMode::Val => seen_val = true,
                crate::compiler::ast::ParamMode::Ref if seen_val => {
                    self.diags.error(
                        format!(
                            "REF parameter '{}' must precede VAL parameters",
                            param.name.text
                        ),
                        param.name.source.clone(),
                    );
                }
                crate::compiler::ast::ParamMode::Ref => {}
            }
        }

        if proc.params.len() > NUM_FORMAL_PARAM_REGISTERS {
            self.diags.error(
                format!(
                    "procedure '{}' has {} parameters, at most {} fit in formal registers",
                    proc.name.text,
                    proc.params.len(),
                    NUM_FORMAL_PARAM_REGISTERS
                ),
                proc.source.clone(),
            );
        }

        self.define(
            scope,
            &unit,
            Symbol {
                name: proc.name.clone(),
                kind: SymbolKind::Procedure,
                meta: SymbolMeta::Procedure {
                    exported: proc.exported,
                    qualified,
                    params,
                },
            },
        );

        let child = self.table.push_scope(scope);
        self.scope_order.push(child);
        self.scope_path.push(proc.name.upper());
        for (index, param) in proc.params.iter().enumerate() {
            self.define(
                child,
                &unit,
                Symbol {
                    name: param.name.clone(),
                    kind: SymbolKind::Variable,
                    meta: SymbolMeta::Variable { fpr_index: index },
                },
            );
        }
        self.collect(&proc.body, child);
        self.scope_path.pop();
    }
}

// ----------------------------------------------------------------------
// Pass 2: full analysis
// ----------------------------------------------------------------------

struct Pass2<'a> {
    table: &'a mut SymbolTable,
    scope_order: &'a [ScopeId],
    scope_cursor: usize,
    units: &'a HashMap<String, String>,
    env_props: &'a EnvironmentProperties,
    diags: &'a mut Diagnostics,
    register_alias_map: HashMap<String, i32>,
    proc_params: HashMap<String, Vec<String>>,
}

impl Pass2<'_> {
    fn enter_next_scope(&mut self, source: &SourceInfo) -> ScopeId {
        match self.scope_order.get(self.scope_cursor) {
            Some(id) => {
                self.scope_cursor += 1;
                *id
            }
            None => {
                // only reachable when pass 1 bailed out of a malformed tree
                self.diags
                    .error("internal scope bookkeeping mismatch", source.clone());
                ROOT_SCOPE
            }
        }
    }

    fn unit_for(&self, source: &SourceInfo) -> String {
        unit_of(self.units, &source.file).to_string()
    }

    fn analyze_nodes(&mut self, nodes: &[AstNode], scope: ScopeId) {
        for node in nodes {
            match node {
                AstNode::Define { name, value, source } => {
                    self.handle_define(name, value, source, scope);
                }
                AstNode::Reg {
                    alias,
                    register,
                    proc_only,
                    source,
                } => self.handle_reg(alias, register, *proc_only, source, scope),
                AstNode::Import {
                    target,
                    alias,
                    source,
                } => self.handle_import(target, alias, source, scope),
                AstNode::Instruction {
                    opcode,
                    operands,
                    ref_actuals,
                    val_actuals,
                    source,
                } => self.handle_instruction(opcode, operands, ref_actuals, val_actuals, source, scope),
                AstNode::Procedure(proc) => {
                    let child = self.enter_next_scope(&proc.source);
                    if let Some(SymbolMeta::Procedure { qualified, params, .. }) = self
                        .table
                        .resolve(scope, &self.unit_for(&proc.source), &proc.name.text)
                        .map(|s| s.meta.clone())
                    {
                        self.proc_params.insert(qualified, params);
                    }
                    self.analyze_nodes(&proc.body, child);
                }
                AstNode::Scope { body, source, .. } => {
                    let child = self.enter_next_scope(source);
                    self.analyze_nodes(body, child);
                }
                AstNode::Org { position, source } => {
                    self.check_vector_dims(position, source, false);
                }
                AstNode::Dir { direction, source } => {
                    self.check_vector_dims(direction, source, true);
                }
                AstNode::Place {
                    components, source, ..
                } => {
                    if components.len() != self.env_props.dims() {
                        self.diags.error(
                            format!(
                                "placement has {} components, world has {} dimensions",
                                components.len(),
                                self.env_props.dims()
                            ),
                            source.clone(),
                        );
                    }
                }
                // handled in pass 1 or by layout
                AstNode::Label { .. }
                | AstNode::Require { .. }
                | AstNode::PushCtx { .. }
                | AstNode::PopCtx { .. } => {}
                _ => {}
            }
        }
    }

    fn handle_define(
        &mut self,
        name: &Token,
        value: &AstNode,
        source: &SourceInfo,
        scope: ScopeId,
    ) {
        let const_value = match value {
            AstNode::NumberLiteral { value, .. } => ConstValue::Number(*value),
            AstNode::VectorLiteral { components, .. } => ConstValue::Vector(components.clone()),
            AstNode::TypedLiteral {
                type_name, value, ..
            } => match MoleculeType::parse(&type_name.text) {
                Some(mtype) => ConstValue::Typed(mtype, *value),
                None => {
                    self.diags.error(
                        format!("unknown molecule type '{}'", type_name.text),
                        source.clone(),
                    );
                    return;
                }
            },
            _ => {
                self.diags
                    .error("constant value must be a literal", source.clone());
                return;
            }
        };
        let unit = self.unit_for(source);
        if let Err(e) = self.table.define(
            scope,
            &unit,
            Symbol {
                name: name.clone(),
                kind: SymbolKind::Constant,
                meta: SymbolMeta::Constant(const_value),
            },
        ) {
            self.diags.error(e.to_string(), source.clone());
        }
    }

    fn handle_reg(
        &mut self,
        alias: &Token,
        register: &Token,
        proc_only: bool,
        source: &SourceInfo,
        scope: ScopeId,
    ) {
        let Some(reg) = RegisterRef::parse(&register.text) else {
            self.diags.error(
                format!("malformed register '{}'", register.text),
                source.clone(),
            );
            return;
        };
        if reg.index >= reg.class.count() {
            self.diags.error(
                format!(
                    "register index {} out of range for %{}",
                    reg.index,
                    reg.class.prefix()
                ),
                source.clone(),
            );
            return;
        }
        if proc_only && reg.class != RegisterClass::Proc {
            self.diags.error(
                format!(".PREG requires a %PR register, found '{}'", register.text),
                source.clone(),
            );
            return;
        }

        let unit = self.unit_for(source);
        let canonical = register.upper();
        if let Err(e) = self.table.define(
            scope,
            &unit,
            Symbol {
                name: alias.clone(),
                kind: SymbolKind::Alias,
                meta: SymbolMeta::RegisterAlias(canonical),
            },
        ) {
            self.diags.error(e.to_string(), source.clone());
            return;
        }
        self.register_alias_map.insert(alias.upper(), reg.encode());
    }

    fn handle_import(
        &mut self,
        target: &Token,
        alias: &Token,
        source: &SourceInfo,
        scope: ScopeId,
    ) {
        let unit = self.unit_for(source);
        let resolved = match resolve_name(self.table, scope, &unit, &target.text) {
            Ok(symbol) => symbol.meta.clone(),
            Err(e) => {
                self.diags.error(e.to_string(), source.clone());
                return;
            }
        };
        let meta = match resolved {
            SymbolMeta::Procedure {
                qualified, params, ..
            }
            | SymbolMeta::ProcedureRef { qualified, params } => SymbolMeta::ProcedureRef {
                qualified,
                params,
            },
            _ => {
                self.diags.error(
                    format!("'{}' does not name a procedure", target.text),
                    source.clone(),
                );
                return;
            }
        };
        if let Err(e) = self.table.define(
            scope,
            &unit,
            Symbol {
                name: alias.clone(),
                kind: SymbolKind::Alias,
                meta,
            },
        ) {
            self.diags.error(e.to_string(), source.clone());
        }
    }

    fn check_vector_dims(&mut self, node: &AstNode, source: &SourceInfo, unit_vector: bool) {
        let AstNode::VectorLiteral { components, .. } = node else {
            self.diags.error("expected a vector literal", source.clone());
            return;
        };
        if components.len() != self.env_props.dims() {
            self.diags.error(
                format!(
                    "vector has {} components, world has {} dimensions",
                    components.len(),
                    self.env_props.dims()
                ),
                source.clone(),
            );
            return;
        }
        if unit_vector {
            let nonzero = components.iter().filter(|c| **c != 0).count();
            let in_range = components.iter().all(|c| c.abs() <= 1);
            if nonzero != 1 || !in_range {
                self.diags.error(
                    "direction must move along exactly one axis by one cell",
                    source.clone(),
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Instruction checking
    // ------------------------------------------------------------------

    fn handle_instruction(
        &mut self,
        opcode: &Token,
        operands: &[AstNode],
        ref_actuals: &[AstNode],
        val_actuals: &[AstNode],
        source: &SourceInfo,
        scope: ScopeId,
    ) {
        let Some(info) = isa::registry().info_by_name(&opcode.upper()) else {
            self.diags
                .error(format!("unknown opcode '{}'", opcode.text), source.clone());
            return;
        };

        if operands.len() != info.args.len() {
            self.diags.error(
                format!(
                    "{} expects {} operand(s), found {}",
                    info.name,
                    info.args.len(),
                    operands.len()
                ),
                source.clone(),
            );
            return;
        }

        for (arg_type, operand) in info.args.iter().zip(operands) {
            self.check_operand(*arg_type, operand, scope);
        }

        for actual in ref_actuals {
            if !self.operand_is_register(actual, scope) {
                self.diags.error(
                    "REF actuals must be registers",
                    actual.source().clone(),
                );
            }
        }
        for actual in val_actuals {
            self.check_val_actual(actual, scope);
        }

        // calls to a resolvable procedure must pass one actual per parameter
        if info.name == "CALL" {
            if let Some(AstNode::LabelRef { name, .. }) = operands.first() {
                let unit = self.unit_for(&name.source);
                let params = match resolve_name(self.table, scope, &unit, &name.text) {
                    Ok(Symbol {
                        meta:
                            SymbolMeta::Procedure { params, .. }
                            | SymbolMeta::ProcedureRef { params, .. },
                        ..
                    }) => Some(params.len()),
                    _ => None,
                };
                if let Some(expected) = params {
                    let actuals = ref_actuals.len() + val_actuals.len();
                    if actuals != expected {
                        self.diags.error(
                            format!(
                                "call passes {actuals} actual(s), procedure '{}' declares {expected} parameter(s)",
                                name.text
                            ),
                            source.clone(),
                        );
                    }
                }
            }
        }
    }

    fn check_operand(&mut self, expected: ArgType, operand: &AstNode, scope: ScopeId) {
        match expected {
            ArgType::Register => {
                if !self.operand_is_register(operand, scope) {
                    self.diags.error(
                        "operand must be a register",
                        operand.source().clone(),
                    );
                }
            }
            ArgType::LocationRegister => match self.operand_register(operand, scope) {
                Some(reg) if reg.class == RegisterClass::Location => {}
                Some(_) => self.diags.error(
                    "operand must be a location register",
                    operand.source().clone(),
                ),
                None => self.diags.error(
                    "operand must be a location register",
                    operand.source().clone(),
                ),
            },
            ArgType::Immediate | ArgType::Literal => match operand {
                AstNode::NumberLiteral { .. } | AstNode::TypedLiteral { .. } => {}
                AstNode::LabelRef { name, .. } => {
                    match self.resolve_operand(name, scope) {
                        Some(SymbolMeta::Constant(
                            ConstValue::Number(_) | ConstValue::Typed(..),
                        )) => {}
                        Some(_) => self.diags.error(
                            format!("'{}' is not a scalar constant", name.text),
                            operand.source().clone(),
                        ),
                        None => {}
                    }
                }
                _ => self.diags.error(
                    "operand must be a number or typed literal",
                    operand.source().clone(),
                ),
            },
            ArgType::Vector => match operand {
                AstNode::VectorLiteral { components, .. } => {
                    if components.len() != self.env_props.dims() {
                        self.diags.error(
                            format!(
                                "vector has {} components, world has {} dimensions",
                                components.len(),
                                self.env_props.dims()
                            ),
                            operand.source().clone(),
                        );
                    }
                }
                AstNode::LabelRef { name, .. } => {
                    match self.resolve_operand(name, scope) {
                        Some(SymbolMeta::Constant(ConstValue::Vector(v))) => {
                            if v.len() != self.env_props.dims() {
                                self.diags.error(
                                    format!(
                                        "vector constant '{}' has the wrong dimensionality",
                                        name.text
                                    ),
                                    operand.source().clone(),
                                );
                            }
                        }
                        Some(_) => self.diags.error(
                            format!("'{}' is not a vector constant", name.text),
                            operand.source().clone(),
                        ),
                        None => {}
                    }
                }
                _ => self.diags.error(
                    "operand must be a vector",
                    operand.source().clone(),
                ),
            },
            ArgType::Label => match operand {
                AstNode::LabelRef { name, .. } => {
                    match self.resolve_operand(name, scope) {
                        Some(
                            SymbolMeta::Label { .. }
                            | SymbolMeta::Procedure { .. }
                            | SymbolMeta::ProcedureRef { .. },
                        )
                        | None => {}
                        Some(_) => self.diags.error(
                            format!("'{}' does not name a label or procedure", name.text),
                            operand.source().clone(),
                        ),
                    }
                }
                _ => self.diags.error(
                    "operand must be a label",
                    operand.source().clone(),
                ),
            },
        }
    }

    fn check_val_actual(&mut self, actual: &AstNode, scope: ScopeId) {
        match actual {
            AstNode::NumberLiteral { .. } | AstNode::TypedLiteral { .. } => {}
            AstNode::Register { .. } => {}
            AstNode::LabelRef { name, .. } => {
                // registers via alias, constants, and labels are all pushable
                if self.resolve_operand(name, scope).is_none() {
                    // diagnostic already emitted by resolve_operand
                }
            }
            _ => self.diags.error(
                "VAL actuals must be registers, literals, or labels",
                actual.source().clone(),
            ),
        }
    }

    fn operand_is_register(&mut self, operand: &AstNode, scope: ScopeId) -> bool {
        self.operand_register(operand, scope).is_some()
    }

    /// Resolve an operand down to a concrete register, via aliases and
    /// formal parameters, validating the index bound.
    fn operand_register(&mut self, operand: &AstNode, scope: ScopeId) -> Option<RegisterRef> {
        match operand {
            AstNode::Register { name, .. } => {
                let reg = RegisterRef::parse(&name.text)?;
                if reg.index >= reg.class.count() {
                    self.diags.error(
                        format!(
                            "register index {} out of range for %{}",
                            reg.index,
                            reg.class.prefix()
                        ),
                        name.source.clone(),
                    );
                    return None;
                }
                Some(reg)
            }
            AstNode::LabelRef { name, .. } => match self.resolve_operand(name, scope)? {
                SymbolMeta::RegisterAlias(text) => RegisterRef::parse(&text),
                SymbolMeta::Variable { fpr_index } => {
                    Some(RegisterRef::new(RegisterClass::Formal, fpr_index))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Resolve an identifier, reporting unresolved names once.
    fn resolve_operand(&mut self, name: &Token, scope: ScopeId) -> Option<SymbolMeta> {
        let unit = self.unit_for(&name.source);
        match resolve_name(self.table, scope, &unit, &name.text) {
            Ok(symbol) => Some(symbol.meta.clone()),
            Err(e) => {
                self.diags.error(e.to_string(), name.source.clone());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{lexer, parser};

    fn analyze_source(source: &str) -> (Analysis, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = lexer::tokenize(source, "test.s", &mut diags);
        let ast = parser::parse(tokens, &mut diags);
        let props = EnvironmentProperties::new(vec![32, 32], true);
        let analysis = analyze(&ast, &HashMap::new(), &props, &mut diags);
        (analysis, diags)
    }

    #[test]
    fn test_simple_program_is_clean() {
        let (_, diags) = analyze_source("START:\n  SETI %DR0 DATA:1\n  JMPI START\n");
        assert!(!diags.has_errors(), "{}", diags.summary());
    }

    #[test]
    fn test_unknown_symbol_reported() {
        let (_, diags) = analyze_source("JMPI NOWHERE\n");
        assert!(diags.has_errors());
        assert!(diags.summary().contains("unresolved symbol"));
    }

    #[test]
    fn test_arity_mismatch_reported() {
        let (_, diags) = analyze_source("SETI %DR0\n");
        assert!(diags.has_errors());
        assert!(diags.summary().contains("expects 2 operand(s)"));
    }

    #[test]
    fn test_operand_kind_mismatch_reported() {
        let (_, diags) = analyze_source("SETI 5 DATA:1\n");
        assert!(diags.has_errors());
        assert!(diags.summary().contains("must be a register"));
    }

    #[test]
    fn test_register_bound_checked() {
        let (_, diags) = analyze_source("SETI %DR9 DATA:1\n");
        assert!(diags.has_errors());
        assert!(diags.summary().contains("out of range"));
    }

    #[test]
    fn test_preg_requires_proc_register() {
        let (_, diags) = analyze_source(".PREG TMP %DR0\n");
        assert!(diags.has_errors());
        assert!(diags.summary().contains("%PR"));
    }

    #[test]
    fn test_register_alias_resolves_in_operands() {
        let (analysis, diags) =
            analyze_source(".REG COUNTER %DR3\n  SETI COUNTER DATA:1\n");
        assert!(!diags.has_errors(), "{}", diags.summary());
        assert_eq!(
            analysis.register_alias_map.get("COUNTER"),
            Some(&RegisterRef::new(RegisterClass::Data, 3).encode())
        );
    }

    #[test]
    fn test_constant_inlines_as_literal_operand() {
        let (_, diags) = analyze_source(".DEFINE LIMIT 10\n  ADDI %DR0 LIMIT\n");
        assert!(!diags.has_errors(), "{}", diags.summary());
    }

    #[test]
    fn test_formal_params_resolve_inside_procedure() {
        let source = ".PROC INC REF X\n  ADDI X 1\n  RET\n.ENDP\n";
        let (analysis, diags) = analyze_source(source);
        assert!(!diags.has_errors(), "{}", diags.summary());
        assert_eq!(
            analysis.proc_params.get("test.s::INC"),
            Some(&vec!["X".to_string()])
        );
    }

    #[test]
    fn test_formal_params_invisible_outside_procedure() {
        let source = ".PROC INC REF X\n  RET\n.ENDP\n  ADDI X 1\n";
        let (_, diags) = analyze_source(source);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_duplicate_label_reported() {
        let (_, diags) = analyze_source("L:\nL:\n");
        assert!(diags.has_errors());
        assert!(diags.summary().contains("already defined"));
    }

    #[test]
    fn test_labels_resolve_before_definition() {
        // forward reference: pass 1 pre-collects labels
        let (_, diags) = analyze_source("  JMPI END\nEND:\n");
        assert!(!diags.has_errors(), "{}", diags.summary());
    }

    #[test]
    fn test_scoped_label_shadows() {
        let source = "L:\n.SCOPE INNER\nL:\n  JMPI L\n.ENDS\n";
        let (_, diags) = analyze_source(source);
        assert!(!diags.has_errors(), "{}", diags.summary());
    }

    #[test]
    fn test_dir_must_be_unit_vector() {
        let (_, diags) = analyze_source(".DIR 1|1\n");
        assert!(diags.has_errors());
        assert!(diags.summary().contains("exactly one axis"));
    }
}
