//! # Assembly AST
//!
//! Abstract syntax tree for the assembly language. One closed sum covers
//! top-level items and operand literals alike, so generic tree walks (label
//! collection, analysis passes) can traverse everything through
//! [`AstNode::children`].

use crate::compiler::diagnostics::SourceInfo;
use crate::compiler::token::Token;
use serde::{Deserialize, Serialize};

/// Parameter passing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamMode {
    /// Caller registers are restored after the call
    Ref,
    /// Consumed by the callee
    Val,
}

/// A formal procedure parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormalParam {
    pub name: Token,
    pub mode: ParamMode,
}

/// One axis of a `.PLACE` target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementComponent {
    Scalar(i64),
    /// Inclusive range `lo..hi`
    Range(i64, i64),
    /// `*`: every valid index along the axis
    Wildcard,
}

/// Procedure definition: `.PROC NAME [EXPORT] [WITH] [REF ...] [VAL ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureNode {
    pub name: Token,
    pub exported: bool,
    pub params: Vec<FormalParam>,
    pub body: Vec<AstNode>,
    pub source: SourceInfo,
}

impl ProcedureNode {
    pub fn ref_params(&self) -> impl Iterator<Item = &FormalParam> {
        self.params.iter().filter(|p| p.mode == ParamMode::Ref)
    }

    pub fn val_params(&self) -> impl Iterator<Item = &FormalParam> {
        self.params.iter().filter(|p| p.mode == ParamMode::Val)
    }
}

/// All AST node variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstNode {
    /// `.DEFINE NAME value`
    Define {
        name: Token,
        value: Box<AstNode>,
        source: SourceInfo,
    },
    /// `NAME:`
    Label { name: Token, source: SourceInfo },
    /// Opcode with operands; `CALL` additionally carries its actual lists
    Instruction {
        opcode: Token,
        operands: Vec<AstNode>,
        ref_actuals: Vec<AstNode>,
        val_actuals: Vec<AstNode>,
        source: SourceInfo,
    },
    Procedure(ProcedureNode),
    /// `.SCOPE NAME ... .ENDS`
    Scope {
        name: Token,
        body: Vec<AstNode>,
        source: SourceInfo,
    },
    /// `.REQUIRE "path" AS ALIAS`
    Require {
        path: Token,
        alias: Token,
        source: SourceInfo,
    },
    /// `.IMPORT ALIAS.NAME AS LOCAL`
    Import {
        target: Token,
        alias: Token,
        source: SourceInfo,
    },
    /// `.PLACE TYPE:value components`
    Place {
        molecule: Box<AstNode>,
        components: Vec<PlacementComponent>,
        source: SourceInfo,
    },
    /// `.ORG vector`
    Org {
        position: Box<AstNode>,
        source: SourceInfo,
    },
    /// `.DIR vector`
    Dir {
        direction: Box<AstNode>,
        source: SourceInfo,
    },
    /// Synthetic include-region markers
    PushCtx { source: SourceInfo },
    PopCtx { source: SourceInfo },
    /// `.REG ALIAS %DR0` / `.PREG ALIAS %PR0`
    Reg {
        alias: Token,
        register: Token,
        proc_only: bool,
        source: SourceInfo,
    },
    NumberLiteral { value: i64, source: SourceInfo },
    VectorLiteral {
        components: Vec<i64>,
        source: SourceInfo,
    },
    Register { name: Token, source: SourceInfo },
    /// `DATA:42`
    TypedLiteral {
        type_name: Token,
        value: i64,
        source: SourceInfo,
    },
    /// Identifier in operand position: alias, constant, or label, resolved
    /// during analysis
    LabelRef { name: Token, source: SourceInfo },
}

impl AstNode {
    pub fn source(&self) -> &SourceInfo {
        match self {
            AstNode::Define { source, .. }
            | AstNode::Label { source, .. }
            | AstNode::Instruction { source, .. }
            | AstNode::Scope { source, .. }
            | AstNode::Require { source, .. }
            | AstNode::Import { source, .. }
            | AstNode::Place { source, .. }
            | AstNode::Org { source, .. }
            | AstNode::Dir { source, .. }
            | AstNode::PushCtx { source }
            | AstNode::PopCtx { source }
            | AstNode::Reg { source, .. }
            | AstNode::NumberLiteral { source, .. }
            | AstNode::VectorLiteral { source, .. }
            | AstNode::Register { source, .. }
            | AstNode::TypedLiteral { source, .. }
            | AstNode::LabelRef { source, .. } => source,
            AstNode::Procedure(proc) => &proc.source,
        }
    }

    /// Child nodes in source order, for generic walks.
    pub fn children(&self) -> Vec<&AstNode> {
        match self {
            AstNode::Define { value, .. } => vec![value.as_ref()],
            AstNode::Instruction {
                operands,
                ref_actuals,
                val_actuals,
                ..
            } => operands
                .iter()
                .chain(ref_actuals.iter())
                .chain(val_actuals.iter())
                .collect(),
            AstNode::Procedure(proc) => proc.body.iter().collect(),
            AstNode::Scope { body, .. } => body.iter().collect(),
            AstNode::Place { molecule, .. } => vec![molecule.as_ref()],
            AstNode::Org { position, .. } => vec![position.as_ref()],
            AstNode::Dir { direction, .. } => vec![direction.as_ref()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::token::TokenKind;

    fn tok(text: &str) -> Token {
        Token::new(TokenKind::Identifier, text, SourceInfo::new("t.s", 1, 1))
    }

    #[test]
    fn test_procedure_param_partitions() {
        let proc = ProcedureNode {
            name: tok("P"),
            exported: false,
            params: vec![
                FormalParam { name: tok("A"), mode: ParamMode::Ref },
                FormalParam { name: tok("B"), mode: ParamMode::Val },
                FormalParam { name: tok("C"), mode: ParamMode::Ref },
            ],
            body: Vec::new(),
            source: SourceInfo::new("t.s", 1, 1),
        };
        let refs: Vec<&str> = proc.ref_params().map(|p| p.name.text.as_str()).collect();
        let vals: Vec<&str> = proc.val_params().map(|p| p.name.text.as_str()).collect();
        assert_eq!(refs, vec!["A", "C"]);
        assert_eq!(vals, vec!["B"]);
    }

    #[test]
    fn test_children_covers_operands_and_actuals() {
        let node = AstNode::Instruction {
            opcode: tok("CALL"),
            operands: vec![AstNode::LabelRef {
                name: tok("P"),
                source: SourceInfo::new("t.s", 1, 6),
            }],
            ref_actuals: vec![AstNode::Register {
                name: tok("%DR1"),
                source: SourceInfo::new("t.s", 1, 12),
            }],
            val_actuals: Vec::new(),
            source: SourceInfo::new("t.s", 1, 1),
        };
        assert_eq!(node.children().len(), 2);
    }
}
