//! # Intermediate Representation
//!
//! Linear IR between the AST and layout. Instructions carry resolved
//! operands; structural directives (cursor control, procedure brackets,
//! placements, include regions) are first-class items so the emission rules
//! and the layout engine can pattern-match them exhaustively.

use crate::compiler::ast::PlacementComponent;
use crate::compiler::diagnostics::SourceInfo;
use crate::runtime::molecule::{Molecule, MoleculeType};
use serde::{Deserialize, Serialize};

/// A resolved instruction operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrOperand {
    /// Canonical register text, e.g. `%DR0`
    Register(String),
    Immediate(i64),
    TypedImmediate(MoleculeType, i64),
    Vector(Vec<i64>),
    /// Qualified label name, resolved by the linker
    LabelRef(String),
}

/// An instruction with its operands. `CALL` additionally carries REF/VAL
/// actual lists until caller marshalling rewrites them into stack traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrInstruction {
    pub opcode: String,
    pub operands: Vec<IrOperand>,
    pub ref_operands: Vec<IrOperand>,
    pub val_operands: Vec<IrOperand>,
    /// Encoded ids of marshalled REF registers, recorded for the artifact
    pub call_bindings: Option<Vec<i32>>,
    pub source: SourceInfo,
}

impl IrInstruction {
    pub fn new(opcode: impl Into<String>, operands: Vec<IrOperand>, source: SourceInfo) -> Self {
        IrInstruction {
            opcode: opcode.into(),
            operands,
            ref_operands: Vec::new(),
            val_operands: Vec::new(),
            call_bindings: None,
            source,
        }
    }

    pub fn has_actuals(&self) -> bool {
        !self.ref_operands.is_empty() || !self.val_operands.is_empty()
    }
}

/// One linear IR item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrItem {
    /// Binds the next emitted opcode's address
    Label { name: String, source: SourceInfo },
    /// Absolute cursor move
    Org { position: Vec<i64>, source: SourceInfo },
    /// Cursor direction change
    Dir { direction: Vec<i64>, source: SourceInfo },
    /// Save the layout cursor (include region entry)
    PushCtx { source: SourceInfo },
    /// Restore the layout cursor (include region exit)
    PopCtx { source: SourceInfo },
    /// Start of a procedure body; rewritten into the prologue
    ProcEnter {
        name: String,
        ref_params: Vec<String>,
        val_params: Vec<String>,
        source: SourceInfo,
    },
    /// End of a procedure body; removed by callee marshalling
    ProcExit { source: SourceInfo },
    /// World object placement
    Place {
        molecule: Molecule,
        components: Vec<PlacementComponent>,
        source: SourceInfo,
    },
    Instruction(IrInstruction),
}

impl IrItem {
    pub fn source(&self) -> &SourceInfo {
        match self {
            IrItem::Label { source, .. }
            | IrItem::Org { source, .. }
            | IrItem::Dir { source, .. }
            | IrItem::PushCtx { source }
            | IrItem::PopCtx { source }
            | IrItem::ProcEnter { source, .. }
            | IrItem::ProcExit { source }
            | IrItem::Place { source, .. } => source,
            IrItem::Instruction(instr) => &instr.source,
        }
    }

    /// Convenience accessor for instruction items.
    pub fn as_instruction(&self) -> Option<&IrInstruction> {
        match self {
            IrItem::Instruction(instr) => Some(instr),
            _ => None,
        }
    }
}
