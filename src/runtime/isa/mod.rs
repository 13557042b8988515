//! # Instruction Set
//!
//! The process-wide opcode registry: names, argument signatures, base energy
//! costs, and the environment-modifying flag used by conflict resolution.
//! Initialized once on first access and read-only afterwards.
//!
//! Submodules hold the planned-instruction value types ([`instruction`]),
//! argument decoding ([`planner`]), and opcode semantics ([`exec`]).

use std::collections::HashMap;
use std::sync::OnceLock;

pub mod exec;
pub mod instruction;
pub mod planner;

pub use exec::{ExecutionContext, SpawnRequest};
pub use instruction::{ConflictStatus, PlannedInstruction, PlannedOp};

/// Argument categories an opcode can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Any register (`%DR`, `%PR`, `%FPR`, `%LR`), one cell
    Register,
    /// A `%LR` register specifically, one cell
    LocationRegister,
    /// Plain scalar number, one cell
    Immediate,
    /// Full typed molecule (`DATA:42`), one cell
    Literal,
    /// One cell per world dimension
    Vector,
    /// Label reference; encodes as a relative vector, one cell per dimension
    Label,
}

impl ArgType {
    /// Number of cells this argument occupies in an N-dimensional world.
    pub fn cell_count(self, dims: usize) -> usize {
        match self {
            ArgType::Register | ArgType::LocationRegister | ArgType::Immediate | ArgType::Literal => 1,
            ArgType::Vector | ArgType::Label => dims,
        }
    }
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub id: u16,
    pub name: &'static str,
    pub args: &'static [ArgType],
    pub base_cost: i64,
    pub modifies_environment: bool,
}

impl OpcodeInfo {
    /// Total cells occupied: opcode cell plus argument cells.
    pub fn cell_length(&self, dims: usize) -> usize {
        1 + self
            .args
            .iter()
            .map(|a| a.cell_count(dims))
            .sum::<usize>()
    }
}

use ArgType::{Immediate, Label, Literal, LocationRegister, Register, Vector};

const R: ArgType = Register;
const LR: ArgType = LocationRegister;

/// The full opcode table. Ids are wire format: they appear in machine-code
/// cells, so existing entries keep their ids.
const OPCODES: &[OpcodeInfo] = &[
    OpcodeInfo { id: 0, name: "NOP", args: &[], base_cost: 1, modifies_environment: false },
    // Data movement
    OpcodeInfo { id: 1, name: "SETI", args: &[R, Literal], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 2, name: "SETR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 3, name: "SETV", args: &[R, Vector], base_cost: 1, modifies_environment: false },
    // Arithmetic
    OpcodeInfo { id: 4, name: "ADDI", args: &[R, Immediate], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 5, name: "ADDR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 6, name: "SUBI", args: &[R, Immediate], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 7, name: "SUBR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 8, name: "MULI", args: &[R, Immediate], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 9, name: "MULR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 10, name: "DIVI", args: &[R, Immediate], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 11, name: "DIVR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 12, name: "MODI", args: &[R, Immediate], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 13, name: "MODR", args: &[R, R], base_cost: 1, modifies_environment: false },
    // Data stack
    OpcodeInfo { id: 14, name: "PUSH", args: &[R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 15, name: "POP", args: &[R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 16, name: "PUSI", args: &[Literal], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 17, name: "PUSV", args: &[Label], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 18, name: "DUPS", args: &[], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 19, name: "SWPS", args: &[], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 20, name: "DRPS", args: &[], base_cost: 1, modifies_environment: false },
    // Control flow
    OpcodeInfo { id: 21, name: "JMPI", args: &[Label], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 22, name: "JMPR", args: &[R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 23, name: "CALL", args: &[Label], base_cost: 2, modifies_environment: false },
    OpcodeInfo { id: 24, name: "RET", args: &[], base_cost: 1, modifies_environment: false },
    // Conditionals: execute the next instruction only when the predicate
    // holds (IN* forms negate)
    OpcodeInfo { id: 25, name: "IFR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 26, name: "INR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 27, name: "IFPR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 28, name: "INPR", args: &[R, R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 29, name: "IFPI", args: &[R, Immediate], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 30, name: "INPI", args: &[R, Immediate], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 31, name: "IFPS", args: &[R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 32, name: "INPS", args: &[R], base_cost: 1, modifies_environment: false },
    // Environment access
    OpcodeInfo { id: 33, name: "PEEK", args: &[R, Vector], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 34, name: "POKE", args: &[R, Vector], base_cost: 3, modifies_environment: true },
    OpcodeInfo { id: 35, name: "SCAN", args: &[R, Vector], base_cost: 1, modifies_environment: false },
    // Energy
    OpcodeInfo { id: 36, name: "NRGY", args: &[R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 37, name: "HRVS", args: &[Vector], base_cost: 2, modifies_environment: true },
    // Reproduction
    OpcodeInfo { id: 38, name: "FORK", args: &[R, Vector, Vector], base_cost: 10, modifies_environment: true },
    // Orientation and locations
    OpcodeInfo { id: 39, name: "TRNI", args: &[Vector], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 40, name: "TRNR", args: &[R], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 41, name: "LOCS", args: &[LR], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 42, name: "LOCJ", args: &[LR], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 43, name: "LPSH", args: &[LR], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 44, name: "LPOP", args: &[LR], base_cost: 1, modifies_environment: false },
    // Data pointers
    OpcodeInfo { id: 45, name: "SEKI", args: &[Immediate, Vector], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 46, name: "PEKD", args: &[R, Immediate], base_cost: 1, modifies_environment: false },
    OpcodeInfo { id: 47, name: "POKD", args: &[R, Immediate], base_cost: 3, modifies_environment: true },
];

/// Conditional predicates and their negations, as used by the emission rules.
const CONDITIONAL_PAIRS: &[(&str, &str)] = &[
    ("IFR", "INR"),
    ("IFPR", "INPR"),
    ("IFPI", "INPI"),
    ("IFPS", "INPS"),
];

/// The opcode registry.
#[derive(Debug)]
pub struct InstructionSet {
    by_id: HashMap<u16, &'static OpcodeInfo>,
    by_name: HashMap<&'static str, &'static OpcodeInfo>,
}

impl InstructionSet {
    fn build() -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for info in OPCODES {
            let clash = by_id.insert(info.id, info);
            debug_assert!(clash.is_none(), "duplicate opcode id {}", info.id);
            by_name.insert(info.name, info);
        }
        InstructionSet { by_id, by_name }
    }

    pub fn info_by_id(&self, id: u16) -> Option<&'static OpcodeInfo> {
        self.by_id.get(&id).copied()
    }

    /// Lookup by upper-cased mnemonic.
    pub fn info_by_name(&self, name: &str) -> Option<&'static OpcodeInfo> {
        self.by_name.get(name).copied()
    }

    pub fn is_opcode(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn opcode_id(&self, name: &str) -> Option<u16> {
        self.info_by_name(name).map(|i| i.id)
    }
}

/// The process-wide instruction set. Built on first use; immutable after.
pub fn registry() -> &'static InstructionSet {
    static REGISTRY: OnceLock<InstructionSet> = OnceLock::new();
    REGISTRY.get_or_init(InstructionSet::build)
}

/// True for the predicate opcodes that gate the following instruction.
pub fn is_conditional(name: &str) -> bool {
    CONDITIONAL_PAIRS
        .iter()
        .any(|(p, n)| *p == name || *n == name)
}

/// Negated form of a conditional opcode (`IFR` ↔ `INR`, ...).
pub fn negate_conditional(name: &str) -> Option<&'static str> {
    for (positive, negative) in CONDITIONAL_PAIRS {
        if *positive == name {
            return Some(negative);
        }
        if *negative == name {
            return Some(positive);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_both_directions() {
        let isa = registry();
        let seti = isa.info_by_name("SETI").expect("SETI is registered");
        assert_eq!(isa.info_by_id(seti.id).expect("id resolves").name, "SETI");
        assert!(isa.is_opcode("FORK"));
        assert!(!isa.is_opcode("FROB"));
    }

    #[test]
    fn test_cell_length_counts_vector_components() {
        let isa = registry();
        // SETI: opcode + register + literal
        assert_eq!(isa.info_by_name("SETI").expect("known").cell_length(2), 3);
        // JMPI in 3 dimensions: opcode + 3 vector cells
        assert_eq!(isa.info_by_name("JMPI").expect("known").cell_length(3), 4);
        // FORK in 2 dimensions: opcode + register + 2 + 2
        assert_eq!(isa.info_by_name("FORK").expect("known").cell_length(2), 6);
    }

    #[test]
    fn test_conditional_negation_is_symmetric() {
        assert_eq!(negate_conditional("IFR"), Some("INR"));
        assert_eq!(negate_conditional("INPI"), Some("IFPI"));
        assert_eq!(negate_conditional("JMPI"), None);
        for (p, n) in super::CONDITIONAL_PAIRS {
            assert!(is_conditional(p) && is_conditional(n));
        }
    }

    #[test]
    fn test_nop_is_opcode_zero() {
        // The empty cell (CODE:0) must plan as NOP.
        assert_eq!(registry().info_by_id(0).expect("known").name, "NOP");
    }
}
