//! # Instruction Planning
//!
//! Reads an opcode's argument cells from the environment and builds the
//! concrete [`PlannedOp`]. Planning is read-only on the environment; any
//! malformed argument degrades to a planned failure rather than an error.

use crate::runtime::coords::{self, Coord};
use crate::runtime::environment::Environment;
use crate::runtime::isa::instruction::{ArithOp, ArithRhs, CondPred, PlannedOp};
use crate::runtime::isa::{ArgType, OpcodeInfo};
use crate::runtime::molecule::Molecule;
use crate::runtime::organism::{Organism, RegisterClass, RegisterRef, NUM_DATA_POINTERS};

/// A decoded argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Register(RegisterRef),
    LocationRegister(RegisterRef),
    Immediate(i32),
    Literal(Molecule),
    Vector(Coord),
}

/// Decoded argument list plus the raw cell values behind it.
#[derive(Debug, Clone, Default)]
pub struct DecodedArgs {
    pub values: Vec<ArgValue>,
    pub raw: Vec<i64>,
}

/// Walk the argument cells after the opcode cell and decode them against the
/// signature. Returns a human-readable reason on failure.
pub fn decode_args(
    info: &OpcodeInfo,
    organism: &Organism,
    env: &Environment,
) -> Result<DecodedArgs, String> {
    let dims = env.dims();
    let mut decoded = DecodedArgs::default();
    let mut pos = organism.ip().clone();

    let next_cell = |pos: &mut Coord| -> Result<Molecule, String> {
        *pos = env.get_next_position(pos, organism.dv());
        env.get_molecule(pos)
            .map_err(|_| "argument cell out of bounds".to_string())
    };

    for arg in info.args {
        match arg {
            ArgType::Register | ArgType::LocationRegister => {
                let cell = next_cell(&mut pos)?;
                decoded.raw.push(i64::from(cell.value()));
                let reg = RegisterRef::decode(cell.value())
                    .ok_or_else(|| format!("invalid register id {}", cell.value()))?;
                if *arg == ArgType::LocationRegister {
                    if reg.class != RegisterClass::Location {
                        return Err(format!("{reg} is not a location register"));
                    }
                    decoded.values.push(ArgValue::LocationRegister(reg));
                } else {
                    decoded.values.push(ArgValue::Register(reg));
                }
            }
            ArgType::Immediate => {
                let cell = next_cell(&mut pos)?;
                decoded.raw.push(i64::from(cell.value()));
                decoded.values.push(ArgValue::Immediate(cell.value()));
            }
            ArgType::Literal => {
                let cell = next_cell(&mut pos)?;
                decoded.raw.push(i64::from(cell.raw()));
                decoded.values.push(ArgValue::Literal(cell));
            }
            ArgType::Vector | ArgType::Label => {
                let mut vector = Vec::with_capacity(dims);
                for _ in 0..dims {
                    let cell = next_cell(&mut pos)?;
                    decoded.raw.push(i64::from(cell.value()));
                    vector.push(cell.value());
                }
                decoded.values.push(ArgValue::Vector(vector));
            }
        }
    }
    Ok(decoded)
}

fn reg(args: &DecodedArgs, index: usize) -> RegisterRef {
    match &args.values[index] {
        ArgValue::Register(r) | ArgValue::LocationRegister(r) => *r,
        other => unreachable!("signature guarantees a register, got {other:?}"),
    }
}

fn imm(args: &DecodedArgs, index: usize) -> i32 {
    match &args.values[index] {
        ArgValue::Immediate(v) => *v,
        other => unreachable!("signature guarantees an immediate, got {other:?}"),
    }
}

fn lit(args: &DecodedArgs, index: usize) -> Molecule {
    match &args.values[index] {
        ArgValue::Literal(m) => *m,
        other => unreachable!("signature guarantees a literal, got {other:?}"),
    }
}

fn vec_arg(args: &DecodedArgs, index: usize) -> Coord {
    match &args.values[index] {
        ArgValue::Vector(v) => v.clone(),
        other => unreachable!("signature guarantees a vector, got {other:?}"),
    }
}

fn dp_index(args: &DecodedArgs, index: usize) -> Result<usize, String> {
    let raw = imm(args, index);
    if raw >= 0 && (raw as usize) < NUM_DATA_POINTERS {
        Ok(raw as usize)
    } else {
        Err(format!("invalid data pointer index {raw}"))
    }
}

/// Build the concrete operation for `info` from its decoded arguments.
///
/// Targets of environment-modifying ops are canonicalized here so conflict
/// resolution can group them as map keys.
pub fn build_op(
    info: &OpcodeInfo,
    args: &DecodedArgs,
    organism: &Organism,
    env: &Environment,
) -> Result<(PlannedOp, Vec<Coord>), String> {
    let ip_target = |offset: &Coord| env.normalize(&coords::add(organism.ip(), offset));

    let op = match info.name {
        "NOP" => PlannedOp::Nop,
        "SETI" => PlannedOp::SetImm { reg: reg(args, 0), value: lit(args, 1) },
        "SETR" => PlannedOp::SetReg { dst: reg(args, 0), src: reg(args, 1) },
        "SETV" => PlannedOp::SetVec { reg: reg(args, 0), vector: vec_arg(args, 1) },
        "ADDI" => arith(ArithOp::Add, args, true),
        "ADDR" => arith(ArithOp::Add, args, false),
        "SUBI" => arith(ArithOp::Sub, args, true),
        "SUBR" => arith(ArithOp::Sub, args, false),
        "MULI" => arith(ArithOp::Mul, args, true),
        "MULR" => arith(ArithOp::Mul, args, false),
        "DIVI" => arith(ArithOp::Div, args, true),
        "DIVR" => arith(ArithOp::Div, args, false),
        "MODI" => arith(ArithOp::Mod, args, true),
        "MODR" => arith(ArithOp::Mod, args, false),
        "PUSH" => PlannedOp::Push { reg: reg(args, 0) },
        "POP" => PlannedOp::Pop { reg: reg(args, 0) },
        "PUSI" => PlannedOp::PushImm { value: lit(args, 0) },
        "PUSV" => PlannedOp::PushVec { vector: vec_arg(args, 0) },
        "DUPS" => PlannedOp::DupStack,
        "SWPS" => PlannedOp::SwapStack,
        "DRPS" => PlannedOp::DropStack,
        "JMPI" => PlannedOp::JumpVec { delta: vec_arg(args, 0) },
        "JMPR" => PlannedOp::JumpReg { reg: reg(args, 0) },
        "CALL" => PlannedOp::Call { delta: vec_arg(args, 0) },
        "RET" => PlannedOp::Ret,
        "IFR" => cond(CondPred::RegEq(reg(args, 0), reg(args, 1)), false),
        "INR" => cond(CondPred::RegEq(reg(args, 0), reg(args, 1)), true),
        "IFPR" => cond(CondPred::RegGt(reg(args, 0), reg(args, 1)), false),
        "INPR" => cond(CondPred::RegGt(reg(args, 0), reg(args, 1)), true),
        "IFPI" => cond(CondPred::RegGtImm(reg(args, 0), imm(args, 1)), false),
        "INPI" => cond(CondPred::RegGtImm(reg(args, 0), imm(args, 1)), true),
        "IFPS" => cond(CondPred::RegEqStack(reg(args, 0)), false),
        "INPS" => cond(CondPred::RegEqStack(reg(args, 0)), true),
        "PEEK" => PlannedOp::Peek { reg: reg(args, 0), target: ip_target(&vec_arg(args, 1)) },
        "POKE" => {
            let target = ip_target(&vec_arg(args, 1));
            return Ok((
                PlannedOp::Poke { reg: reg(args, 0), target: target.clone() },
                vec![target],
            ));
        }
        "SCAN" => PlannedOp::Scan { reg: reg(args, 0), target: ip_target(&vec_arg(args, 1)) },
        "NRGY" => PlannedOp::ReadEnergy { reg: reg(args, 0) },
        "HRVS" => {
            let target = ip_target(&vec_arg(args, 0));
            return Ok((PlannedOp::Harvest { target: target.clone() }, vec![target]));
        }
        "FORK" => {
            let target = ip_target(&vec_arg(args, 1));
            return Ok((
                PlannedOp::Fork {
                    energy_reg: reg(args, 0),
                    target: target.clone(),
                    child_dv: vec_arg(args, 2),
                },
                vec![target],
            ));
        }
        "TRNI" => PlannedOp::TurnImm { dv: vec_arg(args, 0) },
        "TRNR" => PlannedOp::TurnReg { reg: reg(args, 0) },
        "LOCS" => PlannedOp::LocSave { lr: reg(args, 0).index },
        "LOCJ" => PlannedOp::LocJump { lr: reg(args, 0).index },
        "LPSH" => PlannedOp::LocPush { lr: reg(args, 0).index },
        "LPOP" => PlannedOp::LocPop { lr: reg(args, 0).index },
        "SEKI" => PlannedOp::SeekDp { dp: dp_index(args, 0)?, delta: vec_arg(args, 1) },
        "PEKD" => PlannedOp::PeekDp { reg: reg(args, 0), dp: dp_index(args, 1)? },
        "POKD" => {
            let dp = dp_index(args, 1)?;
            let target = organism.data_pointer(dp).clone();
            return Ok((PlannedOp::PokeDp { reg: reg(args, 0), dp }, vec![target]));
        }
        other => return Err(format!("unknown opcode {other}")),
    };
    Ok((op, Vec::new()))
}

fn arith(op: ArithOp, args: &DecodedArgs, immediate: bool) -> PlannedOp {
    let rhs = if immediate {
        ArithRhs::Imm(imm(args, 1))
    } else {
        ArithRhs::Reg(reg(args, 1))
    };
    PlannedOp::Arith {
        op,
        dst: reg(args, 0),
        rhs,
    }
}

fn cond(pred: CondPred, negated: bool) -> PlannedOp {
    PlannedOp::Cond { pred, negated }
}
