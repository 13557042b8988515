//! # Instruction Execution
//!
//! Semantics of every opcode. Executing an op mutates the organism and, for
//! the environment-modifying ops that won arbitration, the world. Failures
//! are recorded on the organism; nothing here returns an error.

use crate::runtime::coords::{self, Coord};
use crate::runtime::environment::Environment;
use crate::runtime::isa::instruction::{ArithOp, ArithRhs, CondPred, PlannedOp};
use crate::runtime::isa::registry;
use crate::runtime::molecule::{Molecule, MoleculeType, MAX_MOLECULE_VALUE};
use crate::runtime::organism::{CallFrame, Organism, RegisterRef, RegisterValue};

/// Request to create a child organism, collected during execution and applied
/// by the kernel at end of tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub parent_id: u64,
    pub program_id: String,
    pub ip: Coord,
    pub dv: Coord,
    pub energy: i64,
}

/// Mutable state an executing instruction may touch.
pub struct ExecutionContext<'a> {
    pub organism: &'a mut Organism,
    pub env: &'a mut Environment,
    pub tick: u64,
    pub spawn_requests: &'a mut Vec<SpawnRequest>,
    pub debug: bool,
}

/// Execute one decoded operation. `length` is the instruction's own cell
/// count, needed by conditionals to step over the following instruction.
pub fn execute_op(op: &PlannedOp, length: usize, ctx: &mut ExecutionContext<'_>) {
    match op {
        PlannedOp::Nop => {}
        PlannedOp::Fail { reason } => ctx.organism.fail(reason.clone()),

        PlannedOp::SetImm { reg, value } => {
            ctx.organism.set_register(*reg, RegisterValue::Scalar(*value));
        }
        PlannedOp::SetReg { dst, src } => {
            let value = ctx.organism.get_register(*src);
            ctx.organism.set_register(*dst, value);
        }
        PlannedOp::SetVec { reg, vector } => {
            ctx.organism
                .set_register(*reg, RegisterValue::Vector(vector.clone()));
        }
        PlannedOp::Arith { op, dst, rhs } => exec_arith(*op, *dst, rhs, ctx.organism),

        PlannedOp::Push { reg } => {
            let value = ctx.organism.get_register(*reg);
            ctx.organism.push_data(value);
        }
        PlannedOp::Pop { reg } => {
            if let Some(value) = ctx.organism.pop_data() {
                ctx.organism.set_register(*reg, value);
            }
        }
        PlannedOp::PushImm { value } => {
            ctx.organism.push_data(RegisterValue::Scalar(*value));
        }
        PlannedOp::PushVec { vector } => {
            ctx.organism.push_data(RegisterValue::Vector(vector.clone()));
        }
        PlannedOp::DupStack => {
            match ctx.organism.peek_data().cloned() {
                Some(top) => {
                    ctx.organism.push_data(top);
                }
                None => ctx.organism.fail("data stack underflow"),
            }
        }
        PlannedOp::SwapStack => {
            let Some(a) = ctx.organism.pop_data() else {
                return;
            };
            match ctx.organism.pop_data() {
                Some(b) => {
                    ctx.organism.push_data(a);
                    ctx.organism.push_data(b);
                }
                // underflow already recorded; put the lone value back
                None => {
                    ctx.organism.push_data(a);
                }
            }
        }
        PlannedOp::DropStack => {
            ctx.organism.pop_data();
        }

        PlannedOp::JumpVec { delta } => jump_relative(ctx, delta),
        PlannedOp::JumpReg { reg } => match ctx.organism.get_register(*reg) {
            RegisterValue::Vector(delta) => jump_relative(ctx, &delta),
            RegisterValue::Scalar(_) => ctx.organism.fail(format!("{reg} does not hold a vector")),
        },
        PlannedOp::Call { delta } => {
            let return_ip = advance(ctx.env, ctx.organism.ip(), ctx.organism.dv(), length);
            if ctx.organism.push_call(CallFrame { return_ip }) {
                jump_relative(ctx, delta);
            }
        }
        PlannedOp::Ret => {
            if let Some(frame) = ctx.organism.pop_call() {
                ctx.organism.set_ip(frame.return_ip);
                ctx.organism.request_skip_ip_advance();
            }
        }

        PlannedOp::Cond { pred, negated } => exec_conditional(pred, *negated, length, ctx),

        PlannedOp::Peek { reg, target } => match ctx.env.get_molecule(target) {
            Ok(molecule) => ctx
                .organism
                .set_register(*reg, RegisterValue::Scalar(molecule)),
            Err(_) => ctx.organism.fail("peek outside the world"),
        },
        PlannedOp::Poke { reg, target } => {
            write_cell(ctx, *reg, target.clone());
        }
        PlannedOp::Scan { reg, target } => match ctx.env.get_molecule(target) {
            Ok(molecule) => ctx.organism.set_register(
                *reg,
                RegisterValue::Scalar(Molecule::new(MoleculeType::Data, molecule.mtype().tag())),
            ),
            Err(_) => ctx.organism.fail("scan outside the world"),
        },

        PlannedOp::ReadEnergy { reg } => {
            let value = ctx.organism.energy().min(i64::from(MAX_MOLECULE_VALUE)) as i32;
            ctx.organism
                .set_register(*reg, RegisterValue::Scalar(Molecule::new(MoleculeType::Data, value)));
        }
        PlannedOp::Harvest { target } => exec_harvest(ctx, target),
        PlannedOp::Fork {
            energy_reg,
            target,
            child_dv,
        } => exec_fork(ctx, *energy_reg, target, child_dv),

        PlannedOp::TurnImm { dv } => set_direction(ctx.organism, dv.clone()),
        PlannedOp::TurnReg { reg } => match ctx.organism.get_register(*reg) {
            RegisterValue::Vector(dv) => set_direction(ctx.organism, dv),
            RegisterValue::Scalar(_) => ctx.organism.fail(format!("{reg} does not hold a vector")),
        },

        PlannedOp::LocSave { lr } => {
            let ip = ctx.organism.ip().clone();
            ctx.organism.set_location_register(*lr, ip);
        }
        PlannedOp::LocJump { lr } => {
            let target = ctx.organism.location_register(*lr).clone();
            ctx.organism.set_ip(target);
            ctx.organism.request_skip_ip_advance();
        }
        PlannedOp::LocPush { lr } => {
            let coord = ctx.organism.location_register(*lr).clone();
            ctx.organism.push_location(coord);
        }
        PlannedOp::LocPop { lr } => {
            if let Some(coord) = ctx.organism.pop_location() {
                ctx.organism.set_location_register(*lr, coord);
            }
        }

        PlannedOp::SeekDp { dp, delta } => {
            let moved = ctx
                .env
                .normalize(&coords::add(ctx.organism.data_pointer(*dp), delta));
            ctx.organism.set_data_pointer(*dp, moved);
        }
        PlannedOp::PeekDp { reg, dp } => {
            let target = ctx.organism.data_pointer(*dp).clone();
            match ctx.env.get_molecule(&target) {
                Ok(molecule) => ctx
                    .organism
                    .set_register(*reg, RegisterValue::Scalar(molecule)),
                Err(_) => ctx.organism.fail("data pointer outside the world"),
            }
        }
        PlannedOp::PokeDp { reg, dp } => {
            let target = ctx.organism.data_pointer(*dp).clone();
            write_cell(ctx, *reg, target);
        }
    }
}

fn exec_arith(op: ArithOp, dst: RegisterRef, rhs: &ArithRhs, organism: &mut Organism) {
    let rhs_value = match rhs {
        ArithRhs::Imm(v) => RegisterValue::Scalar(Molecule::new(MoleculeType::Data, *v)),
        ArithRhs::Reg(reg) => organism.get_register(*reg),
    };
    let dst_value = organism.get_register(dst);

    match (dst_value, rhs_value) {
        (RegisterValue::Scalar(lhs), RegisterValue::Scalar(rhs)) => {
            let (a, b) = (i64::from(lhs.value()), i64::from(rhs.value()));
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div | ArithOp::Mod if b == 0 => {
                    organism.fail("division by zero");
                    return;
                }
                ArithOp::Div => a / b,
                ArithOp::Mod => a.rem_euclid(b),
            };
            // result keeps the destination's type tag
            organism.set_register(
                dst,
                RegisterValue::Scalar(Molecule::new(lhs.mtype(), result as i32)),
            );
        }
        (RegisterValue::Vector(lhs), RegisterValue::Vector(rhs))
            if matches!(op, ArithOp::Add | ArithOp::Sub) && lhs.len() == rhs.len() =>
        {
            let result = if op == ArithOp::Add {
                coords::add(&lhs, &rhs)
            } else {
                coords::sub(&lhs, &rhs)
            };
            organism.set_register(dst, RegisterValue::Vector(result));
        }
        _ => organism.fail("operand types do not match"),
    }
}

fn exec_conditional(pred: &CondPred, negated: bool, length: usize, ctx: &mut ExecutionContext<'_>) {
    let holds = match pred {
        CondPred::RegEq(a, b) => ctx.organism.get_register(*a) == ctx.organism.get_register(*b),
        CondPred::RegGt(a, b) => {
            let a = ctx.organism.get_register(*a).as_scalar();
            let b = ctx.organism.get_register(*b).as_scalar();
            match (a, b) {
                (Some(a), Some(b)) => a.value() > b.value(),
                _ => {
                    ctx.organism.fail("conditional needs scalar operands");
                    return;
                }
            }
        }
        CondPred::RegGtImm(a, imm) => match ctx.organism.get_register(*a).as_scalar() {
            Some(a) => a.value() > *imm,
            None => {
                ctx.organism.fail("conditional needs scalar operands");
                return;
            }
        },
        CondPred::RegEqStack(a) => match ctx.organism.peek_data().cloned() {
            Some(top) => top == ctx.organism.get_register(*a),
            None => {
                ctx.organism.fail("data stack underflow");
                return;
            }
        },
    };

    let execute_next = holds != negated;
    if !execute_next {
        // step the IP past the instruction that follows this one
        let next_ip = advance(ctx.env, ctx.organism.ip(), ctx.organism.dv(), length);
        let skipped_length = ctx
            .env
            .get_molecule(&next_ip)
            .ok()
            .filter(|m| m.mtype() == MoleculeType::Code)
            .and_then(|m| registry().info_by_id(m.value() as u16))
            .map_or(1, |info| info.cell_length(ctx.env.dims()));
        let landing = advance(ctx.env, &next_ip, ctx.organism.dv(), skipped_length);
        ctx.organism.set_ip(landing);
        ctx.organism.request_skip_ip_advance();
    }
}

fn exec_harvest(ctx: &mut ExecutionContext<'_>, target: &Coord) {
    match ctx.env.get_molecule(target) {
        Ok(molecule) if molecule.mtype() == MoleculeType::Energy => {
            let gain = i64::from(molecule.value()).max(0);
            ctx.organism.add_energy(gain);
            let id = ctx.organism.id();
            // the harvested cell becomes empty and owned
            let _ = ctx.env.set_molecule(Molecule::empty(), target);
            let _ = ctx.env.set_owner(target, id);
        }
        Ok(_) => ctx.organism.fail("no energy at target"),
        Err(_) => ctx.organism.fail("harvest outside the world"),
    }
}

fn exec_fork(ctx: &mut ExecutionContext<'_>, energy_reg: RegisterRef, target: &Coord, child_dv: &Coord) {
    let energy = match ctx.organism.get_register(energy_reg).as_scalar() {
        Some(m) => i64::from(m.value()),
        None => {
            ctx.organism.fail("fork energy must be scalar");
            return;
        }
    };
    if energy <= 0 || energy >= ctx.organism.energy() {
        ctx.organism.fail("insufficient energy to fork");
        return;
    }
    if !coords::is_unit_vector(child_dv) {
        ctx.organism.fail("fork direction must be a unit vector");
        return;
    }
    match ctx.env.get_molecule(target) {
        Ok(molecule) if molecule.is_empty() => {}
        Ok(_) => {
            ctx.organism.fail("fork target is occupied");
            return;
        }
        Err(_) => {
            ctx.organism.fail("fork outside the world");
            return;
        }
    }

    ctx.organism.deduct_energy(energy);
    ctx.spawn_requests.push(SpawnRequest {
        parent_id: ctx.organism.id(),
        program_id: ctx.organism.program_id().to_string(),
        ip: target.clone(),
        dv: child_dv.clone(),
        energy,
    });
}

fn write_cell(ctx: &mut ExecutionContext<'_>, reg: RegisterRef, target: Coord) {
    match ctx.organism.get_register(reg) {
        RegisterValue::Scalar(molecule) => {
            if ctx.env.set_molecule(molecule, &target).is_err() {
                ctx.organism.fail("write outside the world");
                return;
            }
            let id = ctx.organism.id();
            let _ = ctx.env.set_owner(&target, id);
        }
        RegisterValue::Vector(_) => ctx.organism.fail("cannot write a vector into a cell"),
    }
}

fn set_direction(organism: &mut Organism, dv: Coord) {
    if coords::is_unit_vector(&dv) {
        organism.set_dv(dv);
    } else {
        organism.fail("direction must be a unit vector");
    }
}

fn jump_relative(ctx: &mut ExecutionContext<'_>, delta: &Coord) {
    let target = ctx.env.normalize(&coords::add(ctx.organism.ip(), delta));
    ctx.organism.set_ip(target);
    ctx.organism.request_skip_ip_advance();
}

/// IP stepped `steps` cells along `dv`, canonicalized.
pub fn advance(env: &Environment, ip: &Coord, dv: &Coord, steps: usize) -> Coord {
    env.normalize(&coords::add(ip, &coords::scale(dv, steps as i32)))
}
