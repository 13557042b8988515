//! # Virtual Machine
//!
//! Per-organism stepping in two strictly separated phases. Planning reads the
//! cell under the instruction pointer and decodes a [`PlannedInstruction`]
//! without touching the environment; executing charges energy, runs the op,
//! and advances the instruction pointer. The split keeps planning read-only
//! so a future kernel can plan organisms in parallel.

use crate::runtime::environment::Environment;
use crate::runtime::isa::exec::{self, ExecutionContext, SpawnRequest};
use crate::runtime::isa::instruction::PlannedInstruction;
use crate::runtime::isa::{planner, registry};
use crate::runtime::molecule::MoleculeType;
use crate::runtime::organism::{InstructionExecutionData, Organism, ERROR_PENALTY_COST};
use tracing::trace;

/// When set, only `CODE` molecules are executable; data in the instruction
/// path is an organism-local failure.
pub const STRICT_TYPING: bool = true;

/// The two-phase per-organism stepper.
#[derive(Debug, Clone)]
pub struct VirtualMachine {
    error_penalty_cost: i64,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        VirtualMachine {
            error_penalty_cost: ERROR_PENALTY_COST,
        }
    }
}

impl VirtualMachine {
    pub fn new(error_penalty_cost: i64) -> Self {
        VirtualMachine { error_penalty_cost }
    }

    /// Plan phase: decode the instruction under the IP. Resets the organism's
    /// per-tick state; has no side effects on the environment.
    pub fn plan(&self, organism: &mut Organism, env: &Environment) -> PlannedInstruction {
        organism.reset_tick_state();
        let id = organism.id();

        let molecule = match env.get_molecule(organism.ip()) {
            Ok(m) => m,
            Err(_) => {
                organism.fail("instruction pointer outside the world");
                return PlannedInstruction::failure(id, 0, "instruction pointer outside the world");
            }
        };

        if STRICT_TYPING && !molecule.is_empty() && molecule.mtype() != MoleculeType::Code {
            organism.fail("illegal cell type");
            return PlannedInstruction::failure(id, 0, "illegal cell type");
        }

        let opcode_id = molecule.value() as u16;
        let Some(info) = registry().info_by_id(opcode_id) else {
            organism.fail("unknown opcode");
            return PlannedInstruction::failure(id, opcode_id, "unknown opcode");
        };

        let args = match planner::decode_args(info, organism, env) {
            Ok(args) => args,
            Err(reason) => {
                organism.fail(reason.clone());
                return PlannedInstruction::failure(id, opcode_id, reason);
            }
        };

        match planner::build_op(info, &args, organism, env) {
            Ok((op, targets)) => PlannedInstruction::new(
                id,
                opcode_id,
                op,
                info.cell_length(env.dims()),
                targets,
                args.raw,
            ),
            Err(reason) => {
                organism.fail(reason.clone());
                PlannedInstruction::failure(id, opcode_id, reason)
            }
        }
    }

    /// Execute phase: charge energy, run the op, settle liveness, advance IP.
    pub fn execute(
        &self,
        planned: &PlannedInstruction,
        organism: &mut Organism,
        env: &mut Environment,
        tick: u64,
        spawn_requests: &mut Vec<SpawnRequest>,
    ) {
        if organism.is_dead() {
            return;
        }

        let base_cost = registry()
            .info_by_id(planned.opcode_id)
            .map_or(1, |info| info.base_cost);
        let registers_before = organism.data_registers().to_vec();
        organism.deduct_energy(base_cost);

        {
            let mut ctx = ExecutionContext {
                organism,
                env,
                tick,
                spawn_requests,
                debug: false,
            };
            exec::execute_op(&planned.op, planned.length, &mut ctx);
        }

        let mut energy_cost = base_cost;
        if organism.instruction_failed() {
            organism.deduct_energy(self.error_penalty_cost);
            energy_cost += self.error_penalty_cost;
            if organism.logging_enabled() {
                trace!(
                    organism = organism.id(),
                    reason = organism.failure_reason().unwrap_or(""),
                    "instruction failed"
                );
            }
        }

        if organism.energy_depleted() {
            organism.kill("ran out of energy");
        }

        if !organism.skip_ip_advance() {
            let next = exec::advance(env, organism.ip(), organism.dv(), planned.length);
            organism.set_ip(next);
        }

        organism.record_execution(InstructionExecutionData {
            opcode_id: planned.opcode_id,
            raw_args: planned.raw_args.clone(),
            energy_cost,
            register_values_before: registers_before,
        });
    }
}
