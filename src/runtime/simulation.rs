//! # Simulation Kernel
//!
//! Orchestrates organisms over the environment: plan every living organism in
//! id order, arbitrate contested coordinates deterministically, execute the
//! winners, then admit organisms queued during the tick. Given identical
//! artifacts, placements, and external distributor seeds, the environment
//! state sequence is reproducible tick by tick.

use crate::compiler::artifact::ProgramArtifact;
use crate::runtime::coords::{self, Coord};
use crate::runtime::environment::{EnvError, Environment};
use crate::runtime::isa::exec::SpawnRequest;
use crate::runtime::isa::instruction::{ConflictStatus, PlannedInstruction};
use crate::runtime::organism::Organism;
use crate::runtime::vm::VirtualMachine;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Randomness source handed to external world-generation collaborators.
pub trait RandomProvider {
    fn next_f64(&mut self) -> f64;
    fn next_u32(&mut self, bound: u32) -> u32;
}

/// External energy world-generation hook, driven by the host between ticks.
pub trait EnergyDistributor {
    fn distribute(&mut self, env: &mut Environment, current_tick: u64);
}

/// Host-provided resolution of program ids to compiled artifacts.
pub trait ProgramArtifactStore: Send + Sync {
    fn get(&self, program_id: &str) -> Option<Arc<ProgramArtifact>>;
}

/// Simple shared artifact store.
#[derive(Default)]
pub struct InMemoryProgramStore {
    inner: RwLock<HashMap<String, Arc<ProgramArtifact>>>,
}

impl InMemoryProgramStore {
    pub fn new() -> Self {
        InMemoryProgramStore::default()
    }

    pub fn insert(&self, artifact: ProgramArtifact) {
        self.inner
            .write()
            .insert(artifact.program_id.clone(), Arc::new(artifact));
    }
}

impl ProgramArtifactStore for InMemoryProgramStore {
    fn get(&self, program_id: &str) -> Option<Arc<ProgramArtifact>> {
        self.inner.read().get(program_id).cloned()
    }
}

/// Kernel-level failures; organism-local failures never surface here.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("unknown program '{0}'")]
    UnknownProgram(String),

    #[error("placement outside the bounded world: {0}")]
    PlacementOutOfBounds(#[from] EnvError),
}

/// The simulation: environment, organisms, and the tick loop.
pub struct Simulation {
    env: Environment,
    vm: VirtualMachine,
    organisms: Vec<Organism>,
    next_organism_id: u64,
    tick: u64,
    pending_spawns: Vec<SpawnRequest>,
    store: Arc<dyn ProgramArtifactStore>,
    paused: bool,
    last_plans: Vec<PlannedInstruction>,
}

impl Simulation {
    pub fn new(env: Environment, store: Arc<dyn ProgramArtifactStore>) -> Self {
        Simulation {
            env,
            vm: VirtualMachine::default(),
            organisms: Vec::new(),
            next_organism_id: 1,
            tick: 0,
            pending_spawns: Vec::new(),
            store,
            paused: false,
            last_plans: Vec::new(),
        }
    }

    pub fn with_vm(mut self, vm: VirtualMachine) -> Self {
        self.vm = vm;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn organisms(&self) -> &[Organism] {
        &self.organisms
    }

    pub fn organism(&self, id: u64) -> Option<&Organism> {
        self.organisms.iter().find(|o| o.id() == id)
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Planned instructions of the most recent tick, in organism order.
    pub fn last_plans(&self) -> &[PlannedInstruction] {
        &self.last_plans
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    // ------------------------------------------------------------------
    // World setup
    // ------------------------------------------------------------------

    /// Embed a compiled program at `origin` and create its organism there.
    ///
    /// Machine-code cells become owned by the new organism; initial world
    /// objects stay unowned. On a bounded world every cell is range-checked
    /// before anything is written.
    pub fn spawn_program(
        &mut self,
        program_id: &str,
        origin: &[i32],
        energy: i64,
    ) -> Result<u64, SimulationError> {
        let artifact = self
            .store
            .get(program_id)
            .ok_or_else(|| SimulationError::UnknownProgram(program_id.to_string()))?;

        let id = self.next_organism_id;
        if !self.env.properties().toroidal {
            for relative in artifact
                .machine_code_layout
                .keys()
                .chain(artifact.initial_world_objects.keys())
            {
                let coord = coords::add(origin, relative);
                self.env.get_molecule(&coord)?;
            }
        }

        for (relative, molecule) in &artifact.machine_code_layout {
            let coord = coords::add(origin, relative);
            self.env.set_molecule(*molecule, &coord)?;
            self.env.set_owner(&coord, id)?;
        }
        for (relative, molecule) in &artifact.initial_world_objects {
            let coord = coords::add(origin, relative);
            self.env.set_molecule(*molecule, &coord)?;
        }

        let ip = self.env.normalize(origin);
        debug!(organism = id, program = program_id, ?ip, "spawned program");
        let organism = Organism::new(id, program_id, ip, energy, None, self.tick);
        self.next_organism_id += 1;
        self.organisms.push(organism);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// One full plan / resolve / execute / admit pass. A paused simulation
    /// does not start a tick.
    pub fn tick(&mut self) {
        if self.paused {
            return;
        }

        // Plan phase: living organisms in ascending id order.
        let mut plans: Vec<PlannedInstruction> = Vec::with_capacity(self.organisms.len());
        let env = &self.env;
        for organism in &mut self.organisms {
            if organism.is_dead() {
                continue;
            }
            plans.push(self.vm.plan(organism, env));
        }

        resolve_conflicts(&mut plans, self.organisms.len());

        // Execute phase, still in id order.
        for plan in &plans {
            if !plan.executed_in_tick {
                continue;
            }
            let Some(organism) = self
                .organisms
                .iter_mut()
                .find(|o| o.id() == plan.organism_id)
            else {
                continue;
            };
            self.vm.execute(
                plan,
                organism,
                &mut self.env,
                self.tick,
                &mut self.pending_spawns,
            );
        }

        // Admit organisms queued during this tick.
        let spawns: Vec<SpawnRequest> = self.pending_spawns.drain(..).collect();
        for request in spawns {
            let id = self.next_organism_id;
            self.next_organism_id += 1;
            let ip = self.env.normalize(&request.ip);
            let _ = self.env.set_owner(&ip, id);
            let mut child = Organism::new(
                id,
                request.program_id.clone(),
                ip,
                request.energy,
                Some(request.parent_id),
                self.tick + 1,
            );
            child.set_dv(request.dv.clone());
            trace!(child = id, parent = request.parent_id, "organism born");
            self.organisms.push(child);
        }

        self.last_plans = plans;
        self.tick += 1;
    }
}

/// Deterministic conflict arbitration over one tick's plans.
///
/// Plans arrive in ascending organism id order. Every contested coordinate is
/// won by the lowest id; an instruction claiming several coordinates must win
/// all of them or it is demoted to a loser everywhere.
fn resolve_conflicts(plans: &mut [PlannedInstruction], organism_count: usize) {
    // Group claims per canonical coordinate.
    let mut claims: HashMap<Coord, Vec<usize>> = HashMap::new();
    for (index, plan) in plans.iter_mut().enumerate() {
        if !plan.modifies_environment() {
            plan.executed_in_tick = true;
            plan.conflict_status = ConflictStatus::NotApplicable;
            continue;
        }
        if plan.targets.is_empty() {
            // No resolvable target: only a lone organism may proceed.
            if organism_count == 1 {
                plan.executed_in_tick = true;
                plan.conflict_status = ConflictStatus::WonExecution;
            } else {
                plan.executed_in_tick = false;
                plan.conflict_status = ConflictStatus::LostOtherReason;
            }
            continue;
        }
        for target in &plan.targets {
            claims.entry(target.clone()).or_default().push(index);
        }
    }

    // Per-coordinate pass: lowest id wins. Plans are in id order, so the
    // first claimant of a group is its winner.
    let mut won: Vec<usize> = vec![0; plans.len()];
    let mut lost: Vec<usize> = vec![0; plans.len()];
    for indices in claims.values() {
        let winner = indices
            .iter()
            .copied()
            .min_by_key(|i| plans[*i].organism_id)
            .expect("claim groups are non-empty");
        for index in indices {
            if *index == winner {
                won[*index] += 1;
            } else {
                lost[*index] += 1;
            }
        }
    }

    // Re-check: unanimity across all claimed coordinates.
    for (index, plan) in plans.iter_mut().enumerate() {
        if !plan.modifies_environment() || plan.targets.is_empty() {
            continue;
        }
        if lost[index] == 0 {
            plan.executed_in_tick = true;
            plan.conflict_status = ConflictStatus::WonExecution;
        } else if won[index] == 0 {
            plan.executed_in_tick = false;
            plan.conflict_status = ConflictStatus::LostLowerIdWon;
        } else {
            // Won some coordinates, lost others: unanimity requires losing all.
            plan.executed_in_tick = false;
            plan.conflict_status = ConflictStatus::LostOtherReason;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::isa::instruction::{PlannedInstruction, PlannedOp};
    use crate::runtime::organism::{RegisterClass, RegisterRef};

    fn poke_plan(organism_id: u64, targets: Vec<Coord>) -> PlannedInstruction {
        PlannedInstruction::new(
            organism_id,
            34,
            PlannedOp::Poke {
                reg: RegisterRef::new(RegisterClass::Data, 0),
                target: targets.first().cloned().unwrap_or_default(),
            },
            4,
            targets,
            Vec::new(),
        )
    }

    #[test]
    fn test_lowest_id_wins_contested_coordinate() {
        let mut plans = vec![
            poke_plan(1, vec![vec![5, 5]]),
            poke_plan(2, vec![vec![5, 5]]),
        ];
        resolve_conflicts(&mut plans, 2);
        assert!(plans[0].executed_in_tick);
        assert_eq!(plans[0].conflict_status, ConflictStatus::WonExecution);
        assert!(!plans[1].executed_in_tick);
        assert_eq!(plans[1].conflict_status, ConflictStatus::LostLowerIdWon);
    }

    #[test]
    fn test_non_modifying_always_executes() {
        let mut plans = vec![PlannedInstruction::new(
            7,
            0,
            PlannedOp::Nop,
            1,
            Vec::new(),
            Vec::new(),
        )];
        resolve_conflicts(&mut plans, 3);
        assert!(plans[0].executed_in_tick);
        assert_eq!(plans[0].conflict_status, ConflictStatus::NotApplicable);
    }

    #[test]
    fn test_partial_winner_is_demoted() {
        // Organism 1 claims (0,0); organism 2 claims (0,0) and (1,1).
        // Organism 2 wins (1,1) but loses (0,0), so it must lose everywhere.
        let mut plans = vec![
            poke_plan(1, vec![vec![0, 0]]),
            poke_plan(2, vec![vec![0, 0], vec![1, 1]]),
        ];
        resolve_conflicts(&mut plans, 2);
        assert!(plans[0].executed_in_tick);
        assert!(!plans[1].executed_in_tick);
        assert_eq!(plans[1].conflict_status, ConflictStatus::LostOtherReason);
    }

    #[test]
    fn test_targetless_modifier_needs_lone_organism() {
        let mut plans = vec![poke_plan(1, Vec::new())];
        resolve_conflicts(&mut plans, 1);
        assert!(plans[0].executed_in_tick);

        let mut plans = vec![poke_plan(1, Vec::new())];
        resolve_conflicts(&mut plans, 2);
        assert!(!plans[0].executed_in_tick);
        assert_eq!(plans[0].conflict_status, ConflictStatus::LostOtherReason);
    }
}
