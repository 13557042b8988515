//! # Evochora
//!
//! An artificial-life research core with two tightly coupled halves:
//!
//! 1. a multi-file **assembler** that compiles a spatial assembly language
//!    (modules, procedures, scopes, constants, register aliases, vector
//!    literals, world placements) into a position-independent
//!    [`ProgramArtifact`], and
//! 2. a **simulation kernel** that embeds compiled programs into an
//!    N-dimensional grid of typed molecules and advances concurrent organisms
//!    tick by tick under a deterministic plan / resolve / execute pipeline.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Source Text
//!     ↓
//! [Lexer]             → tokens
//!     ↓
//! [Preprocessor]      → includes expanded, required units collected
//!     ↓
//! [Parser]            → AST
//!     ↓
//! [Semantic Analyzer] → scope tree, cross-file aliases
//!     ↓
//! [IR Generator]      → linear IR
//!     ↓
//! [Emission Rules]    → calling convention lowered to stack traffic
//!     ↓
//! [Layout Engine]     → molecules on relative N-D coordinates
//!     ↓
//! [Linker]            → ProgramArtifact
//!     ↓
//! [Simulation]        → Environment + Organisms, one tick at a time
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evochora::compiler::Compiler;
//! use evochora::runtime::environment::{Environment, EnvironmentProperties};
//! use evochora::runtime::simulation::{InMemoryProgramStore, Simulation};
//! use std::sync::Arc;
//!
//! let props = EnvironmentProperties::new(vec![100, 100], true);
//! let artifact = Compiler::new(props.clone()).compile("organism.s", "org-1")?;
//!
//! let store = Arc::new(InMemoryProgramStore::new());
//! store.insert(artifact);
//!
//! let mut sim = Simulation::new(Environment::new(props), store);
//! sim.spawn_program("org-1", &[10, 10], 5_000)?;
//! sim.tick();
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `compiler::lexer` | Source text → tokens |
//! | `compiler::preprocessor` | Include expansion, required units |
//! | `compiler::parser` | Tokens → AST |
//! | `compiler::semantics` | Scopes, aliases, signature checks |
//! | `compiler::irgen` | AST → linear IR |
//! | `compiler::emission` | Calling-convention rewrites |
//! | `compiler::layout` | IR → cells on relative coordinates |
//! | `compiler::linker` | Label resolution, artifact assembly |
//! | `runtime::environment` | Molecule grid with ownership |
//! | `runtime::organism` | Registers, stacks, energy, liveness |
//! | `runtime::isa` | Opcode registry, planning, execution |
//! | `runtime::vm` | Two-phase per-organism stepper |
//! | `runtime::simulation` | Tick loop and conflict arbitration |

pub mod compiler;
pub mod config;
pub mod runtime;

// Re-export the data contract and the most-used entry points
pub use crate::compiler::artifact::{LinearizedProgramArtifact, ProgramArtifact};
pub use crate::compiler::diagnostics::{Diagnostic, Diagnostics, Severity, SourceInfo};
pub use crate::compiler::{CompileError, Compiler};
pub use crate::config::Config;
pub use crate::runtime::environment::{EnvError, Environment, EnvironmentProperties};
pub use crate::runtime::molecule::{Molecule, MoleculeType};
pub use crate::runtime::organism::Organism;
pub use crate::runtime::simulation::{
    EnergyDistributor, InMemoryProgramStore, ProgramArtifactStore, RandomProvider, Simulation,
    SimulationError,
};
