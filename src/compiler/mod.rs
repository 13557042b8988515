//! # Compiler
//!
//! The multi-file assembler. Source text flows through the phases in order:
//!
//! ```text
//! Source Text
//!     ↓
//! [Lexer]            → tokens
//!     ↓
//! [Preprocessor]     → include expansion, required units
//!     ↓
//! [Parser]           → AST
//!     ↓
//! [Semantic Analyzer]→ scope tree, aliases, signature checks
//!     ↓
//! [IR Generator]     → linear IR
//!     ↓
//! [Emission Rules]   → marshalled IR
//!     ↓
//! [Layout Engine]    → cells on relative coordinates
//!     ↓
//! [Linker]           → ProgramArtifact
//! ```
//!
//! Diagnostics accumulate across each phase; after every phase the driver
//! checks for errors and stops with [`CompileError::CompilationFailed`]
//! instead of feeding broken output downstream.

pub mod artifact;
pub mod ast;
pub mod diagnostics;
pub mod emission;
pub mod ir;
pub mod irgen;
pub mod layout;
pub mod lexer;
pub mod linker;
pub mod parser;
pub mod preprocessor;
pub mod semantics;
pub mod symbols;
pub mod token;

use crate::compiler::artifact::ProgramArtifact;
use crate::compiler::diagnostics::{Diagnostic, Diagnostics};
use crate::compiler::preprocessor::{FsResolver, SourceResolver};
use crate::runtime::environment::EnvironmentProperties;
use thiserror::Error;
use tracing::{debug, info};

/// Compile-pipeline failure, carrying the accumulated diagnostics.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("compilation failed during {phase}:\n{summary}")]
    CompilationFailed {
        phase: &'static str,
        summary: String,
        diagnostics: Vec<Diagnostic>,
    },
}

impl CompileError {
    fn from_phase(phase: &'static str, diags: &Diagnostics) -> Self {
        CompileError::CompilationFailed {
            phase,
            summary: diags.summary(),
            diagnostics: diags.entries().to_vec(),
        }
    }
}

/// Drives the full pipeline from an entry file to a linked artifact.
pub struct Compiler {
    env_props: EnvironmentProperties,
    resolver: Box<dyn SourceResolver>,
}

impl Compiler {
    /// Compiler reading sources from the filesystem.
    pub fn new(env_props: EnvironmentProperties) -> Self {
        Compiler {
            env_props,
            resolver: Box::new(FsResolver),
        }
    }

    /// Compiler with a custom source resolver (tests, embedded sources).
    pub fn with_resolver(
        env_props: EnvironmentProperties,
        resolver: Box<dyn SourceResolver>,
    ) -> Self {
        Compiler {
            env_props,
            resolver,
        }
    }

    /// Compile `entry_path` and everything it includes or requires.
    pub fn compile(
        &self,
        entry_path: &str,
        program_id: &str,
    ) -> Result<ProgramArtifact, CompileError> {
        let mut diags = Diagnostics::new();

        let preprocessed =
            preprocessor::preprocess(entry_path, self.resolver.as_ref(), &mut diags);
        gate("preprocessing", &diags)?;
        debug!(files = preprocessed.sources.len(), "preprocessing finished");

        let ast = parser::parse(preprocessed.tokens, &mut diags);
        gate("parsing", &diags)?;
        debug!(nodes = ast.len(), "parsing finished");

        let analysis =
            semantics::analyze(&ast, &preprocessed.unit_of_file, &self.env_props, &mut diags);
        gate("semantic analysis", &diags)?;

        let ir = irgen::generate(&ast, &analysis, &preprocessed.unit_of_file, &mut diags);
        gate("ir generation", &diags)?;

        let rewritten = emission::run_pipeline(ir, &mut diags);
        gate("emission", &diags)?;

        let laid_out = layout::layout(&rewritten, &self.env_props, &mut diags);
        gate("layout", &diags)?;

        let artifact = linker::link(
            program_id,
            laid_out,
            preprocessed.sources,
            &analysis,
            &mut diags,
        );
        match artifact {
            Some(artifact) if !diags.has_errors() => {
                info!(
                    program = program_id,
                    cells = artifact.machine_code_layout.len(),
                    "compilation finished"
                );
                Ok(artifact)
            }
            _ => Err(CompileError::from_phase("linking", &diags)),
        }
    }
}

fn gate(phase: &'static str, diags: &Diagnostics) -> Result<(), CompileError> {
    if diags.has_errors() {
        Err(CompileError::from_phase(phase, diags))
    } else {
        Ok(())
    }
}
