//! # Program Artifact
//!
//! The immutable contract between the compiler and the simulator: a
//! position-independent machine-code layout plus every map a debugger needs
//! to walk back from a cell to the source line that produced it.
//!
//! Coordinate-keyed maps do not survive text serialization directly, so
//! [`LinearizedProgramArtifact`] mirrors every map as an entry list; the two
//! forms round-trip losslessly.

use crate::compiler::diagnostics::SourceInfo;
use crate::runtime::coords::Coord;
use crate::runtime::molecule::Molecule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Compiled program, immutable after linking.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramArtifact {
    pub program_id: String,
    /// Original source text per file, split into lines
    pub sources: HashMap<String, Vec<String>>,
    /// Relative coordinate -> packed machine-code molecule
    pub machine_code_layout: HashMap<Coord, Molecule>,
    /// Relative coordinate -> world object placed at load time
    pub initial_world_objects: HashMap<Coord, Molecule>,
    /// Linear cell address -> source position of the emitting instruction
    pub source_map: BTreeMap<usize, SourceInfo>,
    /// CALL-site address -> encoded ids of the registers bound by marshalling
    pub call_site_bindings: BTreeMap<usize, Vec<i32>>,
    pub relative_coord_to_linear_address: HashMap<Coord, usize>,
    pub linear_address_to_coord: BTreeMap<usize, Coord>,
    pub label_address_to_name: BTreeMap<usize, String>,
    /// Register alias -> encoded register id
    pub register_alias_map: HashMap<String, i32>,
    /// Qualified procedure name -> formal parameter names
    pub proc_name_to_param_names: HashMap<String, Vec<String>>,
}

/// Serde-friendly twin of [`ProgramArtifact`]: every map flattened into an
/// entry list so coordinate keys survive JSON and friends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearizedProgramArtifact {
    pub program_id: String,
    pub sources: Vec<(String, Vec<String>)>,
    pub machine_code_layout: Vec<(Coord, Molecule)>,
    pub initial_world_objects: Vec<(Coord, Molecule)>,
    pub source_map: Vec<(usize, SourceInfo)>,
    pub call_site_bindings: Vec<(usize, Vec<i32>)>,
    pub relative_coord_to_linear_address: Vec<(Coord, usize)>,
    pub linear_address_to_coord: Vec<(usize, Coord)>,
    pub label_address_to_name: Vec<(usize, String)>,
    pub register_alias_map: Vec<(String, i32)>,
    pub proc_name_to_param_names: Vec<(String, Vec<String>)>,
}

impl ProgramArtifact {
    /// Flatten into the serializable form. Entries are emitted in sorted
    /// order so equal artifacts linearize identically.
    pub fn linearize(&self) -> LinearizedProgramArtifact {
        fn sorted<K: Ord + Clone, V: Clone>(map: &HashMap<K, V>) -> Vec<(K, V)> {
            let mut entries: Vec<(K, V)> =
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        }

        LinearizedProgramArtifact {
            program_id: self.program_id.clone(),
            sources: sorted(&self.sources),
            machine_code_layout: sorted(&self.machine_code_layout),
            initial_world_objects: sorted(&self.initial_world_objects),
            source_map: self
                .source_map
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            call_site_bindings: self
                .call_site_bindings
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            relative_coord_to_linear_address: sorted(&self.relative_coord_to_linear_address),
            linear_address_to_coord: self
                .linear_address_to_coord
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            label_address_to_name: self
                .label_address_to_name
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            register_alias_map: sorted(&self.register_alias_map),
            proc_name_to_param_names: sorted(&self.proc_name_to_param_names),
        }
    }
}

impl From<LinearizedProgramArtifact> for ProgramArtifact {
    fn from(lin: LinearizedProgramArtifact) -> Self {
        ProgramArtifact {
            program_id: lin.program_id,
            sources: lin.sources.into_iter().collect(),
            machine_code_layout: lin.machine_code_layout.into_iter().collect(),
            initial_world_objects: lin.initial_world_objects.into_iter().collect(),
            source_map: lin.source_map.into_iter().collect(),
            call_site_bindings: lin.call_site_bindings.into_iter().collect(),
            relative_coord_to_linear_address: lin
                .relative_coord_to_linear_address
                .into_iter()
                .collect(),
            linear_address_to_coord: lin.linear_address_to_coord.into_iter().collect(),
            label_address_to_name: lin.label_address_to_name.into_iter().collect(),
            register_alias_map: lin.register_alias_map.into_iter().collect(),
            proc_name_to_param_names: lin.proc_name_to_param_names.into_iter().collect(),
        }
    }
}
