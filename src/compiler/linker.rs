//! # Linker
//!
//! Patches label placeholders with relative vectors (target minus referencing
//! site, component per cell) and finalizes the immutable [`ProgramArtifact`].

use crate::compiler::artifact::ProgramArtifact;
use crate::compiler::diagnostics::Diagnostics;
use crate::compiler::layout::LayoutResult;
use crate::compiler::semantics::Analysis;
use crate::runtime::coords;
use crate::runtime::molecule::{Molecule, MoleculeType};
use std::collections::HashMap;
use tracing::debug;

/// Resolve every pending label reference and assemble the artifact.
///
/// Returns `None` when labels stay unresolved; the diagnostics carry the
/// details and the driver surfaces them as a failed phase.
pub fn link(
    program_id: &str,
    mut layout: LayoutResult,
    sources: HashMap<String, Vec<String>>,
    analysis: &Analysis,
    diags: &mut Diagnostics,
) -> Option<ProgramArtifact> {
    let unresolved = std::mem::take(&mut layout.unresolved);
    for reference in unresolved {
        let Some(target_address) = layout.label_to_address.get(&reference.label).copied() else {
            diags.error(
                format!("unresolved label '{}' at link time", reference.label),
                reference.source,
            );
            continue;
        };

        let target = layout.linear_address_to_coord[&target_address].clone();
        let site = layout.linear_address_to_coord[&reference.site_address].clone();
        let relative = coords::sub(&target, &site);

        for (component, cell_address) in relative.iter().zip(&reference.cell_addresses) {
            let coord = layout.linear_address_to_coord[cell_address].clone();
            layout
                .machine_code_layout
                .insert(coord, Molecule::new(MoleculeType::Data, *component));
        }
    }

    if diags.has_errors() {
        return None;
    }

    debug!(program = program_id, "link finished");
    Some(ProgramArtifact {
        program_id: program_id.to_string(),
        sources,
        machine_code_layout: layout.machine_code_layout,
        initial_world_objects: layout.initial_world_objects,
        source_map: layout.source_map,
        call_site_bindings: layout.call_site_bindings,
        relative_coord_to_linear_address: layout.coord_to_linear_address,
        linear_address_to_coord: layout.linear_address_to_coord,
        label_address_to_name: layout.label_address_to_name,
        register_alias_map: analysis.register_alias_map.clone(),
        proc_name_to_param_names: analysis.proc_params.clone(),
    })
}
