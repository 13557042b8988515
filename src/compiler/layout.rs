//! # Layout Engine
//!
//! Walks the rewritten IR with a movable cursor and emits machine-code
//! molecules onto relative N-dimensional coordinates. Every emitted cell
//! receives the next linear address; labels bind the address of the next
//! opcode cell. Placements expand their per-axis components into world
//! objects. Layout is a pure function of the IR and the environment
//! properties: no registries are consulted beyond the immutable opcode table.

use crate::compiler::ast::PlacementComponent;
use crate::compiler::diagnostics::{Diagnostics, SourceInfo};
use crate::compiler::ir::{IrInstruction, IrItem, IrOperand};
use crate::runtime::coords::{self, Coord};
use crate::runtime::environment::EnvironmentProperties;
use crate::runtime::isa::{self, ArgType};
use crate::runtime::molecule::{Molecule, MoleculeType};
use crate::runtime::organism::RegisterRef;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A label reference awaiting link-time resolution. The placeholder cells
/// hold the relative vector once the linker patches them.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedRef {
    pub label: String,
    /// Address of the referencing instruction's opcode cell
    pub site_address: usize,
    /// Addresses of the placeholder cells, one per dimension
    pub cell_addresses: Vec<usize>,
    pub source: SourceInfo,
}

/// Everything layout produces; the linker turns this into the artifact.
#[derive(Debug, Default)]
pub struct LayoutResult {
    pub machine_code_layout: HashMap<Coord, Molecule>,
    pub initial_world_objects: HashMap<Coord, Molecule>,
    pub linear_address_to_coord: BTreeMap<usize, Coord>,
    pub coord_to_linear_address: HashMap<Coord, usize>,
    pub label_to_address: HashMap<String, usize>,
    pub label_address_to_name: BTreeMap<usize, String>,
    pub source_map: BTreeMap<usize, SourceInfo>,
    pub call_site_bindings: BTreeMap<usize, Vec<i32>>,
    pub unresolved: Vec<UnresolvedRef>,
}

/// Lay the IR out onto relative coordinates.
pub fn layout(
    items: &[IrItem],
    env_props: &EnvironmentProperties,
    diags: &mut Diagnostics,
) -> LayoutResult {
    let dims = env_props.dims();
    let mut engine = LayoutEngine {
        env_props,
        dims,
        position: vec![0; dims],
        direction: unit_x(dims),
        include_stack: Vec::new(),
        pending_labels: Vec::new(),
        next_address: 0,
        result: LayoutResult::default(),
        diags,
    };

    for item in items {
        engine.place_item(item);
    }
    engine.finish()
}

fn unit_x(dims: usize) -> Coord {
    let mut v = vec![0; dims];
    if dims > 0 {
        v[0] = 1;
    }
    v
}

struct LayoutEngine<'a> {
    env_props: &'a EnvironmentProperties,
    dims: usize,
    position: Coord,
    direction: Coord,
    include_stack: Vec<(Coord, Coord)>,
    pending_labels: Vec<String>,
    next_address: usize,
    result: LayoutResult,
    diags: &'a mut Diagnostics,
}

impl LayoutEngine<'_> {
    fn place_item(&mut self, item: &IrItem) {
        match item {
            IrItem::Label { name, .. } => self.pending_labels.push(name.clone()),
            IrItem::Org { position, source } => {
                if let Some(coord) = self.to_coord(position, source) {
                    self.position = coord;
                }
            }
            IrItem::Dir { direction, source } => {
                if let Some(coord) = self.to_coord(direction, source) {
                    self.direction = coord;
                }
            }
            IrItem::PushCtx { .. } => {
                self.include_stack
                    .push((self.position.clone(), self.direction.clone()));
            }
            IrItem::PopCtx { source } => match self.include_stack.pop() {
                Some((position, direction)) => {
                    self.position = position;
                    self.direction = direction;
                }
                None => self
                    .diags
                    .warning("unmatched context restore", source.clone()),
            },
            IrItem::Place {
                molecule,
                components,
                source,
            } => self.place_objects(*molecule, components, source),
            IrItem::ProcEnter { source, .. } | IrItem::ProcExit { source } => {
                self.diags.error(
                    "procedure markers must be lowered before layout",
                    source.clone(),
                );
            }
            IrItem::Instruction(instr) => self.place_instruction(instr),
        }
    }

    fn to_coord(&mut self, components: &[i64], source: &SourceInfo) -> Option<Coord> {
        if components.len() != self.dims {
            self.diags.error(
                format!(
                    "vector has {} components, world has {} dimensions",
                    components.len(),
                    self.dims
                ),
                source.clone(),
            );
            return None;
        }
        Some(components.iter().map(|c| *c as i32).collect())
    }

    fn emit_cell(&mut self, molecule: Molecule, source: &SourceInfo) -> usize {
        let address = self.next_address;
        self.next_address += 1;
        self.result
            .machine_code_layout
            .insert(self.position.clone(), molecule);
        self.result
            .coord_to_linear_address
            .insert(self.position.clone(), address);
        self.result
            .linear_address_to_coord
            .insert(address, self.position.clone());
        self.result.source_map.insert(address, source.clone());
        self.position = coords::add(&self.position, &self.direction);
        address
    }

    fn place_instruction(&mut self, instr: &IrInstruction) {
        let Some(info) = isa::registry().info_by_name(&instr.opcode) else {
            self.diags.error(
                format!("unknown opcode '{}' reached layout", instr.opcode),
                instr.source.clone(),
            );
            return;
        };

        let opcode_address = self.next_address;
        for label in self.pending_labels.drain(..) {
            self.result
                .label_to_address
                .insert(label.clone(), opcode_address);
            self.result
                .label_address_to_name
                .insert(opcode_address, label);
        }

        self.emit_cell(
            Molecule::new(MoleculeType::Code, i32::from(info.id)),
            &instr.source,
        );

        for (arg_type, operand) in info.args.iter().zip(&instr.operands) {
            self.place_operand(*arg_type, operand, opcode_address, &instr.source);
        }

        if instr.opcode == "CALL" {
            if let Some(bindings) = &instr.call_bindings {
                self.result
                    .call_site_bindings
                    .insert(opcode_address, bindings.clone());
            }
        }
    }

    fn place_operand(
        &mut self,
        arg_type: ArgType,
        operand: &IrOperand,
        site_address: usize,
        source: &SourceInfo,
    ) {
        match (arg_type, operand) {
            (ArgType::Register | ArgType::LocationRegister, IrOperand::Register(name)) => {
                match RegisterRef::parse(name) {
                    Some(reg) => {
                        self.emit_cell(Molecule::new(MoleculeType::Data, reg.encode()), source);
                    }
                    None => {
                        self.diags
                            .error(format!("malformed register '{name}'"), source.clone());
                        self.emit_cell(Molecule::empty(), source);
                    }
                }
            }
            (ArgType::Immediate | ArgType::Literal, IrOperand::Immediate(v)) => {
                self.emit_cell(Molecule::new(MoleculeType::Data, *v as i32), source);
            }
            (ArgType::Immediate | ArgType::Literal, IrOperand::TypedImmediate(mtype, v)) => {
                self.emit_cell(Molecule::new(*mtype, *v as i32), source);
            }
            (ArgType::Vector | ArgType::Label, IrOperand::Vector(components)) => {
                if components.len() != self.dims {
                    self.diags.error(
                        format!(
                            "vector has {} components, world has {} dimensions",
                            components.len(),
                            self.dims
                        ),
                        source.clone(),
                    );
                }
                for index in 0..self.dims {
                    let value = components.get(index).copied().unwrap_or(0);
                    self.emit_cell(Molecule::new(MoleculeType::Data, value as i32), source);
                }
            }
            (ArgType::Vector | ArgType::Label, IrOperand::LabelRef(label)) => {
                let mut cell_addresses = Vec::with_capacity(self.dims);
                for _ in 0..self.dims {
                    cell_addresses.push(self.emit_cell(Molecule::empty(), source));
                }
                self.result.unresolved.push(UnresolvedRef {
                    label: label.clone(),
                    site_address,
                    cell_addresses,
                    source: source.clone(),
                });
            }
            (_, other) => {
                self.diags.error(
                    format!("operand {other:?} does not fit its argument slot"),
                    source.clone(),
                );
                self.emit_cell(Molecule::empty(), source);
            }
        }
    }

    fn place_objects(
        &mut self,
        molecule: Molecule,
        components: &[PlacementComponent],
        source: &SourceInfo,
    ) {
        if components.len() != self.dims {
            self.diags.error(
                format!(
                    "placement has {} components, world has {} dimensions",
                    components.len(),
                    self.dims
                ),
                source.clone(),
            );
            return;
        }

        // scalar and range components are relative to the region base; a
        // wildcard spans its whole axis
        let base = self
            .include_stack
            .last()
            .map_or_else(|| self.position.clone(), |(position, _)| position.clone());

        let mut axes: Vec<Vec<i32>> = Vec::with_capacity(self.dims);
        for (axis, component) in components.iter().enumerate() {
            let values = match component {
                PlacementComponent::Scalar(c) => vec![base[axis] + *c as i32],
                PlacementComponent::Range(lo, hi) => {
                    if lo > hi {
                        self.diags
                            .warning("empty placement range", source.clone());
                    }
                    (*lo..=*hi).map(|v| base[axis] + v as i32).collect()
                }
                PlacementComponent::Wildcard => {
                    (0..self.env_props.shape[axis] as i32).collect()
                }
            };
            axes.push(values);
        }

        let mut indices = vec![0usize; self.dims];
        if axes.iter().any(Vec::is_empty) {
            return;
        }
        loop {
            let coord: Coord = indices
                .iter()
                .enumerate()
                .map(|(axis, i)| axes[axis][*i])
                .collect();
            if !self.env_props.toroidal
                && coord
                    .iter()
                    .zip(&self.env_props.shape)
                    .any(|(c, d)| *c < 0 || *c as usize >= *d)
            {
                self.diags.error(
                    format!("placement {coord:?} is outside the bounded world"),
                    source.clone(),
                );
                return;
            }
            self.result.initial_world_objects.insert(coord, molecule);

            let mut axis = self.dims;
            loop {
                if axis == 0 {
                    return;
                }
                axis -= 1;
                indices[axis] += 1;
                if indices[axis] < axes[axis].len() {
                    break;
                }
                indices[axis] = 0;
            }
        }
    }

    fn finish(mut self) -> LayoutResult {
        // labels at the very end bind one past the last emitted cell
        if !self.pending_labels.is_empty() {
            let address = self.next_address;
            self.result
                .linear_address_to_coord
                .entry(address)
                .or_insert_with(|| self.position.clone());
            for label in self.pending_labels.drain(..) {
                self.result
                    .label_to_address
                    .insert(label.clone(), address);
                self.result.label_address_to_name.insert(address, label);
            }
        }
        debug!(
            cells = self.result.machine_code_layout.len(),
            objects = self.result.initial_world_objects.len(),
            labels = self.result.label_to_address.len(),
            "layout finished"
        );
        self.result
    }
}
