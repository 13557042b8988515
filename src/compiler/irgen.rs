//! # IR Generation
//!
//! Lowers the analyzed AST into linear IR. Identifier operands collapse here:
//! register aliases become canonical registers, formal parameters become
//! `%FPR` registers in declaration order, constants inline their values, and
//! label or procedure references become qualified label refs for the linker.

use crate::compiler::ast::AstNode;
use crate::compiler::diagnostics::Diagnostics;
use crate::compiler::ir::{IrInstruction, IrItem, IrOperand};
use crate::compiler::semantics::{resolve_name, unit_of, Analysis};
use crate::compiler::symbols::{ConstValue, ScopeId, SymbolMeta, ROOT_SCOPE};
use crate::compiler::token::Token;
use crate::runtime::molecule::{Molecule, MoleculeType};
use std::collections::HashMap;
use tracing::debug;

/// Lower the AST into IR, using the scope tree built during analysis.
pub fn generate(
    ast: &[AstNode],
    analysis: &Analysis,
    units: &HashMap<String, String>,
    diags: &mut Diagnostics,
) -> Vec<IrItem> {
    let mut generator = IrGenerator {
        analysis,
        units,
        diags,
        scope_cursor: 0,
        items: Vec::new(),
    };
    generator.walk(ast, ROOT_SCOPE);
    debug!(items = generator.items.len(), "ir generation finished");
    generator.items
}

struct IrGenerator<'a> {
    analysis: &'a Analysis,
    units: &'a HashMap<String, String>,
    diags: &'a mut Diagnostics,
    scope_cursor: usize,
    items: Vec<IrItem>,
}

impl IrGenerator<'_> {
    fn enter_next_scope(&mut self) -> ScopeId {
        let id = self
            .analysis
            .scope_order
            .get(self.scope_cursor)
            .copied()
            .unwrap_or(ROOT_SCOPE);
        self.scope_cursor += 1;
        id
    }

    fn walk(&mut self, nodes: &[AstNode], scope: ScopeId) {
        for node in nodes {
            match node {
                AstNode::Label { name, source } => {
                    let qualified = self.qualified_label(name, scope);
                    self.items.push(IrItem::Label {
                        name: qualified,
                        source: source.clone(),
                    });
                }
                AstNode::Org { position, source } => {
                    if let AstNode::VectorLiteral { components, .. } = position.as_ref() {
                        self.items.push(IrItem::Org {
                            position: components.clone(),
                            source: source.clone(),
                        });
                    }
                }
                AstNode::Dir { direction, source } => {
                    if let AstNode::VectorLiteral { components, .. } = direction.as_ref() {
                        self.items.push(IrItem::Dir {
                            direction: components.clone(),
                            source: source.clone(),
                        });
                    }
                }
                AstNode::PushCtx { source } => self.items.push(IrItem::PushCtx {
                    source: source.clone(),
                }),
                AstNode::PopCtx { source } => self.items.push(IrItem::PopCtx {
                    source: source.clone(),
                }),
                AstNode::Place {
                    molecule,
                    components,
                    source,
                } => {
                    if let AstNode::TypedLiteral {
                        type_name, value, ..
                    } = molecule.as_ref()
                    {
                        if let Some(mtype) = MoleculeType::parse(&type_name.text) {
                            self.items.push(IrItem::Place {
                                molecule: Molecule::new(mtype, *value as i32),
                                components: components.clone(),
                                source: source.clone(),
                            });
                        }
                    }
                }
                AstNode::Scope { body, .. } => {
                    let child = self.enter_next_scope();
                    self.walk(body, child);
                }
                AstNode::Procedure(proc) => {
                    let meta = self.resolve_meta(&proc.name, scope);
                    let Some(SymbolMeta::Procedure { qualified, .. }) = meta else {
                        // analysis already reported the problem
                        self.enter_next_scope();
                        continue;
                    };
                    let ref_params: Vec<String> =
                        proc.ref_params().map(|p| p.name.upper()).collect();
                    let val_params: Vec<String> =
                        proc.val_params().map(|p| p.name.upper()).collect();

                    self.items.push(IrItem::Label {
                        name: qualified.clone(),
                        source: proc.source.clone(),
                    });
                    self.items.push(IrItem::ProcEnter {
                        name: qualified,
                        ref_params,
                        val_params,
                        source: proc.source.clone(),
                    });
                    let child = self.enter_next_scope();
                    self.walk(&proc.body, child);
                    self.items.push(IrItem::ProcExit {
                        source: proc.source.clone(),
                    });
                }
                AstNode::Instruction {
                    opcode,
                    operands,
                    ref_actuals,
                    val_actuals,
                    source,
                } => {
                    let mut instr = IrInstruction::new(
                        opcode.upper(),
                        self.convert_operands(operands, scope),
                        source.clone(),
                    );
                    instr.ref_operands = self.convert_operands(ref_actuals, scope);
                    instr.val_operands = self.convert_operands(val_actuals, scope);
                    self.items.push(IrItem::Instruction(instr));
                }
                // declarations with no layout footprint
                AstNode::Define { .. }
                | AstNode::Reg { .. }
                | AstNode::Require { .. }
                | AstNode::Import { .. } => {}
                _ => {}
            }
        }
    }

    fn convert_operands(&mut self, operands: &[AstNode], scope: ScopeId) -> Vec<IrOperand> {
        operands
            .iter()
            .map(|operand| self.convert_operand(operand, scope))
            .collect()
    }

    fn convert_operand(&mut self, operand: &AstNode, scope: ScopeId) -> IrOperand {
        match operand {
            AstNode::Register { name, .. } => IrOperand::Register(name.upper()),
            AstNode::NumberLiteral { value, .. } => IrOperand::Immediate(*value),
            AstNode::TypedLiteral {
                type_name, value, ..
            } => match MoleculeType::parse(&type_name.text) {
                Some(mtype) => IrOperand::TypedImmediate(mtype, *value),
                None => IrOperand::Immediate(*value),
            },
            AstNode::VectorLiteral { components, .. } => IrOperand::Vector(components.clone()),
            AstNode::LabelRef { name, .. } => match self.resolve_meta(name, scope) {
                Some(SymbolMeta::RegisterAlias(text)) => IrOperand::Register(text),
                Some(SymbolMeta::Variable { fpr_index }) => {
                    IrOperand::Register(format!("%FPR{fpr_index}"))
                }
                Some(SymbolMeta::Constant(ConstValue::Number(v))) => IrOperand::Immediate(v),
                Some(SymbolMeta::Constant(ConstValue::Typed(mtype, v))) => {
                    IrOperand::TypedImmediate(mtype, v)
                }
                Some(SymbolMeta::Constant(ConstValue::Vector(v))) => IrOperand::Vector(v),
                Some(
                    SymbolMeta::Label { qualified }
                    | SymbolMeta::Procedure { qualified, .. }
                    | SymbolMeta::ProcedureRef { qualified, .. },
                ) => IrOperand::LabelRef(qualified),
                Some(SymbolMeta::None) | None => {
                    // analysis reported it; keep lowering with a placeholder
                    IrOperand::Immediate(0)
                }
            },
            other => {
                self.diags.error(
                    "unsupported operand in this position",
                    other.source().clone(),
                );
                IrOperand::Immediate(0)
            }
        }
    }

    fn resolve_meta(&mut self, name: &Token, scope: ScopeId) -> Option<SymbolMeta> {
        let unit = unit_of(self.units, &name.source.file);
        resolve_name(&self.analysis.table, scope, unit, &name.text)
            .ok()
            .map(|s| s.meta.clone())
    }

    fn qualified_label(&mut self, name: &Token, scope: ScopeId) -> String {
        match self.resolve_meta(name, scope) {
            Some(SymbolMeta::Label { qualified }) => qualified,
            _ => name.upper(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{lexer, parser, semantics};
    use crate::runtime::environment::EnvironmentProperties;

    fn lower(source: &str) -> (Vec<IrItem>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = lexer::tokenize(source, "test.s", &mut diags);
        let ast = parser::parse(tokens, &mut diags);
        let props = EnvironmentProperties::new(vec![32, 32], true);
        let units = HashMap::new();
        let analysis = semantics::analyze(&ast, &units, &props, &mut diags);
        let ir = generate(&ast, &analysis, &units, &mut diags);
        (ir, diags)
    }

    fn instruction_opcodes(ir: &[IrItem]) -> Vec<&str> {
        ir.iter()
            .filter_map(IrItem::as_instruction)
            .map(|i| i.opcode.as_str())
            .collect()
    }

    #[test]
    fn test_alias_and_constant_lowering() {
        let source = ".REG CTR %DR2\n.DEFINE STEP 3\n  ADDI CTR STEP\n";
        let (ir, diags) = lower(source);
        assert!(!diags.has_errors(), "{}", diags.summary());
        let instr = ir
            .iter()
            .find_map(IrItem::as_instruction)
            .expect("one instruction");
        assert_eq!(
            instr.operands,
            vec![
                IrOperand::Register("%DR2".to_string()),
                IrOperand::Immediate(3),
            ]
        );
    }

    #[test]
    fn test_labels_qualify_per_scope() {
        let source = "L:\n.SCOPE S\nL:\n  JMPI L\n.ENDS\n  JMPI L\n";
        let (ir, diags) = lower(source);
        assert!(!diags.has_errors(), "{}", diags.summary());
        let labels: Vec<&str> = ir
            .iter()
            .filter_map(|item| match item {
                IrItem::Label { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["test.s::L", "test.s::S::L"]);

        let jumps: Vec<&IrOperand> = ir
            .iter()
            .filter_map(IrItem::as_instruction)
            .map(|i| &i.operands[0])
            .collect();
        assert_eq!(jumps[0], &IrOperand::LabelRef("test.s::S::L".to_string()));
        assert_eq!(jumps[1], &IrOperand::LabelRef("test.s::L".to_string()));
    }

    #[test]
    fn test_procedure_lowering_brackets_body() {
        let source = ".PROC INC REF X\n  ADDI X 1\n  RET\n.ENDP\n";
        let (ir, diags) = lower(source);
        assert!(!diags.has_errors(), "{}", diags.summary());

        assert!(matches!(&ir[0], IrItem::Label { name, .. } if name == "test.s::INC"));
        let IrItem::ProcEnter {
            name, ref_params, ..
        } = &ir[1]
        else {
            panic!("expected ProcEnter, got {:?}", ir[1]);
        };
        assert_eq!(name, "test.s::INC");
        assert_eq!(ref_params, &vec!["X".to_string()]);
        assert!(matches!(ir.last(), Some(IrItem::ProcExit { .. })));

        // formal parameter lowered to its formal register
        let instr = ir
            .iter()
            .filter_map(IrItem::as_instruction)
            .find(|i| i.opcode == "ADDI")
            .expect("body instruction");
        assert_eq!(instr.operands[0], IrOperand::Register("%FPR0".to_string()));
    }

    #[test]
    fn test_call_carries_actuals() {
        let source = ".PROC INC REF X\n  RET\n.ENDP\n  CALL INC REF %DR1\n";
        let (ir, diags) = lower(source);
        assert!(!diags.has_errors(), "{}", diags.summary());
        let call = ir
            .iter()
            .filter_map(IrItem::as_instruction)
            .find(|i| i.opcode == "CALL")
            .expect("call instruction");
        assert_eq!(call.operands[0], IrOperand::LabelRef("test.s::INC".to_string()));
        assert_eq!(
            call.ref_operands,
            vec![IrOperand::Register("%DR1".to_string())]
        );
    }

    #[test]
    fn test_structural_directives_survive() {
        let source = ".ORG 5|5\n.DIR 0|1\n  NOP\n";
        let (ir, diags) = lower(source);
        assert!(!diags.has_errors(), "{}", diags.summary());
        assert_eq!(instruction_opcodes(&ir), vec!["NOP"]);
        assert!(matches!(&ir[0], IrItem::Org { position, .. } if position == &vec![5, 5]));
        assert!(matches!(&ir[1], IrItem::Dir { direction, .. } if direction == &vec![0, 1]));
    }
}
