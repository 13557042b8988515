//! # Emission Rules
//!
//! A fixed, ordered pipeline of pure IR-to-IR rewrites that lowers the
//! calling convention into stack traffic:
//!
//! 1. conditional-call transform: a predicate guarding a `CALL` with actuals
//!    is negated and given a `JMPI` over the call site, so the marshalled
//!    sequence expanded by the next rule is skipped as one unit
//! 2. caller marshalling: actuals become pushes before the `CALL` and
//!    restore pops after it
//! 3. callee marshalling: `proc_enter` becomes the formal-register prologue;
//!    every `RET` gains the REF restore epilogue; `proc_exit` disappears
//!
//! Each rule is a pure function of its input list, and the pipeline is
//! idempotent: rewritten IR passes through unchanged.

use crate::compiler::diagnostics::{Diagnostics, SourceInfo};
use crate::compiler::ir::{IrInstruction, IrItem, IrOperand};
use crate::runtime::isa;
use crate::runtime::organism::RegisterRef;
use tracing::debug;

/// One rewrite over the whole item list.
pub trait EmissionRule {
    fn name(&self) -> &'static str;
    fn apply(&self, items: Vec<IrItem>, diags: &mut Diagnostics) -> Vec<IrItem>;
}

/// The fixed rule pipeline, in application order.
pub fn default_rules() -> Vec<Box<dyn EmissionRule>> {
    vec![
        Box::new(ConditionalCallRule),
        Box::new(CallerMarshallingRule),
        Box::new(CalleeMarshallingRule),
    ]
}

/// Run the default pipeline.
pub fn run_pipeline(items: Vec<IrItem>, diags: &mut Diagnostics) -> Vec<IrItem> {
    let mut current = items;
    for rule in default_rules() {
        let before = current.len();
        current = rule.apply(current, diags);
        debug!(rule = rule.name(), before, after = current.len(), "emission rule applied");
    }
    current
}

fn synth(opcode: &str, operands: Vec<IrOperand>, source: &SourceInfo) -> IrItem {
    IrItem::Instruction(IrInstruction::new(opcode, operands, source.clone()))
}

// ----------------------------------------------------------------------
// Rule 1: conditional CALL transform
// ----------------------------------------------------------------------

/// Rewrites `IF* ; CALL …actuals…` into the negated predicate plus a jump
/// over the (yet to be marshalled) call sequence:
///
/// ```text
/// IN* …
/// JMPI _safe_call_N
/// CALL …actuals…
/// _safe_call_N:
/// ```
pub struct ConditionalCallRule;

impl EmissionRule for ConditionalCallRule {
    fn name(&self) -> &'static str {
        "conditional-call"
    }

    fn apply(&self, items: Vec<IrItem>, _diags: &mut Diagnostics) -> Vec<IrItem> {
        let mut out = Vec::with_capacity(items.len());
        let mut counter = 0usize;
        let mut iter = items.into_iter().peekable();

        while let Some(item) = iter.next() {
            let guards_call = matches!(
                (&item, iter.peek()),
                (IrItem::Instruction(pred), Some(IrItem::Instruction(next)))
                    if isa::is_conditional(&pred.opcode)
                        && next.opcode == "CALL"
                        && next.has_actuals()
            );
            if !guards_call {
                out.push(item);
                continue;
            }

            let IrItem::Instruction(mut pred) = item else {
                unreachable!("guards_call checked the variant");
            };
            let call = iter.next().expect("peeked call item exists");
            let negated = isa::negate_conditional(&pred.opcode)
                .expect("is_conditional implies a negation exists");
            pred.opcode = negated.to_string();

            let safe_label = format!("_safe_call_{counter}");
            counter += 1;

            // the negated predicate now gates the jump over the call site
            let jmp = synth(
                "JMPI",
                vec![IrOperand::LabelRef(safe_label.clone())],
                call.source(),
            );
            out.push(IrItem::Instruction(pred));
            out.push(jmp);
            let label_source = call.source().clone();
            out.push(call);
            out.push(IrItem::Label {
                name: safe_label,
                source: label_source,
            });
        }
        out
    }
}

// ----------------------------------------------------------------------
// Rule 2: caller marshalling
// ----------------------------------------------------------------------

/// Expands a `CALL` with actuals into stack traffic:
///
/// ```text
/// push(val_n) … push(val_1)      # reverse order, consumed by the callee
/// PUSH ref_m … PUSH ref_1        # reverse order
/// CALL target
/// POP ref_1 … POP ref_m          # declaration order; first ref on top
/// ```
pub struct CallerMarshallingRule;

impl EmissionRule for CallerMarshallingRule {
    fn name(&self) -> &'static str {
        "caller-marshalling"
    }

    fn apply(&self, items: Vec<IrItem>, diags: &mut Diagnostics) -> Vec<IrItem> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let IrItem::Instruction(call) = item else {
                out.push(item);
                continue;
            };
            if call.opcode != "CALL" || !call.has_actuals() {
                out.push(IrItem::Instruction(call));
                continue;
            }

            let anchor = call.source.clone();

            for val in call.val_operands.iter().rev() {
                match val {
                    IrOperand::Immediate(_) | IrOperand::TypedImmediate(..) => {
                        out.push(synth("PUSI", vec![val.clone()], &anchor));
                    }
                    IrOperand::LabelRef(_) => {
                        out.push(synth("PUSV", vec![val.clone()], &anchor));
                    }
                    IrOperand::Register(_) => {
                        out.push(synth("PUSH", vec![val.clone()], &anchor));
                    }
                    IrOperand::Vector(_) => {
                        diags.error(
                            "vector literals cannot be passed by value",
                            call.source.clone(),
                        );
                    }
                }
            }

            let mut bindings = Vec::new();
            for reg in call.ref_operands.iter().rev() {
                match reg {
                    IrOperand::Register(name) => {
                        if let Some(r) = RegisterRef::parse(name) {
                            bindings.push(r.encode());
                        }
                        out.push(synth("PUSH", vec![reg.clone()], &anchor));
                    }
                    _ => diags.error(
                        "REF actuals must be registers",
                        call.source.clone(),
                    ),
                }
            }
            bindings.reverse();

            let restore: Vec<IrOperand> = call.ref_operands.clone();
            let mut marshalled = call;
            marshalled.ref_operands = Vec::new();
            marshalled.val_operands = Vec::new();
            marshalled.call_bindings = Some(bindings);
            out.push(IrItem::Instruction(marshalled));

            for reg in &restore {
                if matches!(reg, IrOperand::Register(_)) {
                    out.push(synth("POP", vec![reg.clone()], &anchor));
                }
            }
        }
        out
    }
}

// ----------------------------------------------------------------------
// Rule 3: callee marshalling
// ----------------------------------------------------------------------

/// Replaces `proc_enter` with the prologue (`POP %FPR0 … POP %FPRk-1`,
/// consuming the caller's pushes) and inserts the epilogue
/// (`PUSH %FPR(m-1) … PUSH %FPR0`, REF parameters only) before every `RET`
/// in the body. `proc_exit` is dropped.
pub struct CalleeMarshallingRule;

struct ProcRegion {
    ref_count: usize,
}

impl EmissionRule for CalleeMarshallingRule {
    fn name(&self) -> &'static str {
        "callee-marshalling"
    }

    fn apply(&self, items: Vec<IrItem>, _diags: &mut Diagnostics) -> Vec<IrItem> {
        let mut out = Vec::with_capacity(items.len());
        let mut regions: Vec<ProcRegion> = Vec::new();

        for item in items {
            match item {
                IrItem::ProcEnter {
                    ref_params,
                    val_params,
                    source,
                    ..
                } => {
                    let total = ref_params.len() + val_params.len();
                    let anchor = source;
                    for index in 0..total {
                        out.push(synth(
                            "POP",
                            vec![IrOperand::Register(format!("%FPR{index}"))],
                            &anchor,
                        ));
                    }
                    regions.push(ProcRegion {
                        ref_count: ref_params.len(),
                    });
                }
                IrItem::ProcExit { .. } => {
                    regions.pop();
                }
                IrItem::Instruction(instr) if instr.opcode == "RET" => {
                    if let Some(region) = regions.last() {
                        let anchor = instr.source.clone();
                        for index in (0..region.ref_count).rev() {
                            out.push(synth(
                                "PUSH",
                                vec![IrOperand::Register(format!("%FPR{index}"))],
                                &anchor,
                            ));
                        }
                    }
                    out.push(IrItem::Instruction(instr));
                }
                other => out.push(other),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::diagnostics::SourceInfo;

    fn src() -> SourceInfo {
        SourceInfo::new("test.s", 1, 1)
    }

    fn instr(opcode: &str, operands: Vec<IrOperand>) -> IrItem {
        IrItem::Instruction(IrInstruction::new(opcode, operands, src()))
    }

    fn reg(name: &str) -> IrOperand {
        IrOperand::Register(name.to_string())
    }

    fn opcodes(items: &[IrItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(IrItem::as_instruction)
            .map(|i| i.opcode.clone())
            .collect()
    }

    fn call_with(refs: Vec<IrOperand>, vals: Vec<IrOperand>) -> IrItem {
        let mut call = IrInstruction::new(
            "CALL",
            vec![IrOperand::LabelRef("test.s::P".to_string())],
            src(),
        );
        call.ref_operands = refs;
        call.val_operands = vals;
        IrItem::Instruction(call)
    }

    #[test]
    fn test_caller_marshalling_law() {
        // CALL P REF a1 a2 VAL b1 b2 =>
        // push(b2) push(b1) push(a2) push(a1) CALL pop(a1) pop(a2)
        let items = vec![call_with(
            vec![reg("%DR1"), reg("%DR2")],
            vec![IrOperand::Immediate(7), reg("%DR3")],
        )];
        let mut diags = Diagnostics::new();
        let out = run_pipeline(items, &mut diags);
        assert!(!diags.has_errors());

        let ops: Vec<(String, Option<&IrOperand>)> = out
            .iter()
            .filter_map(IrItem::as_instruction)
            .map(|i| (i.opcode.clone(), i.operands.first()))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("PUSH".to_string(), Some(&reg("%DR3"))),
                ("PUSI".to_string(), Some(&IrOperand::Immediate(7))),
                ("PUSH".to_string(), Some(&reg("%DR2"))),
                ("PUSH".to_string(), Some(&reg("%DR1"))),
                (
                    "CALL".to_string(),
                    Some(&IrOperand::LabelRef("test.s::P".to_string()))
                ),
                ("POP".to_string(), Some(&reg("%DR1"))),
                ("POP".to_string(), Some(&reg("%DR2"))),
            ]
        );
    }

    #[test]
    fn test_marshalled_call_records_bindings() {
        let items = vec![call_with(vec![reg("%DR1")], Vec::new())];
        let mut diags = Diagnostics::new();
        let out = run_pipeline(items, &mut diags);
        let call = out
            .iter()
            .filter_map(IrItem::as_instruction)
            .find(|i| i.opcode == "CALL")
            .expect("call survives");
        assert!(call.ref_operands.is_empty());
        let bindings = call.call_bindings.as_ref().expect("bindings recorded");
        assert_eq!(
            bindings,
            &vec![RegisterRef::parse("%DR1").expect("parses").encode()]
        );
    }

    #[test]
    fn test_callee_marshalling_law() {
        // REF X, VAL Y: prologue pops FPR0 and FPR1 in declaration order;
        // epilogue pushes only FPR0 (the REF) before RET
        let items = vec![
            IrItem::Label {
                name: "test.s::P".to_string(),
                source: src(),
            },
            IrItem::ProcEnter {
                name: "test.s::P".to_string(),
                ref_params: vec!["X".to_string()],
                val_params: vec!["Y".to_string()],
                source: src(),
            },
            instr("ADDI", vec![reg("%FPR0"), IrOperand::Immediate(1)]),
            instr("RET", vec![]),
            IrItem::ProcExit { source: src() },
        ];
        let mut diags = Diagnostics::new();
        let out = run_pipeline(items, &mut diags);
        assert_eq!(
            opcodes(&out),
            vec!["POP", "POP", "ADDI", "PUSH", "RET"]
        );
        let pops: Vec<&IrOperand> = out
            .iter()
            .filter_map(IrItem::as_instruction)
            .filter(|i| i.opcode == "POP")
            .map(|i| &i.operands[0])
            .collect();
        assert_eq!(pops, vec![&reg("%FPR0"), &reg("%FPR1")]);
        let push = out
            .iter()
            .filter_map(IrItem::as_instruction)
            .find(|i| i.opcode == "PUSH")
            .expect("epilogue push");
        assert_eq!(push.operands[0], reg("%FPR0"));
        assert!(!out.iter().any(|i| matches!(i, IrItem::ProcEnter { .. } | IrItem::ProcExit { .. })));
    }

    #[test]
    fn test_conditional_call_is_negated_and_jumped() {
        let items = vec![
            instr("IFR", vec![reg("%DR0"), reg("%DR1")]),
            call_with(vec![reg("%DR2")], Vec::new()),
        ];
        let mut diags = Diagnostics::new();
        let out = run_pipeline(items, &mut diags);
        assert_eq!(
            opcodes(&out),
            vec!["INR", "JMPI", "PUSH", "CALL", "POP"]
        );
        // the safe label lands after the restore pop
        assert!(matches!(
            out.last(),
            Some(IrItem::Label { name, .. }) if name == "_safe_call_0"
        ));
    }

    #[test]
    fn test_plain_conditional_is_untouched() {
        let items = vec![
            instr("IFR", vec![reg("%DR0"), reg("%DR1")]),
            instr("NOP", vec![]),
        ];
        let mut diags = Diagnostics::new();
        let out = run_pipeline(items, &mut diags);
        assert_eq!(opcodes(&out), vec!["IFR", "NOP"]);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let items = vec![
            IrItem::ProcEnter {
                name: "test.s::P".to_string(),
                ref_params: vec!["X".to_string()],
                val_params: Vec::new(),
                source: src(),
            },
            instr("RET", vec![]),
            IrItem::ProcExit { source: src() },
            instr("IFR", vec![reg("%DR0"), reg("%DR1")]),
            call_with(vec![reg("%DR1")], vec![IrOperand::Immediate(3)]),
        ];
        let mut diags = Diagnostics::new();
        let once = run_pipeline(items, &mut diags);
        let twice = run_pipeline(once.clone(), &mut diags);
        assert!(!diags.has_errors());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_vector_val_actual_is_rejected() {
        let items = vec![call_with(Vec::new(), vec![IrOperand::Vector(vec![1, 0])])];
        let mut diags = Diagnostics::new();
        run_pipeline(items, &mut diags);
        assert!(diags.has_errors());
    }
}
