//! Calling-convention tests driven end to end: compiled REF/VAL calls are
//! executed in a live simulation and observed through organism state.

use evochora::compiler::preprocessor::MemoryResolver;
use evochora::compiler::Compiler;
use evochora::runtime::environment::{Environment, EnvironmentProperties};
use evochora::runtime::organism::{RegisterClass, RegisterRef, RegisterValue};
use evochora::runtime::simulation::{InMemoryProgramStore, Simulation};
use evochora::{Molecule, MoleculeType};
use std::sync::Arc;

fn run_program(files: &[(&str, &str)], ticks: usize) -> Simulation {
    let props = EnvironmentProperties::new(vec![64, 64], true);
    let mut resolver = MemoryResolver::new();
    for (path, text) in files {
        resolver = resolver.with_file(*path, *text);
    }
    let artifact = Compiler::with_resolver(props.clone(), Box::new(resolver))
        .compile("main.s", "prog")
        .expect("test program compiles");

    let store = InMemoryProgramStore::new();
    store.insert(artifact);
    let mut sim = Simulation::new(Environment::new(props), Arc::new(store));
    sim.spawn_program("prog", &[0, 0], 10_000).expect("spawns");
    for _ in 0..ticks {
        sim.tick();
    }
    sim
}

fn data_reg(sim: &Simulation, index: usize) -> RegisterValue {
    sim.organism(1)
        .expect("organism exists")
        .get_register(RegisterRef::new(RegisterClass::Data, index))
}

#[test]
fn test_ref_parameter_flows_back_to_caller() {
    // INC increments its REF parameter; the caller sees the new value
    let lib = ".PROC INC EXPORT REF X\n  ADDI X 1\n  RET\n.ENDP\n";
    let main = ".REQUIRE \"lib.s\" AS LIB\n  SETI %DR1 DATA:5\n  CALL LIB.INC REF %DR1\n";
    let sim = run_program(&[("main.s", main), ("lib.s", lib)], 10);

    assert_eq!(
        data_reg(&sim, 1),
        RegisterValue::Scalar(Molecule::new(MoleculeType::Data, 6))
    );
    // the marshalling stack is fully drained afterwards
    assert_eq!(sim.organism(1).expect("alive").data_stack_len(), 0);
}

#[test]
fn test_ref_marshalling_preserves_type_tags() {
    // an ENERGY-typed value keeps its tag through the REF round trip
    let lib = ".PROC BUMP EXPORT REF X\n  ADDI X 10\n  RET\n.ENDP\n";
    let main =
        ".REQUIRE \"lib.s\" AS LIB\n  SETI %DR2 ENERGY:7\n  CALL LIB.BUMP REF %DR2\n";
    let sim = run_program(&[("main.s", main), ("lib.s", lib)], 10);

    assert_eq!(
        data_reg(&sim, 2),
        RegisterValue::Scalar(Molecule::new(MoleculeType::Energy, 17))
    );
}

#[test]
fn test_val_parameter_is_consumed_not_restored() {
    // SPEND overwrites its VAL parameter; the caller's register is untouched
    let lib = ".PROC SPEND EXPORT VAL X\n  SETI X DATA:0\n  RET\n.ENDP\n";
    let main = ".REQUIRE \"lib.s\" AS LIB\n  SETI %DR3 DATA:42\n  CALL LIB.SPEND VAL %DR3\n";
    let sim = run_program(&[("main.s", main), ("lib.s", lib)], 10);

    assert_eq!(
        data_reg(&sim, 3),
        RegisterValue::Scalar(Molecule::new(MoleculeType::Data, 42))
    );
    assert_eq!(sim.organism(1).expect("alive").data_stack_len(), 0);
}

#[test]
fn test_mixed_ref_and_val_call() {
    // ACC adds its VAL argument into its REF accumulator
    let lib = "\
.PROC ACC EXPORT REF SUM VAL STEP
  ADDR SUM STEP
  RET
.ENDP
";
    let main = "\
.REQUIRE \"lib.s\" AS LIB
  SETI %DR0 DATA:100
  CALL LIB.ACC REF %DR0 VAL 23
";
    let sim = run_program(&[("main.s", main), ("lib.s", lib)], 12);

    assert_eq!(
        data_reg(&sim, 0),
        RegisterValue::Scalar(Molecule::new(MoleculeType::Data, 123))
    );
}

#[test]
fn test_import_binds_local_alias() {
    let lib = ".PROC INC EXPORT REF X\n  ADDI X 1\n  RET\n.ENDP\n";
    let main = "\
.REQUIRE \"lib.s\" AS LIB
.IMPORT LIB.INC AS BUMP
  SETI %DR1 DATA:9
  CALL BUMP REF %DR1
";
    let sim = run_program(&[("main.s", main), ("lib.s", lib)], 10);

    assert_eq!(
        data_reg(&sim, 1),
        RegisterValue::Scalar(Molecule::new(MoleculeType::Data, 10))
    );
}

#[test]
fn test_local_procedure_call_same_file() {
    let main = "\
  SETI %DR1 DATA:1
  CALL DOUBLE REF %DR1
  JMPI DONE
.PROC DOUBLE REF X
  ADDR X X
  RET
.ENDP
DONE:
  NOP
";
    let sim = run_program(&[("main.s", main)], 12);
    assert_eq!(
        data_reg(&sim, 1),
        RegisterValue::Scalar(Molecule::new(MoleculeType::Data, 2))
    );
}
