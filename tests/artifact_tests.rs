//! Artifact linearization: the serde twin must round-trip a real compiled
//! program losslessly.

use evochora::compiler::preprocessor::MemoryResolver;
use evochora::compiler::Compiler;
use evochora::runtime::environment::EnvironmentProperties;
use evochora::{LinearizedProgramArtifact, ProgramArtifact};

fn compile_fixture() -> ProgramArtifact {
    let lib = "\
.PROC INC EXPORT REF X
  ADDI X 1
  RET
.ENDP
";
    let main = "\
.REQUIRE \"lib.s\" AS LIB
.REG CTR %DR3
.DEFINE START 5
  SETI CTR DATA:5
LOOP:
  CALL LIB.INC REF CTR
  IFPI CTR 10
  JMPI LOOP
.PLACE STRUCTURE:1 0..3|8
";
    let resolver = MemoryResolver::new()
        .with_file("main.s", main)
        .with_file("lib.s", lib);
    Compiler::with_resolver(
        EnvironmentProperties::new(vec![32, 32], true),
        Box::new(resolver),
    )
    .compile("main.s", "fixture")
    .expect("fixture compiles")
}

#[test]
fn test_linearize_roundtrip_on_compiled_program() {
    let artifact = compile_fixture();
    let restored: ProgramArtifact = artifact.linearize().into();
    assert_eq!(artifact, restored);
}

#[test]
fn test_json_roundtrip_on_compiled_program() {
    let artifact = compile_fixture();
    let json = serde_json::to_string(&artifact.linearize()).expect("serializes");
    let parsed: LinearizedProgramArtifact = serde_json::from_str(&json).expect("parses");
    let restored: ProgramArtifact = parsed.into();
    assert_eq!(artifact, restored);
}

#[test]
fn test_linearization_is_stable() {
    // two compilations of the same sources linearize identically
    let a = compile_fixture().linearize();
    let b = compile_fixture().linearize();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).expect("serializes"),
        serde_json::to_string(&b).expect("serializes")
    );
}

#[test]
fn test_artifact_contract_fields_are_populated() {
    let artifact = compile_fixture();
    assert_eq!(artifact.program_id, "fixture");
    assert!(!artifact.machine_code_layout.is_empty());
    assert!(!artifact.initial_world_objects.is_empty());
    assert!(!artifact.source_map.is_empty());
    assert!(!artifact.call_site_bindings.is_empty());
    assert!(!artifact.label_address_to_name.is_empty());
    assert!(!artifact.register_alias_map.is_empty());
    assert!(!artifact.proc_name_to_param_names.is_empty());
    // the coordinate maps are mutually inverse
    for (address, coord) in &artifact.linear_address_to_coord {
        if let Some(back) = artifact.relative_coord_to_linear_address.get(coord) {
            assert_eq!(back, address);
        }
    }
}
