//! Include and require resolution against a real filesystem.

use anyhow::Result;
use evochora::compiler::Compiler;
use evochora::runtime::environment::EnvironmentProperties;
use std::fs;
use tempfile::TempDir;

fn props() -> EnvironmentProperties {
    EnvironmentProperties::new(vec![32, 32], true)
}

#[test]
fn test_include_resolves_relative_to_including_file() -> Result<()> {
    let dir = TempDir::new()?;
    fs::create_dir(dir.path().join("lib"))?;
    fs::write(
        dir.path().join("main.s"),
        ".INCLUDE \"lib/util.s\"\n  NOP\n",
    )?;
    fs::write(dir.path().join("lib/util.s"), "HELPER:\n  NOP\n")?;

    let entry = dir.path().join("main.s");
    let artifact = Compiler::new(props()).compile(&entry.to_string_lossy(), "fs-test")?;

    assert_eq!(artifact.sources.len(), 2);
    assert!(artifact
        .sources
        .keys()
        .any(|path| path.ends_with("lib/util.s")));
    Ok(())
}

#[test]
fn test_nested_includes() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("a.s"), ".INCLUDE \"b.s\"\nNOP\n")?;
    fs::write(dir.path().join("b.s"), ".INCLUDE \"c.s\"\nNOP\n")?;
    fs::write(dir.path().join("c.s"), "NOP\n")?;

    let entry = dir.path().join("a.s");
    let artifact = Compiler::new(props()).compile(&entry.to_string_lossy(), "nested")?;
    assert_eq!(artifact.sources.len(), 3);
    Ok(())
}

#[test]
fn test_missing_file_is_a_preprocess_error() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("main.s"), ".INCLUDE \"ghost.s\"\n").expect("write main");

    let entry = dir.path().join("main.s");
    let err = Compiler::new(props())
        .compile(&entry.to_string_lossy(), "missing")
        .expect_err("missing include fails");
    let evochora::CompileError::CompilationFailed { phase, summary, .. } = err;
    assert_eq!(phase, "preprocessing");
    assert!(summary.contains("not found"), "{summary}");
}

#[test]
fn test_require_compiles_sibling_unit_from_disk() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(
        dir.path().join("main.s"),
        ".REQUIRE \"lib.s\" AS LIB\n  CALL LIB.PING REF %DR0\n",
    )?;
    fs::write(
        dir.path().join("lib.s"),
        ".PROC PING EXPORT REF X\n  RET\n.ENDP\n",
    )?;

    let entry = dir.path().join("main.s");
    let artifact = Compiler::new(props()).compile(&entry.to_string_lossy(), "require-fs")?;
    assert!(artifact
        .proc_name_to_param_names
        .keys()
        .any(|name| name.ends_with("lib.s::PING")));
    Ok(())
}
