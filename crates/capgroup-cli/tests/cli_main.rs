//! Basic CLI tests for the capgroup command-line interface.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use assert_cmd::Command;
use predicates::prelude::*;

fn capgroup() -> Command {
    let mut cmd = Command::cargo_bin("capgroup").unwrap();
    cmd.env_remove("CAPGROUP_PLUGIN_DIR")
        .env_remove("CAPGROUP_KVSTORE_SEED")
        .env_remove("RUST_LOG");
    cmd
}

/// The kvstore plugin, built once per test run.
///
/// It goes to a target directory of its own: the harness running these tests still holds the
/// lock on the workspace one.
fn built_plugin() -> &'static Path {
    static PLUGIN: OnceLock<PathBuf> = OnceLock::new();
    PLUGIN.get_or_init(|| {
        let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("kvstore-plugin");
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../Cargo.toml");
        let status = std::process::Command::new(env!("CARGO"))
            .args(["build", "--quiet", "--lib", "-p", "capgroup-kvstore"])
            .arg("--manifest-path")
            .arg(&manifest)
            .arg("--target-dir")
            .arg(&target_dir)
            .status()
            .expect("failed to run cargo");
        assert!(status.success(), "building capgroup-kvstore failed: {status}");

        let path = target_dir
            .join("debug")
            .join(libloading_file_name("capgroup_kvstore"));
        assert!(path.is_file(), "{} was not produced", path.display());
        path
    })
}

fn libloading_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
}

/// Test that the CLI binary exists and shows help.
#[test]
fn test_cli_help() {
    capgroup()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("layout"))
        .stdout(predicate::str::contains("--plugin-dir"));
}

/// Test that the CLI shows version information.
#[test]
fn test_cli_version() {
    capgroup()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("capgroup"));
}

/// Test that providing no subcommand shows an error.
#[test]
fn test_no_subcommand_shows_error() {
    capgroup().assert().failure();
}

#[test]
fn test_layout_table() {
    capgroup()
        .arg("layout")
        .assert()
        .success()
        .stdout(predicate::str::contains("ABI version:"))
        .stdout(predicate::str::contains("Fingerprint:"))
        .stdout(predicate::str::contains("FeaturesGroup"))
        .stdout(predicate::str::contains("PluginInnerBox"));
}

#[test]
fn test_layout_json() {
    let output = capgroup().args(["layout", "--json"]).output().unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["abi_version"], 1);
    let entries = doc["entries"].as_array().unwrap();
    assert!(entries.iter().any(|e| e["name"] == "PluginInnerBox"));
    assert!(entries.iter().all(|e| e["size"].as_u64().is_some()));
}

#[test]
fn test_missing_plugin_reports_code() {
    let dir = tempfile::tempdir().unwrap();

    capgroup()
        .arg("--plugin-dir")
        .arg(dir.path())
        .args(["--plugin", "surely_not_a_capgroup_plugin", "info"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("code 2"))
        .stderr(predicate::str::contains("Plugin not found"));
}

#[test]
fn test_garbage_library_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(libloading_file_name("garbage")),
        b"not an object file",
    )
    .unwrap();

    capgroup()
        .arg("--plugin-dir")
        .arg(dir.path())
        .args(["--plugin", "garbage", "info"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load"));
}

#[test]
fn test_invalid_path_reports_code() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plugin.txt");
    std::fs::write(&file, b"x").unwrap();

    capgroup()
        .arg("--plugin")
        .arg(&file)
        .arg("info")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid plugin path"));
}

#[test]
fn test_bad_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("loader.toml");
    std::fs::write(&config, "search_paths = 3\n").unwrap();

    capgroup()
        .arg("--config")
        .arg(&config)
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_bad_op_fails_before_loading() {
    capgroup()
        .args(["--plugin", "surely_not_a_capgroup_plugin", "exec", "=3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing key"))
        .stderr(predicate::str::contains("not found").not());
}

#[test]
fn test_built_plugin_exports_entry_points() {
    // SAFETY: the plugin has no initialisers of its own.
    let library = unsafe { libloading::Library::new(built_plugin()) }.unwrap();

    for symbol in [
        capgroup_plugin_api::loader::CREATE_SYMBOL,
        capgroup_plugin_api::loader::LAYOUT_SYMBOL,
        "capgroup_load_plugin",
    ] {
        // SAFETY: only the address is looked up, nothing is called.
        let found = unsafe { library.get::<unsafe extern "C" fn()>(symbol.as_bytes()) };
        assert!(found.is_ok(), "{symbol} is not exported");
    }
}

#[test]
fn test_info_against_built_plugin() {
    capgroup()
        .arg("--plugin")
        .arg(built_plugin())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plugin Information"))
        .stdout(predicate::str::contains("KeyValueDumper"))
        .stdout(predicate::str::contains("Entries:         0"));
}

#[test]
fn test_exec_against_built_plugin() {
    capgroup()
        .arg("--plugin")
        .arg(built_plugin())
        .args(["exec", "a=7", "a", "absent", "count", "ints", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a = 7"))
        .stdout(predicate::str::contains("absent = 0"))
        .stdout(predicate::str::contains("count = 1"))
        .stdout(predicate::str::contains("2: 4"));
}

#[test]
fn test_demo_against_built_plugin() {
    capgroup()
        .arg("--plugin")
        .arg(built_plugin())
        .arg("demo")
        .write_stdin("a\n7\na\n9\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Borrowed done."))
        .stdout(predicate::str::contains("Cur val: 7"))
        .stdout(predicate::str::contains("a : 9"))
        .stdout(predicate::str::contains("Quitting"));
}

#[test]
fn test_demo_needs_input() {
    capgroup()
        .arg("--plugin")
        .arg(built_plugin())
        .arg("demo")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unexpected end of input"));
}
