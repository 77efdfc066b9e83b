// tests/lockfile.rs

//! End-to-end lockfile tests: a manifest and registry on disk, resolved,
//! written, re-read and reconciled.

mod common;

use common::*;
use pinion::lockfile::{LOCKFILE_NAME, codec};
use pinion::resolver::{ReconcileRequest, reconcile};
use pinion::source::{PackageSource, build_index, from_config};
use pinion::{CandidateIndex, Manifest, RuntimeEnv};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"
runtime-version = "3.1"

[[source]]
kind = "registry"
remote = "https://registry.example.org"
path = "registry"

[dependencies]
frame = "~> 2.0"
"#;

/// Lay out a workspace with a manifest and a registry directory.
fn setup_workspace() -> (TempDir, Manifest) {
    let temp_dir = tempfile::tempdir().unwrap();
    let registry_dir = temp_dir.path().join("registry");
    fs::create_dir_all(&registry_dir).unwrap();

    write_package(
        &registry_dir,
        "frame",
        r#"{
            "name": "frame",
            "versions": [
                {
                    "version": "2.0.1",
                    "dependencies": [{"name": "logger", "requirement": ">= 1.0"}],
                    "checksum": "sha256:f201"
                }
            ]
        }"#,
    );
    write_package(
        &registry_dir,
        "logger",
        r#"{
            "name": "logger",
            "versions": [
                {"version": "1.4.0", "checksum": "sha256:l140"},
                {"version": "1.5.2", "checksum": "sha256:l152"}
            ]
        }"#,
    );

    let manifest = Manifest::parse(MANIFEST, temp_dir.path()).unwrap();
    (temp_dir, manifest)
}

fn write_package(registry_dir: &Path, name: &str, body: &str) {
    fs::write(registry_dir.join(format!("{name}.json")), body).unwrap();
}

fn load_index(manifest: &Manifest) -> CandidateIndex {
    let sources: Vec<Box<dyn PackageSource>> =
        manifest.sources.iter().map(from_config).collect();
    build_index(&sources).unwrap()
}

fn base_request<'a>(
    manifest: &'a Manifest,
    index: &'a CandidateIndex,
    env: &'a RuntimeEnv,
    previous: Option<&'a pinion::LockedGraph>,
) -> ReconcileRequest<'a> {
    ReconcileRequest {
        manifest,
        index,
        runtime: env,
        previous,
        unlock: BTreeSet::new(),
        add_platforms: Vec::new(),
        remove_platforms: Vec::new(),
        force_generic: false,
        frozen: false,
        cancel: None,
    }
}

#[test]
fn test_lock_write_read_reconcile_cycle() {
    let (workspace, manifest) = setup_workspace();
    let index = load_index(&manifest);
    let env = runtime();

    let outcome = reconcile(&base_request(&manifest, &index, &env, None)).unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.graph.locked_version("frame"), Some(&v("2.0.1")));
    assert_eq!(outcome.graph.locked_version("logger"), Some(&v("1.5.2")));
    // Integrity tokens from the registry land in the lock.
    assert!(!outcome.graph.checksums.is_empty());

    let lock_path = workspace.path().join(LOCKFILE_NAME);
    codec::write_file(&lock_path, &outcome.graph).unwrap();
    let first_bytes = fs::read_to_string(&lock_path).unwrap();

    // Round-trip through the file.
    let reread = codec::read_file(&lock_path).unwrap().unwrap();
    assert_eq!(reread, outcome.graph);

    // Reconciling an unchanged setup is byte-identical (fast path).
    let again = reconcile(&base_request(&manifest, &index, &env, Some(&reread))).unwrap();
    assert!(!again.changed);
    codec::write_file(&lock_path, &again.graph).unwrap();
    assert_eq!(fs::read_to_string(&lock_path).unwrap(), first_bytes);
}

#[test]
fn test_minimal_diff_on_single_unlock() {
    let (workspace, manifest) = setup_workspace();
    let index = load_index(&manifest);
    let env = runtime();
    let first = reconcile(&base_request(&manifest, &index, &env, None)).unwrap();

    // A new frame release appears.
    write_package(
        &workspace.path().join("registry"),
        "frame",
        r#"{
            "name": "frame",
            "versions": [
                {
                    "version": "2.0.1",
                    "dependencies": [{"name": "logger", "requirement": ">= 1.0"}],
                    "checksum": "sha256:f201"
                },
                {
                    "version": "2.2.0",
                    "dependencies": [{"name": "logger", "requirement": ">= 1.0"}],
                    "checksum": "sha256:f220"
                }
            ]
        }"#,
    );
    let index = load_index(&manifest);

    let mut request = base_request(&manifest, &index, &env, Some(&first.graph));
    request.unlock.insert("frame".to_string());
    let updated = reconcile(&request).unwrap();
    assert!(updated.changed);
    assert_eq!(updated.graph.locked_version("frame"), Some(&v("2.2.0")));
    assert_eq!(updated.graph.locked_version("logger"), Some(&v("1.5.2")));

    // Only the frame lines moved; every logger line is byte-identical.
    let before = codec::serialize(&first.graph);
    let after = codec::serialize(&updated.graph);
    let before_logger: Vec<&str> =
        before.lines().filter(|l| l.contains("logger")).collect();
    let after_logger: Vec<&str> =
        after.lines().filter(|l| l.contains("logger")).collect();
    assert_eq!(before_logger, after_logger);
    assert!(after.contains("frame (2.2.0)"));
}

#[test]
fn test_frozen_check_against_written_lockfile() {
    let (workspace, manifest) = setup_workspace();
    let index = load_index(&manifest);
    let env = runtime();
    let first = reconcile(&base_request(&manifest, &index, &env, None)).unwrap();
    let lock_path = workspace.path().join(LOCKFILE_NAME);
    codec::write_file(&lock_path, &first.graph).unwrap();

    let reread = codec::read_file(&lock_path).unwrap().unwrap();
    let mut request = base_request(&manifest, &index, &env, Some(&reread));
    request.frozen = true;
    assert!(reconcile(&request).is_ok());

    // Tighten the manifest; frozen verification must now fail.
    let tightened = format!("{MANIFEST}logger = \"= 1.4.0\"\n");
    let manifest = Manifest::parse(&tightened, workspace.path()).unwrap();
    let mut request = base_request(&manifest, &index, &env, Some(&reread));
    request.frozen = true;
    assert!(matches!(
        reconcile(&request),
        Err(pinion::Error::FrozenLockOutdated(_))
    ));
}

#[test]
fn test_lockfile_text_is_stable_reference() {
    let (_workspace, manifest) = setup_workspace();
    let index = load_index(&manifest);
    let env = runtime();
    let outcome = reconcile(&base_request(&manifest, &index, &env, None)).unwrap();

    let text = codec::serialize(&outcome.graph);
    let expected = format!(
        "REGISTRY\n\
         \x20 remote: https://registry.example.org\n\
         \x20 specs:\n\
         \x20   frame (2.0.1)\n\
         \x20     logger (>= 1.0)\n\
         \x20   logger (1.5.2)\n\
         \n\
         PLATFORMS\n\
         \x20 generic\n\
         \x20 x86_64-linux\n\
         \n\
         DEPENDENCIES\n\
         \x20 frame (~> 2.0)\n\
         \n\
         CHECKSUMS\n\
         \x20 frame (2.0.1) sha256:f201\n\
         \x20 logger (1.5.2) sha256:l152\n\
         \n\
         PINION VERSION\n\
         \x20  {}\n",
        env!("CARGO_PKG_VERSION")
    );
    assert_eq!(text, expected);
}
