// tests/resolve.rs

//! End-to-end resolution tests: solver properties over larger graphs and
//! the joint multi-platform behavior.

mod common;

use common::*;
use pinion::resolver::{Resolution, Solver, resolve_joint};
use pinion::{Candidate, Dependency, Platform, Requirement};
use std::collections::BTreeSet;

#[test]
fn test_closure_invariant_on_generated_acyclic_graphs() {
    // Deterministic pseudo-random acyclic candidate graphs: packages are
    // layered and only depend on strictly later layers, so every graph is a
    // DAG by construction. After solving, every dependency of every chosen
    // candidate must be satisfied inside the assignment.
    for seed in [3u64, 17, 40, 91, 123] {
        let mut state = seed;
        let mut next = move || {
            // xorshift, deterministic across runs
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let layers = 4;
        let per_layer = 4;
        let mut candidates = Vec::new();
        for layer in 0..layers {
            for slot in 0..per_layer {
                let name = format!("pkg-{layer}-{slot}");
                for minor in 0..3u64 {
                    let mut candidate = pkg(&name, &format!("1.{minor}"));
                    if layer + 1 < layers {
                        let deps = next() % 3;
                        for _ in 0..deps {
                            let target_layer = layer + 1 + (next() as usize % (layers - layer - 1));
                            let target_slot = next() as usize % per_layer;
                            let dep_name = format!("pkg-{target_layer}-{target_slot}");
                            let req = match next() % 3 {
                                0 => Requirement::any(),
                                1 => r(">= 1.0"),
                                _ => r("< 1.2"),
                            };
                            candidate = candidate.with_dep(Dependency::new(&dep_name, req));
                        }
                    }
                    candidates.push(candidate);
                }
            }
        }

        let index = index_of(candidates);
        let env = runtime();
        let roots: Vec<Dependency> = (0..per_layer)
            .map(|slot| Dependency::new(&format!("pkg-0-{slot}"), Requirement::any()))
            .collect();

        let resolution = Solver::new(&index, &env, linux()).solve(&roots, &[]);
        let Resolution::Solved(assignment) = resolution else {
            panic!("seed {seed}: expected a solution");
        };
        for candidate in assignment.values() {
            for dep in &candidate.deps {
                let chosen = assignment
                    .get(&dep.name)
                    .unwrap_or_else(|| panic!("seed {seed}: {} unresolved", dep.name));
                assert!(
                    dep.req.matches(&chosen.version),
                    "seed {seed}: {} {} does not satisfy {} on {}",
                    dep.name,
                    chosen.version,
                    dep.req,
                    candidate.name
                );
            }
        }
    }
}

#[test]
fn test_deep_backtracking_finds_the_only_consistent_stack() {
    // web prefers the newest view, but only the oldest view tolerates the
    // template engine the root also demands.
    let index = index_of(vec![
        pkg_dep("web", "5.0", "view", ">= 1.0"),
        pkg("view", "3.0").with_dep(Dependency::new("template", ">= 3.0".parse().unwrap())),
        pkg("view", "2.0").with_dep(Dependency::new("template", ">= 2.0".parse().unwrap())),
        pkg("view", "1.0").with_dep(Dependency::new("template", "< 2.0".parse().unwrap())),
        pkg("template", "1.5"),
    ]);

    let env = runtime();
    let roots = [Dependency::new("web", Requirement::any())];
    let Resolution::Solved(assignment) =
        Solver::new(&index, &env, linux()).solve(&roots, &[])
    else {
        panic!("expected a solution");
    };
    assert_eq!(assignment["view"].version, v("1.0"));
    assert_eq!(assignment["template"].version, v("1.5"));
}

#[test]
fn test_joint_platforms_share_one_version_per_name() {
    // The spec'd scenario: pack has 1.0 available to both targets and 1.1
    // only as a platform binary. Both targets must settle on 1.0.
    let index = index_of(vec![
        pkg("pack", "1.0"),
        pkg("pack", "1.0").with_platform(linux()),
        pkg("pack", "1.1").with_platform(linux()),
    ]);

    let env = runtime();
    let roots = [Dependency::new("pack", Requirement::any())];
    let targets = [Platform::Generic, linux()];
    let joint = resolve_joint(
        &index,
        &env,
        &roots,
        &[],
        &targets,
        &BTreeSet::new(),
        None,
    )
    .unwrap();

    let generic_pick = &joint.assignments[&Platform::Generic]["pack"];
    let linux_pick = &joint.assignments[&linux()]["pack"];
    assert_eq!(generic_pick.version, v("1.0"));
    assert_eq!(linux_pick.version, v("1.0"));
    assert!(generic_pick.platform.is_generic());
    assert_eq!(linux_pick.platform, linux());
}

#[test]
fn test_platform_preference_with_runtime_gate() {
    // Specific beats generic at equal version, unless its runtime
    // requirement excludes the assumed runtime.
    let admitted = index_of(vec![
        pkg("native", "1.0"),
        pkg("native", "1.0")
            .with_platform(linux())
            .with_runtime_req(r(">= 3.0")),
    ]);
    let env = runtime();
    let roots = [Dependency::new("native", Requirement::any())];
    let Resolution::Solved(assignment) =
        Solver::new(&admitted, &env, linux()).solve(&roots, &[])
    else {
        panic!("expected a solution");
    };
    assert_eq!(assignment["native"].platform, linux());

    let excluded = index_of(vec![
        pkg("native", "1.0"),
        pkg("native", "1.0")
            .with_platform(linux())
            .with_runtime_req(r("< 3.0")),
    ]);
    let Resolution::Solved(assignment) =
        Solver::new(&excluded, &env, linux()).solve(&roots, &[])
    else {
        panic!("expected a solution");
    };
    assert!(assignment["native"].platform.is_generic());
}

#[test]
fn test_conflict_trace_spec_scenario() {
    // Manifest requires frame = 1.0, every frame 1.0 requires bolt = 2.0,
    // and the index has no bolt 2.0. The trace names frame, bolt and = 2.0
    // and enumerates the near-miss bolt variants.
    let index = index_of(vec![
        pkg_dep("frame", "1.0", "bolt", "= 2.0"),
        pkg("bolt", "1.9"),
        pkg("bolt", "2.1").with_platform(darwin()),
    ]);

    let env = runtime();
    let roots = [Dependency::new("frame", r("= 1.0"))];
    let Resolution::Conflict(trace) =
        Solver::new(&index, &env, linux()).solve(&roots, &[])
    else {
        panic!("expected a conflict");
    };

    let rendered = trace.to_string();
    assert!(rendered.contains("bolt"));
    assert!(rendered.contains("= 2.0"));
    assert!(rendered.contains("frame"));
    assert!(rendered.contains("bolt 1.9 (generic)"));
    assert!(rendered.contains("bolt 2.1 (arm64-darwin)"));
}

#[test]
fn test_groups_and_platform_restrictions_scope_dependencies() {
    let index = index_of(vec![
        pkg("frame", "2.0"),
        pkg("linter", "1.0"),
        pkg("native-shim", "0.9").with_platform(linux()),
        Candidate::new("native-shim", v("0.9"), registry()),
    ]);

    let env = runtime();
    let roots = [
        Dependency::new("frame", Requirement::any()),
        Dependency::new("native-shim", Requirement::any()).with_platform(linux()),
    ];

    // On the linux target the restricted dependency participates.
    let Resolution::Solved(assignment) =
        Solver::new(&index, &env, linux()).solve(&roots, &[])
    else {
        panic!("expected a solution");
    };
    assert!(assignment.contains_key("native-shim"));

    // On the generic target it does not.
    let Resolution::Solved(assignment) =
        Solver::new(&index, &env, Platform::Generic).solve(&roots, &[])
    else {
        panic!("expected a solution");
    };
    assert!(!assignment.contains_key("native-shim"));
}
