// src/resolver/reconcile.rs

//! Lockfile reconciliation
//!
//! Given a previous lock and the current manifest, produce a new lock with
//! minimal churn: an unchanged setup returns the previous graph untouched
//! without invoking the solver at all; otherwise only explicitly unlocked
//! names and names the lock can no longer satisfy are free to move, and
//! everything else is pinned to its locked version. Pins are soft: when a
//! pin makes resolution impossible it is dropped, reported and recorded,
//! never silently.

use crate::error::{Error, Result};
use crate::index::CandidateIndex;
use crate::lockfile::LockedGraph;
use crate::manifest::Manifest;
use crate::platform::Platform;
use crate::runtime::RuntimeEnv;
use crate::version::Requirement;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::engine::CancelToken;
use super::platforms::{derive_targets, resolve_joint};

/// Retry rounds for soft-pin relaxation before giving up.
const MAX_RELAXATIONS: usize = 16;

/// Inputs to one reconciliation pass.
pub struct ReconcileRequest<'a> {
    pub manifest: &'a Manifest,
    pub index: &'a CandidateIndex,
    pub runtime: &'a RuntimeEnv,
    pub previous: Option<&'a LockedGraph>,
    /// Names explicitly requested for update.
    pub unlock: BTreeSet<String>,
    pub add_platforms: Vec<Platform>,
    pub remove_platforms: Vec<Platform>,
    /// Restrict resolution to the generic marker.
    pub force_generic: bool,
    /// Fail instead of producing a changed graph.
    pub frozen: bool,
    pub cancel: Option<CancelToken>,
}

/// Result of a reconciliation pass.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub graph: LockedGraph,
    /// False when the previous graph was returned untouched.
    pub changed: bool,
    /// Names whose locked version had to move beyond what was requested.
    pub relaxed: Vec<String>,
    /// Target platforms dropped because nothing resolves for them.
    pub dropped_platforms: Vec<Platform>,
}

/// Reconcile the manifest against the previous lock (or resolve from
/// scratch when there is none).
pub fn reconcile(request: &ReconcileRequest<'_>) -> Result<ReconcileOutcome> {
    let roots = request.manifest.runtime_roots();

    if let Some(previous) = request.previous {
        verify_integrity(previous, request.index)?;

        let explicit_change = !request.unlock.is_empty()
            || !request.add_platforms.is_empty()
            || !request.remove_platforms.is_empty();
        if !explicit_change {
            if let Some(reason) = lock_is_stale(previous, request) {
                debug!(reason = %reason, "lockfile is stale");
                if request.frozen {
                    return Err(Error::FrozenLockOutdated(reason));
                }
            } else {
                // Fast path: nothing changed, zero solver invocations.
                info!("lockfile is up to date");
                return Ok(ReconcileOutcome {
                    graph: previous.clone(),
                    changed: false,
                    relaxed: Vec::new(),
                    dropped_platforms: Vec::new(),
                });
            }
        } else if request.frozen {
            return Err(Error::FrozenLockOutdated(
                "updates were requested".to_string(),
            ));
        }
    } else if request.frozen {
        return Err(Error::FrozenLockOutdated("no lockfile exists".to_string()));
    }

    let mut base: Vec<Platform> = request
        .previous
        .map(|p| p.platforms.clone())
        .unwrap_or_default();
    for platform in &request.manifest.requested_platforms {
        if !base.contains(platform) {
            base.push(platform.clone());
        }
    }
    let targets = derive_targets(
        &base,
        &request.add_platforms,
        &request.remove_platforms,
        &request.runtime.platform,
        request.force_generic,
        request.previous.is_some(),
    );
    let requested: BTreeSet<Platform> = request
        .manifest
        .requested_platforms
        .iter()
        .chain(&request.add_platforms)
        .cloned()
        .collect();

    // Pin every name outside the unlock set to its locked version.
    let mut pins: Vec<(String, Requirement)> = Vec::new();
    if let Some(previous) = request.previous {
        let unlocked = full_unlock_set(previous, request, &targets);
        for name in previous.locked_names() {
            if unlocked.contains(&name) {
                continue;
            }
            if let Some(version) = previous.locked_version(&name) {
                pins.push((name.clone(), Requirement::exact(version)));
            }
        }
        debug!(pinned = pins.len(), unlocked = unlocked.len(), "computed unlock set");
    }

    let mut relaxed: Vec<String> = Vec::new();
    let joint = loop {
        match resolve_joint(
            request.index,
            request.runtime,
            &roots,
            &pins,
            &targets,
            &requested,
            request.cancel.as_ref(),
        ) {
            Ok(joint) => break joint,
            Err(Error::Unsatisfiable(trace)) => {
                // A pin made resolution impossible; drop the pins implicated
                // in the trace and try again. Only a last resort, and loud.
                let mut implicated: BTreeSet<String> =
                    trace.chain.iter().map(|r| r.dependent.clone()).collect();
                implicated.insert(trace.unresolved.clone());
                let before = pins.len();
                pins.retain(|(name, _)| {
                    let hit = implicated.contains(name);
                    if hit {
                        relaxed.push(name.clone());
                    }
                    !hit
                });
                if pins.len() == before || relaxed.len() > MAX_RELAXATIONS {
                    return Err(Error::Unsatisfiable(trace));
                }
                warn!(
                    names = ?relaxed,
                    "locked versions conflict with the manifest, allowing them to change"
                );
            }
            Err(other) => return Err(other),
        }
    };

    let mut graph = LockedGraph::from_resolution(
        &joint.assignments,
        &request.manifest.dependencies,
        env!("CARGO_PKG_VERSION"),
    );
    if let Some(previous) = request.previous {
        graph.trailing = previous.trailing.clone();
        warn_on_newly_specific(previous, &graph);
    }

    let changed = match request.previous {
        Some(previous) => *previous != graph,
        None => true,
    };

    Ok(ReconcileOutcome {
        graph,
        changed,
        relaxed,
        dropped_platforms: joint.dropped,
    })
}

/// Why the lock cannot be reused as-is, or `None` when it can.
fn lock_is_stale(previous: &LockedGraph, request: &ReconcileRequest<'_>) -> Option<String> {
    let manifest = request.manifest;

    // Requested dependency set must be unchanged.
    let mut wanted: Vec<(String, String, bool)> = manifest
        .dependencies
        .iter()
        .map(|d| (d.name.clone(), d.req.to_string(), d.source.is_some()))
        .collect();
    wanted.sort();
    let mut locked: Vec<(String, String, bool)> = previous
        .dependencies
        .iter()
        .map(|d| (d.name.clone(), d.req.to_string(), d.pinned))
        .collect();
    locked.sort();
    if wanted != locked {
        return Some("the requested dependencies changed".to_string());
    }

    // Source set must be unchanged.
    let mut wanted_sources: Vec<_> = manifest.sources.iter().map(|s| s.id.clone()).collect();
    wanted_sources.sort();
    let mut locked_sources: Vec<_> = previous.sources.iter().map(|s| s.id.clone()).collect();
    locked_sources.sort();
    if wanted_sources != locked_sources {
        return Some("the configured sources changed".to_string());
    }

    // Target platform set must be unchanged.
    let mut base = previous.platforms.clone();
    for platform in &manifest.requested_platforms {
        if !base.contains(platform) {
            base.push(platform.clone());
        }
    }
    let targets = derive_targets(
        &base,
        &[],
        &[],
        &request.runtime.platform,
        request.force_generic,
        true,
    );
    let target_set: BTreeSet<&Platform> = targets.iter().collect();
    let locked_set: BTreeSet<&Platform> = previous.platforms.iter().collect();
    if target_set != locked_set {
        return Some("the target platform set changed".to_string());
    }

    // Every locked candidate must still exist, satisfy every requirement,
    // and admit the running runtime.
    for source in &previous.sources {
        for spec in &source.specs {
            let candidate = request
                .index
                .find(&spec.name, &spec.version, &spec.platform, &source.id);
            let Some(candidate) = candidate else {
                return Some(format!("{} is gone from its source", spec.lock_name()));
            };
            if !previous.requirement_on(&spec.name).matches(&spec.version) {
                return Some(format!(
                    "{} no longer satisfies its requirements",
                    spec.lock_name()
                ));
            }
            if !request.runtime.admits(&candidate.runtime_req) {
                return Some(format!(
                    "{} does not support the running runtime",
                    spec.lock_name()
                ));
            }
        }
    }

    // Every target platform must be covered by a locked variant of each name.
    for name in previous.locked_names() {
        let specs = previous.specs_of(&name);
        for target in &previous.platforms {
            if !specs.iter().any(|(_, s)| s.platform.compatible(target)) {
                return Some(format!("{} has no variant for {}", name, target));
            }
        }
    }

    None
}

/// Names that are free to change: explicitly requested ones plus any name
/// whose locked state is no longer valid.
fn full_unlock_set(
    previous: &LockedGraph,
    request: &ReconcileRequest<'_>,
    targets: &[Platform],
) -> BTreeSet<String> {
    let mut unlocked = request.unlock.clone();

    let manifest_req = |name: &str| -> Requirement {
        request
            .manifest
            .dependencies
            .iter()
            .filter(|d| d.name == name)
            .fold(Requirement::any(), |acc, d| acc.intersect(&d.req))
    };

    for name in previous.locked_names() {
        if unlocked.contains(&name) {
            continue;
        }
        let specs = previous.specs_of(&name);
        let Some(version) = previous.locked_version(&name) else {
            continue;
        };

        // The manifest may have tightened its requirement.
        if !manifest_req(&name).matches(version) {
            unlocked.insert(name.clone());
            continue;
        }

        // Some variant must still exist per target platform, at the locked
        // version, in the index.
        let available: Vec<_> = specs
            .iter()
            .filter_map(|(source, spec)| {
                request
                    .index
                    .find(&spec.name, &spec.version, &spec.platform, source)
            })
            .collect();
        if available.is_empty() {
            unlocked.insert(name.clone());
            continue;
        }
        if available
            .iter()
            .any(|c| !request.runtime.admits(&c.runtime_req))
        {
            unlocked.insert(name.clone());
            continue;
        }
        for target in targets {
            let covered = request
                .index
                .candidates(&name)
                .iter()
                .any(|c| c.version == *version && c.platform.compatible(target));
            if !covered {
                unlocked.insert(name.clone());
                break;
            }
        }
    }

    unlocked
}

/// A fetched candidate whose integrity token disagrees with the locked one
/// is fatal, never silently accepted.
fn verify_integrity(previous: &LockedGraph, index: &CandidateIndex) -> Result<()> {
    for source in &previous.sources {
        for spec in &source.specs {
            let locked = previous.checksum_of(&spec.name, &spec.version, &spec.platform);
            let Some(locked) = locked else { continue };
            let fetched = index
                .find(&spec.name, &spec.version, &spec.platform, &source.id)
                .and_then(|c| c.checksum.as_deref());
            if let Some(fetched) = fetched {
                if fetched != locked {
                    return Err(Error::IntegrityMismatch {
                        name: spec.name.clone(),
                        version: spec.version.to_string(),
                        locked: locked.to_string(),
                        fetched: fetched.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// The previous lock may only have recorded the generic variant of a name
/// the new graph locks platform-specifically. Surfaced as a warning so the
/// switch to binary variants is never silent.
fn warn_on_newly_specific(previous: &LockedGraph, graph: &LockedGraph) {
    for name in graph.locked_names() {
        let was_generic_only = {
            let specs = previous.specs_of(&name);
            !specs.is_empty() && specs.iter().all(|(_, s)| s.platform.is_generic())
        };
        let now_specific = graph
            .specs_of(&name)
            .iter()
            .any(|(_, s)| !s.platform.is_generic());
        if was_generic_only && now_specific {
            warn!(
                name = %name,
                "a platform specific variant is being locked, the previous lockfile only had its generic form"
            );
        }
    }
}
