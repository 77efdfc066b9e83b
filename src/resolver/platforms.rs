// src/resolver/platforms.rs

//! Target platform set derivation and joint multi-platform resolution
//!
//! Every package name must resolve to a single version across all target
//! platforms. A sequential negotiation solve (on the generic target when
//! present, because only it is limited to source-form candidates available
//! everywhere) fixes one version per name; the remaining targets then solve
//! in parallel with those versions pinned, each picking its best platform
//! variant of the pinned version. A pin a target cannot satisfy gets banned
//! and negotiation re-runs on the next-best version common to all targets.

use crate::error::{Error, Result};
use crate::index::{CandidateIndex, Dependency};
use crate::platform::Platform;
use crate::runtime::RuntimeEnv;
use crate::version::{Requirement, Version};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::conflict::ConflictTrace;
use super::engine::{Assignment, CancelToken, Resolution, Solver};

/// Negotiation attempts before giving up on converging a shared version set.
const MAX_NEGOTIATIONS: usize = 32;

/// Result of a joint solve over every target platform.
#[derive(Debug)]
pub struct JointResolution {
    pub assignments: BTreeMap<Platform, Assignment>,
    /// Targets dropped because nothing resolves for them.
    pub dropped: Vec<Platform>,
}

/// Compute the target platforms to solve for.
///
/// The previously locked set plus explicit additions, minus explicit
/// removals. The running platform is always a target unless resolution is
/// forced to the generic marker. The generic marker itself is kept as a
/// tentative target (joint resolution drops it if it fails) except when a
/// previous lock already excludes it.
pub fn derive_targets(
    previous: &[Platform],
    added: &[Platform],
    removed: &[Platform],
    running: &Platform,
    force_generic: bool,
    had_previous: bool,
) -> Vec<Platform> {
    let mut targets: Vec<Platform> = Vec::new();
    let mut push = |targets: &mut Vec<Platform>, platform: Platform| {
        if !targets.contains(&platform) {
            targets.push(platform);
        }
    };

    for platform in previous.iter().chain(added) {
        push(&mut targets, platform.clone());
    }
    if force_generic {
        push(&mut targets, Platform::Generic);
    } else {
        push(&mut targets, running.clone());
    }
    if !had_previous || previous.contains(&Platform::Generic) {
        push(&mut targets, Platform::Generic);
    }
    targets.retain(|platform| !removed.contains(platform));

    // Generic first: it negotiates the shared versions.
    targets.sort_by_key(|platform| (!platform.is_generic(), platform.to_string()));
    targets
}

/// Solve every target platform under the single-version-per-name rule.
///
/// `soft_pins` are requirements carried over from a previous lock.
/// `requested` targets escalate to a hard failure when they cannot resolve;
/// any other failing target is dropped with a warning.
pub fn resolve_joint(
    index: &CandidateIndex,
    runtime: &RuntimeEnv,
    roots: &[Dependency],
    soft_pins: &[(String, Requirement)],
    targets: &[Platform],
    requested: &BTreeSet<Platform>,
    cancel: Option<&CancelToken>,
) -> Result<JointResolution> {
    let mut active: Vec<Platform> = targets.to_vec();
    let mut dropped: Vec<Platform> = Vec::new();
    let mut banned: BTreeMap<String, BTreeSet<Version>> = BTreeMap::new();
    let mut agreement_pins: Vec<(String, Requirement)> = Vec::new();
    let mut last_trace: Option<ConflictTrace> = None;

    for attempt in 0..MAX_NEGOTIATIONS {
        let Some(negotiator) = active.first().cloned() else {
            return Err(match last_trace {
                Some(trace) => Error::Unsatisfiable(trace),
                None => Error::Source("no target platform remains to solve for".to_string()),
            });
        };

        let mut pins: Vec<(String, Requirement)> = soft_pins.to_vec();
        pins.extend(agreement_pins.iter().cloned());
        for (name, versions) in &banned {
            for version in versions {
                pins.push((name.clone(), Requirement::excluding(version)));
            }
        }

        debug!(
            attempt,
            negotiator = %negotiator,
            targets = active.len(),
            "negotiating shared versions"
        );
        let negotiated = solve_one(index, runtime, &negotiator, roots, &pins, cancel);
        let negotiated = match negotiated {
            Resolution::Cancelled => return Err(Error::Cancelled),
            Resolution::Conflict(trace) => {
                if requested.contains(&negotiator) {
                    return Err(Error::Unsatisfiable(trace));
                }
                warn!(platform = %negotiator, "no valid assignment for platform, dropping it");
                last_trace = Some(trace);
                dropped.push(negotiator.clone());
                active.retain(|t| *t != negotiator);
                continue;
            }
            Resolution::Solved(assignment) => assignment,
        };

        // Replay the negotiated versions as pins for the remaining targets.
        let mut fixed = pins.clone();
        for (name, candidate) in &negotiated {
            fixed.push((name.clone(), Requirement::exact(&candidate.version)));
        }

        let rest: Vec<Platform> = active.iter().skip(1).cloned().collect();
        let results: Vec<(Platform, Resolution)> = rest
            .par_iter()
            .map(|target| {
                (
                    target.clone(),
                    solve_one(index, runtime, target, roots, &fixed, cancel),
                )
            })
            .collect();

        let mut assignments: BTreeMap<Platform, Assignment> = BTreeMap::new();
        assignments.insert(negotiator.clone(), negotiated);
        let mut renegotiate = false;
        for (target, resolution) in results {
            match resolution {
                Resolution::Cancelled => return Err(Error::Cancelled),
                Resolution::Solved(assignment) => {
                    assignments.insert(target, assignment);
                }
                Resolution::Conflict(trace) => {
                    let pinned_version = assignments
                        .get(&negotiator)
                        .and_then(|a| a.get(&trace.unresolved))
                        .map(|c| c.version.clone());
                    // Banning the pinned version only helps when the target
                    // could use some other version of the name; a name with
                    // no variant for this target at all is a platform gap.
                    let other_version_exists = index
                        .candidates(&trace.unresolved)
                        .iter()
                        .any(|c| c.platform.compatible(&target));
                    if let (Some(version), true) = (pinned_version, other_version_exists) {
                        // The negotiated version does not exist for this
                        // target; let it vary and fall back to the next-best
                        // version common to all platforms.
                        debug!(
                            platform = %target,
                            name = %trace.unresolved,
                            version = %version,
                            "pinned version unavailable, renegotiating"
                        );
                        banned.entry(trace.unresolved.clone()).or_default().insert(version);
                        last_trace = Some(trace);
                        renegotiate = true;
                        break;
                    } else if requested.contains(&target) {
                        return Err(Error::Unsatisfiable(trace));
                    } else {
                        warn!(platform = %target, "no valid assignment for platform, dropping it");
                        last_trace = Some(trace);
                        dropped.push(target.clone());
                        active.retain(|t| *t != target);
                    }
                }
            }
        }
        if renegotiate {
            continue;
        }

        // Names the negotiator never saw (platform-restricted subtrees) may
        // still disagree between the other targets.
        if let Some((name, version)) = version_disagreement(&assignments) {
            debug!(name = %name, version = %version, "cross-platform version disagreement, pinning");
            agreement_pins.push((name, Requirement::exact(&version)));
            continue;
        }

        return Ok(JointResolution {
            assignments,
            dropped,
        });
    }

    Err(match last_trace {
        Some(trace) => Error::Unsatisfiable(trace),
        None => Error::Source("version negotiation did not converge".to_string()),
    })
}

fn solve_one(
    index: &CandidateIndex,
    runtime: &RuntimeEnv,
    target: &Platform,
    roots: &[Dependency],
    pins: &[(String, Requirement)],
    cancel: Option<&CancelToken>,
) -> Resolution {
    let mut solver = Solver::new(index, runtime, target.clone());
    if let Some(token) = cancel {
        solver = solver.with_cancel(token.clone());
    }
    solver.solve(roots, pins)
}

/// First name (in deterministic order) chosen at different versions by
/// different targets, together with the lowest of those versions; the lowest
/// is the best bet for a version every target can satisfy.
fn version_disagreement(
    assignments: &BTreeMap<Platform, Assignment>,
) -> Option<(String, Version)> {
    let mut seen: BTreeMap<&String, BTreeSet<&Version>> = BTreeMap::new();
    for assignment in assignments.values() {
        for (name, candidate) in assignment {
            seen.entry(name).or_default().insert(&candidate.version);
        }
    }
    seen.into_iter()
        .find(|(_, versions)| versions.len() > 1)
        .and_then(|(name, versions)| {
            versions
                .first()
                .map(|lowest| (name.clone(), (*lowest).clone()))
        })
}
