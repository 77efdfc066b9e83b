// src/resolver/engine.rs

//! Backtracking constraint solver
//!
//! Assigns exactly one candidate per reachable package name for a single
//! target platform. The search is depth-first over names in first-discovered
//! order, with an explicit choice stack instead of recursion, and it is fully
//! deterministic: candidates are tried highest version first, then most
//! specific compatible platform.

use crate::index::{Candidate, CandidateIndex, Dependency, SourceId};
use crate::platform::Platform;
use crate::runtime::RuntimeEnv;
use crate::version::Requirement;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

use super::conflict::{ConflictReason, ConflictTrace, NearMiss};

/// A successful assignment: one chosen candidate per package name, valid for
/// one target platform. Every dependency of every chosen candidate is
/// satisfied by another entry (closure holds by construction).
pub type Assignment = BTreeMap<String, Candidate>;

/// Cooperative cancellation flag, checked at each backtrack step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Typed outcome of a solve.
#[derive(Debug, Clone)]
pub enum Resolution {
    Solved(Assignment),
    Conflict(ConflictTrace),
    Cancelled,
}

/// Where a requirement on a name came from.
#[derive(Debug, Clone, PartialEq)]
enum Origin {
    Manifest,
    Pin,
    Package(String),
}

#[derive(Debug, Clone)]
struct ConstraintEntry {
    origin: Origin,
    req: Requirement,
    source: Option<SourceId>,
}

/// One decision on the search stack: the name, the admissible candidates at
/// decision time in preference order, and undo bookkeeping for the currently
/// committed candidate.
struct Frame {
    name: String,
    candidates: Vec<Candidate>,
    current: usize,
    added_constraints: Vec<String>,
    added_names: Vec<String>,
}

/// Snapshot taken at the moment a name ran out of candidates, while the
/// constraint state still reflects the failure.
struct DeadEnd {
    name: String,
    requirement: Requirement,
    chain: Vec<ConflictReason>,
    root: Option<(String, Requirement)>,
}

/// Backtracking solver over one target platform.
pub struct Solver<'a> {
    index: &'a CandidateIndex,
    runtime: &'a RuntimeEnv,
    target: Platform,
    cancel: Option<CancelToken>,
}

struct SearchState {
    constraints: HashMap<String, Vec<ConstraintEntry>>,
    order: Vec<String>,
    in_graph: HashSet<String>,
    assigned: HashMap<String, Candidate>,
}

impl<'a> Solver<'a> {
    pub fn new(index: &'a CandidateIndex, runtime: &'a RuntimeEnv, target: Platform) -> Self {
        Self {
            index,
            runtime,
            target,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn target(&self) -> &Platform {
        &self.target
    }

    /// Resolve the root dependencies. `pins` are extra requirements on names
    /// (reconciler locks, negotiated versions); a pin constrains a name
    /// without forcing it into the graph.
    pub fn solve(&self, roots: &[Dependency], pins: &[(String, Requirement)]) -> Resolution {
        let mut state = SearchState {
            constraints: HashMap::new(),
            order: Vec::new(),
            in_graph: HashSet::new(),
            assigned: HashMap::new(),
        };

        for (name, req) in pins {
            state
                .constraints
                .entry(name.clone())
                .or_default()
                .push(ConstraintEntry {
                    origin: Origin::Pin,
                    req: req.clone(),
                    source: None,
                });
        }
        for dep in roots {
            if !dep.applies_to(&self.target) {
                continue;
            }
            state
                .constraints
                .entry(dep.name.clone())
                .or_default()
                .push(ConstraintEntry {
                    origin: Origin::Manifest,
                    req: dep.req.clone(),
                    source: dep.source.clone(),
                });
            if state.in_graph.insert(dep.name.clone()) {
                state.order.push(dep.name.clone());
            }
        }

        let mut stack: Vec<Frame> = Vec::new();
        let mut first_dead_end: Option<DeadEnd> = None;

        debug!(target = %self.target, roots = state.order.len(), "starting solve");

        loop {
            let next = state
                .order
                .iter()
                .find(|name| !state.assigned.contains_key(*name))
                .cloned();

            let Some(name) = next else {
                let assignment: Assignment = state.assigned.into_iter().collect();
                debug!(target = %self.target, packages = assignment.len(), "solved");
                return Resolution::Solved(assignment);
            };

            let candidates = self.admissible(&name, &state.constraints);
            let mut frame = Frame {
                name: name.clone(),
                candidates,
                current: 0,
                added_constraints: Vec::new(),
                added_names: Vec::new(),
            };

            if self.try_commit(&mut frame, &mut state) {
                stack.push(frame);
                continue;
            }

            self.note_dead_end(&name, &state, &mut first_dead_end);
            match self.backtrack(&mut stack, &mut state, &mut first_dead_end) {
                Backtracked::Retried => {}
                Backtracked::Exhausted => {
                    return Resolution::Conflict(self.build_trace(first_dead_end));
                }
                Backtracked::Cancelled => return Resolution::Cancelled,
            }
        }
    }

    /// Candidates admissible for `name` under the accumulated constraints,
    /// most preferred first: highest version, then most specific compatible
    /// platform (specifics whose runtime requirement excludes the assumed
    /// runtime are filtered out here, which is what lets the generic variant
    /// win in that case), ties broken by platform text.
    fn admissible(
        &self,
        name: &str,
        constraints: &HashMap<String, Vec<ConstraintEntry>>,
    ) -> Vec<Candidate> {
        let entries = match constraints.get(name) {
            Some(entries) => entries,
            None => return Vec::new(),
        };
        let conj = entries
            .iter()
            .fold(Requirement::any(), |acc, e| acc.intersect(&e.req));
        if !conj.is_satisfiable_hint() {
            return Vec::new();
        }
        let pinned_sources: Vec<&SourceId> =
            entries.iter().filter_map(|e| e.source.as_ref()).collect();

        let mut out: Vec<Candidate> = self
            .index
            .candidates(name)
            .iter()
            .filter(|c| c.platform.compatible(&self.target))
            .filter(|c| conj.matches(&c.version))
            .filter(|c| !c.version.is_prerelease() || conj.allows_prerelease())
            .filter(|c| self.runtime.admits(&c.runtime_req))
            .filter(|c| pinned_sources.iter().all(|s| **s == c.source))
            .cloned()
            .collect();

        out.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| b.platform.specificity().cmp(&a.platform.specificity()))
                .then_with(|| a.platform.to_string().cmp(&b.platform.to_string()))
        });
        out
    }

    /// Try candidates from `frame.current` on until one commits cleanly.
    /// Commits push the candidate's dependencies onto the search frontier.
    fn try_commit(&self, frame: &mut Frame, state: &mut SearchState) -> bool {
        while frame.current < frame.candidates.len() {
            let candidate = frame.candidates[frame.current].clone();
            if self.candidate_fits(&candidate, state) {
                trace!(
                    name = %frame.name,
                    chosen = %candidate.lock_name(),
                    "committing candidate"
                );
                for dep in &candidate.deps {
                    if !dep.applies_to(&self.target) {
                        continue;
                    }
                    state
                        .constraints
                        .entry(dep.name.clone())
                        .or_default()
                        .push(ConstraintEntry {
                            origin: Origin::Package(frame.name.clone()),
                            req: dep.req.clone(),
                            source: dep.source.clone(),
                        });
                    frame.added_constraints.push(dep.name.clone());
                    if state.in_graph.insert(dep.name.clone()) {
                        state.order.push(dep.name.clone());
                        frame.added_names.push(dep.name.clone());
                    }
                }
                state.assigned.insert(frame.name.clone(), candidate);
                return true;
            }
            frame.current += 1;
        }
        false
    }

    /// A candidate fits when none of its dependencies contradicts an already
    /// committed choice. A dependency that merely empties the accumulated
    /// requirement of an unassigned name is allowed through here: that name's
    /// own decision point will come up empty, which attributes the dead end
    /// to the right package.
    fn candidate_fits(&self, candidate: &Candidate, state: &SearchState) -> bool {
        for dep in &candidate.deps {
            if !dep.applies_to(&self.target) {
                continue;
            }
            if let Some(chosen) = state.assigned.get(&dep.name) {
                if !dep.req.matches(&chosen.version) {
                    return false;
                }
                if let Some(pin) = &dep.source {
                    if *pin != chosen.source {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn undo_frame(frame: &mut Frame, state: &mut SearchState) {
        state.assigned.remove(&frame.name);
        for dep_name in frame.added_constraints.drain(..).rev() {
            if let Some(entries) = state.constraints.get_mut(&dep_name) {
                entries.pop();
                if entries.is_empty() {
                    state.constraints.remove(&dep_name);
                }
            }
        }
        for new_name in frame.added_names.drain(..).rev() {
            state.in_graph.remove(&new_name);
            if let Some(pos) = state.order.iter().rposition(|n| *n == new_name) {
                state.order.remove(pos);
            }
        }
    }

    /// Undo the most recent choice and advance it to its next candidate,
    /// popping exhausted frames. Returns how the search should proceed.
    fn backtrack(
        &self,
        stack: &mut Vec<Frame>,
        state: &mut SearchState,
        first_dead_end: &mut Option<DeadEnd>,
    ) -> Backtracked {
        loop {
            if self
                .cancel
                .as_ref()
                .is_some_and(CancelToken::is_cancelled)
            {
                return Backtracked::Cancelled;
            }
            let Some(top) = stack.last_mut() else {
                return Backtracked::Exhausted;
            };
            Self::undo_frame(top, state);
            top.current += 1;
            if self.try_commit(top, state) {
                return Backtracked::Retried;
            }
            if let Some(frame) = stack.pop() {
                self.note_dead_end(&frame.name, state, first_dead_end);
            }
        }
    }

    /// Record why `name` has no admissible candidate, keeping the first dead
    /// end as the primary explanation and snapshotting the reason chain while
    /// the constraint state still shows it.
    fn note_dead_end(
        &self,
        name: &str,
        state: &SearchState,
        first_dead_end: &mut Option<DeadEnd>,
    ) {
        if first_dead_end.is_some() {
            return;
        }
        let entries = state.constraints.get(name);
        let requirement = entries
            .map(|list| {
                list.iter()
                    .fold(Requirement::any(), |acc, e| acc.intersect(&e.req))
            })
            .unwrap_or_default();

        let mut chain = Vec::new();
        let mut root = None;
        let mut current = name.to_string();
        let mut visited = HashSet::new();
        while visited.insert(current.clone()) {
            let Some(list) = state.constraints.get(&current) else {
                break;
            };
            let from_package = list.iter().find_map(|e| match &e.origin {
                Origin::Package(dependent) => Some((dependent.clone(), e.req.clone())),
                _ => None,
            });
            if let Some((dependent, requirement)) = from_package {
                chain.push(ConflictReason {
                    dependent: dependent.clone(),
                    requirement,
                    unresolved: current.clone(),
                });
                current = dependent;
            } else if let Some(entry) =
                list.iter().find(|e| e.origin == Origin::Manifest)
            {
                root = Some((current.clone(), entry.req.clone()));
                break;
            } else {
                break;
            }
        }

        *first_dead_end = Some(DeadEnd {
            name: name.to_string(),
            requirement,
            chain,
            root,
        });
    }

    fn build_trace(&self, dead_end: Option<DeadEnd>) -> ConflictTrace {
        let dead_end = dead_end.unwrap_or(DeadEnd {
            name: String::new(),
            requirement: Requirement::any(),
            chain: Vec::new(),
            root: None,
        });
        let near_misses = self
            .index
            .candidates(&dead_end.name)
            .iter()
            .map(|c| NearMiss {
                name: c.name.clone(),
                version: c.version.clone(),
                platform: c.platform.clone(),
            })
            .collect();
        ConflictTrace {
            platform: self.target.clone(),
            unresolved: dead_end.name,
            requirement: dead_end.requirement,
            chain: dead_end.chain,
            root: dead_end.root,
            near_misses,
        }
    }
}

enum Backtracked {
    Retried,
    Exhausted,
    Cancelled,
}
