// src/resolver/mod.rs

//! Dependency resolution
//!
//! Three layers, bottom up: the backtracking constraint solver for one
//! target platform (`engine`), joint resolution across every target platform
//! under the single-version-per-name rule (`platforms`), and lockfile
//! reconciliation with minimal churn (`reconcile`).

mod conflict;
mod engine;
mod platforms;
mod reconcile;

pub use conflict::{ConflictReason, ConflictTrace, NearMiss};
pub use engine::{Assignment, CancelToken, Resolution, Solver};
pub use platforms::{JointResolution, derive_targets, resolve_joint};
pub use reconcile::{ReconcileOutcome, ReconcileRequest, reconcile};
