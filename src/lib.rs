// src/lib.rs

//! Pinion
//!
//! Multi-platform package dependency resolution with reproducible,
//! fully-pinned lockfiles.
//!
//! # Architecture
//!
//! - Versions: segmented ordering with prerelease semantics, requirement
//!   conjunctions with a pessimistic operator
//! - Platforms: generic (source form) vs. specific candidates, asymmetric
//!   compatibility, deterministic preference order
//! - One version per name: joint resolution negotiates a shared version set,
//!   then each target platform picks its best variant in parallel
//! - Minimal churn: reconciliation pins everything a previous lockfile
//!   already decided, unlocking only what was requested or invalidated

mod error;
pub mod index;
pub mod lockfile;
pub mod manifest;
pub mod platform;
pub mod resolver;
pub mod runtime;
pub mod source;
pub mod version;

pub use error::{Error, Result};
pub use index::{Candidate, CandidateIndex, Dependency, SourceId, SourceKind};
pub use lockfile::{LockedDependency, LockedGraph, LockedSource, LockedSpec};
pub use manifest::Manifest;
pub use platform::Platform;
pub use resolver::{
    Assignment, CancelToken, ConflictTrace, ReconcileOutcome, ReconcileRequest, Resolution,
    Solver, reconcile,
};
pub use runtime::RuntimeEnv;
pub use version::{Requirement, Version};
