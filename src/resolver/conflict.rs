// src/resolver/conflict.rs

//! Conflict traces explaining why resolution failed
//!
//! When the solver exhausts its alternatives it reports the name that ended
//! up with no admissible candidate, the conjoined requirement nothing
//! satisfied, a reason chain from that leaf back to the manifest, and every
//! candidate of the failing name the index knows about, so the rendered
//! message can enumerate near-miss variants.

use crate::platform::Platform;
use crate::version::{Requirement, Version};
use std::fmt;

/// One link in the reason chain: `dependent` requires `requirement` of
/// `unresolved`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReason {
    pub dependent: String,
    pub requirement: Requirement,
    pub unresolved: String,
}

/// A candidate that exists in the index but failed matching.
#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss {
    pub name: String,
    pub version: Version,
    pub platform: Platform,
}

impl fmt::Display for NearMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.platform)
    }
}

/// The full explanation of a failed solve for one target platform.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictTrace {
    /// Target platform being solved when resolution failed.
    pub platform: Platform,
    /// The name with no admissible candidate.
    pub unresolved: String,
    /// The conjoined requirement no candidate satisfied.
    pub requirement: Requirement,
    /// Reasons chained leaf to root.
    pub chain: Vec<ConflictReason>,
    /// The manifest requirement the chain terminates at, when it does.
    pub root: Option<(String, Requirement)>,
    /// Every known candidate of `unresolved`, for near-miss reporting.
    pub near_misses: Vec<NearMiss>,
}

impl fmt::Display for ConflictTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "no candidate for {} matching {} is available for platform {}",
            self.unresolved, self.requirement, self.platform
        )?;
        if self.near_misses.is_empty() {
            writeln!(f, "  the sources carry no versions of {}", self.unresolved)?;
        } else {
            let known: Vec<String> =
                self.near_misses.iter().map(|m| m.to_string()).collect();
            writeln!(f, "  known candidates: {}", known.join(", "))?;
        }
        for reason in &self.chain {
            writeln!(
                f,
                "  every usable version of {} requires {} matching {}, so {} cannot be used",
                reason.dependent, reason.unresolved, reason.requirement, reason.dependent
            )?;
        }
        match &self.root {
            Some((name, requirement)) => write!(
                f,
                "  because the manifest requires {} matching {}, resolution fails",
                name, requirement
            ),
            None => write!(f, "  resolution fails"),
        }
    }
}
