// src/index/mod.rs

//! Package candidates and the read-only candidate index
//!
//! The index collects every candidate the configured sources know about,
//! keyed by package name. It is built once before a solve and never changes
//! while the solver is running.

use crate::platform::Platform;
use crate::version::{Requirement, Version};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use strum_macros::{Display, EnumString};

/// Where a candidate came from. Variant order matches the lockfile's
/// section order, so the derived `Ord` sorts sources the way they serialize.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString,
)]
pub enum SourceKind {
    #[strum(serialize = "GIT")]
    Git,
    #[strum(serialize = "PATH")]
    Path,
    #[strum(serialize = "REGISTRY")]
    Registry,
}

/// Identity of a source: kind plus remote, and the pinned revision for
/// version-control sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    pub kind: SourceKind,
    pub remote: String,
    pub revision: Option<String>,
}

impl SourceId {
    pub fn registry(remote: &str) -> Self {
        Self {
            kind: SourceKind::Registry,
            remote: remote.to_string(),
            revision: None,
        }
    }

    pub fn git(remote: &str, revision: &str) -> Self {
        Self {
            kind: SourceKind::Git,
            remote: remote.to_string(),
            revision: Some(revision.to_string()),
        }
    }

    pub fn path(remote: &str) -> Self {
        Self {
            kind: SourceKind::Path,
            remote: remote.to_string(),
            revision: None,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{} {} ({})", self.kind, self.remote, rev),
            None => write!(f, "{} {}", self.kind, self.remote),
        }
    }
}

/// A requested dependency: name, version requirement, and the restrictions
/// that scope where and when it applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub name: String,
    pub req: Requirement,
    /// Groups this dependency belongs to; empty means the default group.
    pub groups: BTreeSet<String>,
    /// Restricts the dependency to targets this platform matches.
    pub platform: Option<Platform>,
    /// Forces resolution to one specific source.
    pub source: Option<SourceId>,
}

impl Dependency {
    pub fn new(name: &str, req: Requirement) -> Self {
        Self {
            name: name.to_string(),
            req,
            groups: BTreeSet::new(),
            platform: None,
            source: None,
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.groups.insert(group.to_string());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    /// Whether this dependency participates in a solve for `target`.
    pub fn applies_to(&self, target: &Platform) -> bool {
        match &self.platform {
            None => true,
            Some(restriction) => restriction.compatible(target) || restriction == target,
        }
    }
}

/// One concrete (name, version, platform) package description available from
/// some source. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub version: Version,
    pub platform: Platform,
    pub deps: Vec<Dependency>,
    /// Executing-environment versions this candidate supports.
    pub runtime_req: Requirement,
    pub source: SourceId,
    /// Opaque integrity token, when the source provides one.
    pub checksum: Option<String>,
}

impl Candidate {
    pub fn new(name: &str, version: Version, source: SourceId) -> Self {
        Self {
            name: name.to_string(),
            version,
            platform: Platform::Generic,
            deps: Vec::new(),
            runtime_req: Requirement::any(),
            source,
            checksum: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_dep(mut self, dep: Dependency) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn with_runtime_req(mut self, req: Requirement) -> Self {
        self.runtime_req = req;
        self
    }

    pub fn with_checksum(mut self, token: &str) -> Self {
        self.checksum = Some(token.to_string());
        self
    }

    /// Lockfile identity: `name (version)` or `name (version-platform)`.
    pub fn lock_name(&self) -> String {
        if self.platform.is_generic() {
            format!("{} ({})", self.name, self.version)
        } else {
            format!("{} ({}-{})", self.name, self.version, self.platform)
        }
    }
}

/// Per-name candidate collections gathered from every configured source.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    packages: HashMap<String, Vec<Candidate>>,
}

impl CandidateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, candidate: Candidate) {
        self.packages
            .entry(candidate.name.clone())
            .or_default()
            .push(candidate);
    }

    pub fn candidates(&self, name: &str) -> &[Candidate] {
        self.packages.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Find the candidate a locked spec refers to, if the sources still
    /// carry it.
    pub fn find(
        &self,
        name: &str,
        version: &Version,
        platform: &Platform,
        source: &SourceId,
    ) -> Option<&Candidate> {
        self.candidates(name).iter().find(|c| {
            c.version == *version && c.platform == *platform && c.source == *source
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
