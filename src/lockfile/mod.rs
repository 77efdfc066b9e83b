// src/lockfile/mod.rs

//! The persisted lockfile model
//!
//! A `LockedGraph` is the fully pinned result of resolution: every locked
//! spec grouped by its source (possibly several platform variants of one
//! name+version), the target platforms the lock is valid for, the originally
//! requested dependencies, optional integrity tokens, and the tool version
//! recorded at lock time. It is only ever mutated by the reconciler and
//! replaced wholesale on a successful lock.

pub mod codec;

use crate::index::{Candidate, Dependency, SourceId};
use crate::platform::Platform;
use crate::resolver::Assignment;
use crate::version::{Requirement, Version};
use std::collections::BTreeMap;

/// Default lockfile name.
pub const LOCKFILE_NAME: &str = "pinion.lock";

/// One pinned spec: a name at an exact version for one platform tag, with
/// the dependency metadata it was published with.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedSpec {
    pub name: String,
    pub version: Version,
    pub platform: Platform,
    pub deps: Vec<(String, Requirement)>,
}

impl LockedSpec {
    /// Lockfile identity: `name (version)` or `name (version-platform)`.
    pub fn lock_name(&self) -> String {
        if self.platform.is_generic() {
            format!("{} ({})", self.name, self.version)
        } else {
            format!("{} ({}-{})", self.name, self.version, self.platform)
        }
    }
}

/// All specs locked from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedSource {
    pub id: SourceId,
    pub specs: Vec<LockedSpec>,
}

/// A requested root dependency as recorded in the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedDependency {
    pub name: String,
    pub req: Requirement,
    /// Source-pinned in the manifest; renders as a trailing `!`.
    pub pinned: bool,
}

/// An integrity token for one locked spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ChecksumEntry {
    pub name: String,
    pub version: Version,
    pub platform: Platform,
    pub token: String,
}

/// The persisted resolution result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LockedGraph {
    pub sources: Vec<LockedSource>,
    pub platforms: Vec<Platform>,
    pub dependencies: Vec<LockedDependency>,
    pub checksums: Vec<ChecksumEntry>,
    pub tool_version: Option<String>,
    /// Unknown trailing sections, preserved verbatim for forward
    /// compatibility. Each block starts with its section header line.
    pub trailing: Vec<Vec<String>>,
}

impl LockedGraph {
    /// Assemble a graph from per-platform assignments and the manifest's
    /// requested dependencies. Specs are deduplicated across platforms and
    /// stored in the codec's canonical order.
    pub fn from_resolution(
        assignments: &BTreeMap<Platform, Assignment>,
        requested: &[Dependency],
        tool_version: &str,
    ) -> Self {
        // Union of chosen candidates across all target platforms.
        let mut by_source: BTreeMap<SourceId, BTreeMap<(String, Version, Platform), LockedSpec>> =
            BTreeMap::new();
        let mut checksums: BTreeMap<(String, Version, Platform), String> = BTreeMap::new();

        for assignment in assignments.values() {
            for candidate in assignment.values() {
                let key = (
                    candidate.name.clone(),
                    candidate.version.clone(),
                    candidate.platform.clone(),
                );
                by_source
                    .entry(candidate.source.clone())
                    .or_default()
                    .entry(key.clone())
                    .or_insert_with(|| spec_from_candidate(candidate));
                if let Some(token) = &candidate.checksum {
                    checksums.entry(key).or_insert_with(|| token.clone());
                }
            }
        }

        let sources = by_source
            .into_iter()
            .map(|(id, specs)| {
                let mut specs: Vec<LockedSpec> = specs.into_values().collect();
                sort_specs(&mut specs);
                LockedSource { id, specs }
            })
            .collect();

        let mut platforms: Vec<Platform> = assignments.keys().cloned().collect();
        platforms.sort_by_key(|p| p.to_string());

        let mut dependencies: Vec<LockedDependency> = requested
            .iter()
            .map(|dep| LockedDependency {
                name: dep.name.clone(),
                req: dep.req.clone(),
                pinned: dep.source.is_some(),
            })
            .collect();
        dependencies.sort_by(|a, b| a.name.cmp(&b.name));
        dependencies.dedup();

        let checksums = checksums
            .into_iter()
            .map(|((name, version, platform), token)| ChecksumEntry {
                name,
                version,
                platform,
                token,
            })
            .collect();

        Self {
            sources,
            platforms,
            dependencies,
            checksums,
            tool_version: Some(tool_version.to_string()),
            trailing: Vec::new(),
        }
    }

    /// Names of every locked spec.
    pub fn locked_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sources
            .iter()
            .flat_map(|s| s.specs.iter().map(|spec| spec.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// All locked variants of a name, with the source each came from.
    pub fn specs_of(&self, name: &str) -> Vec<(&SourceId, &LockedSpec)> {
        self.sources
            .iter()
            .flat_map(|s| {
                s.specs
                    .iter()
                    .filter(|spec| spec.name == name)
                    .map(move |spec| (&s.id, spec))
            })
            .collect()
    }

    /// The locked version of a name, when it is locked. All variants of a
    /// name share one version by construction.
    pub fn locked_version(&self, name: &str) -> Option<&Version> {
        self.specs_of(name).first().map(|(_, spec)| &spec.version)
    }

    /// The checksum recorded for one spec, if any.
    pub fn checksum_of(&self, name: &str, version: &Version, platform: &Platform) -> Option<&str> {
        self.checksums
            .iter()
            .find(|c| c.name == name && c.version == *version && c.platform == *platform)
            .map(|c| c.token.as_str())
    }

    /// Conjunction of every requirement the lock places on `name`: the
    /// requested dependency plus every locked spec that depends on it.
    pub fn requirement_on(&self, name: &str) -> Requirement {
        let mut conj = Requirement::any();
        for dep in &self.dependencies {
            if dep.name == name {
                conj = conj.intersect(&dep.req);
            }
        }
        for source in &self.sources {
            for spec in &source.specs {
                for (dep_name, req) in &spec.deps {
                    if dep_name == name {
                        conj = conj.intersect(req);
                    }
                }
            }
        }
        conj
    }
}

fn spec_from_candidate(candidate: &Candidate) -> LockedSpec {
    let mut deps: Vec<(String, Requirement)> = candidate
        .deps
        .iter()
        .map(|d| (d.name.clone(), d.req.clone()))
        .collect();
    deps.sort_by(|a, b| a.0.cmp(&b.0));
    deps.dedup();
    LockedSpec {
        name: candidate.name.clone(),
        version: candidate.version.clone(),
        platform: candidate.platform.clone(),
        deps,
    }
}

/// Canonical spec order: name, then version, then platform (specifics by
/// ascending specificity, generic last).
pub(crate) fn sort_specs(specs: &mut [LockedSpec]) {
    specs.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.version.cmp(&b.version))
            .then_with(|| a.platform.lock_sort_key().cmp(&b.platform.lock_sort_key()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SourceId;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_from_resolution_dedups_across_platforms() {
        let registry = SourceId::registry("https://registry.example.org");
        let linux = Platform::specific("x86_64", "linux");

        let shared = Candidate::new("frame", v("2.0"), registry.clone());
        let mut generic_assignment = Assignment::new();
        generic_assignment.insert("frame".to_string(), shared.clone());
        let mut linux_assignment = Assignment::new();
        linux_assignment.insert("frame".to_string(), shared.clone());
        linux_assignment.insert(
            "native".to_string(),
            Candidate::new("native", v("1.0"), registry.clone())
                .with_platform(linux.clone())
                .with_checksum("sha256:aa"),
        );

        let mut assignments = BTreeMap::new();
        assignments.insert(Platform::Generic, generic_assignment);
        assignments.insert(linux.clone(), linux_assignment);

        let graph = LockedGraph::from_resolution(
            &assignments,
            &[Dependency::new("frame", Requirement::parse("~> 2.0").unwrap())],
            "0.1.0",
        );

        assert_eq!(graph.sources.len(), 1);
        // frame appears once despite being chosen for both platforms.
        assert_eq!(graph.sources[0].specs.len(), 2);
        assert_eq!(graph.locked_names(), vec!["frame", "native"]);
        assert_eq!(graph.platforms.len(), 2);
        assert_eq!(graph.checksums.len(), 1);
        assert_eq!(graph.tool_version.as_deref(), Some("0.1.0"));
    }

    #[test]
    fn test_requirement_on_conjoins_lock_edges() {
        let registry = SourceId::registry("https://registry.example.org");
        let graph = LockedGraph {
            sources: vec![LockedSource {
                id: registry,
                specs: vec![LockedSpec {
                    name: "frame".to_string(),
                    version: v("2.0"),
                    platform: Platform::Generic,
                    deps: vec![(
                        "logger".to_string(),
                        Requirement::parse(">= 1.0").unwrap(),
                    )],
                }],
            }],
            dependencies: vec![LockedDependency {
                name: "logger".to_string(),
                req: Requirement::parse("< 2.0").unwrap(),
                pinned: false,
            }],
            ..LockedGraph::default()
        };

        let conj = graph.requirement_on("logger");
        assert!(conj.matches(&v("1.5")));
        assert!(!conj.matches(&v("2.0")));
        assert!(!conj.matches(&v("0.9")));
    }

    #[test]
    fn test_spec_sort_order() {
        let mut specs = vec![
            LockedSpec {
                name: "native".to_string(),
                version: v("1.0"),
                platform: Platform::Generic,
                deps: vec![],
            },
            LockedSpec {
                name: "native".to_string(),
                version: v("1.0"),
                platform: Platform::specific("x86_64", "linux"),
                deps: vec![],
            },
            LockedSpec {
                name: "apple".to_string(),
                version: v("3.0"),
                platform: Platform::Generic,
                deps: vec![],
            },
        ];
        sort_specs(&mut specs);
        assert_eq!(specs[0].name, "apple");
        // Specific variant before the generic one.
        assert!(!specs[1].platform.is_generic());
        assert!(specs[2].platform.is_generic());
    }
}
