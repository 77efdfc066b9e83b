// src/manifest/mod.rs

//! Manifest parsing
//!
//! The manifest (`pinion.toml`) declares the requested dependencies, the
//! sources they may come from, explicitly requested target platforms, and
//! optional group exclusions. The resolution core consumes the typed form
//! only; everything textual stays in this module.

use crate::error::{Error, Result};
use crate::index::{Dependency, SourceId, SourceKind};
use crate::platform::Platform;
use crate::version::{Requirement, Version};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Default manifest file name.
pub const MANIFEST_NAME: &str = "pinion.toml";

/// A declared source plus the local directory it reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub id: SourceId,
    pub root: PathBuf,
}

/// Typed manifest contents.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub dependencies: Vec<Dependency>,
    pub sources: Vec<SourceConfig>,
    pub requested_platforms: Vec<Platform>,
    pub excluded_groups: BTreeSet<String>,
    pub runtime_version: Option<Version>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    source: Vec<RawSource>,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default, rename = "exclude-groups")]
    exclude_groups: Vec<String>,
    #[serde(default, rename = "runtime-version")]
    runtime_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    kind: String,
    remote: String,
    path: String,
    #[serde(default)]
    revision: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Requirement(String),
    Detailed {
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        groups: Vec<String>,
        #[serde(default)]
        platform: Option<String>,
        /// Remote of a declared source this dependency is pinned to.
        #[serde(default)]
        source: Option<String>,
    },
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::parse(&text, base)
    }

    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let raw: RawManifest =
            toml::from_str(text).map_err(|e| Error::Manifest(e.to_string()))?;

        let mut sources = Vec::new();
        for entry in &raw.source {
            let kind = match entry.kind.to_ascii_lowercase().as_str() {
                "registry" => SourceKind::Registry,
                "git" => SourceKind::Git,
                "path" => SourceKind::Path,
                other => {
                    return Err(Error::Manifest(format!("unknown source kind '{}'", other)));
                }
            };
            if kind == SourceKind::Git && entry.revision.is_none() {
                return Err(Error::Manifest(format!(
                    "git source '{}' requires a revision",
                    entry.remote
                )));
            }
            sources.push(SourceConfig {
                id: SourceId {
                    kind,
                    remote: entry.remote.clone(),
                    revision: entry.revision.clone(),
                },
                root: base_dir.join(&entry.path),
            });
        }
        if sources.is_empty() {
            return Err(Error::Manifest("at least one source is required".to_string()));
        }

        let mut dependencies = Vec::new();
        for (name, raw_dep) in &raw.dependencies {
            dependencies.push(build_dependency(name, raw_dep, &sources)?);
        }

        let mut requested_platforms = Vec::new();
        for text in &raw.platforms {
            requested_platforms.push(Platform::parse(text)?);
        }

        let runtime_version = match &raw.runtime_version {
            Some(text) => Some(Version::parse(text)?),
            None => None,
        };

        Ok(Self {
            dependencies,
            sources,
            requested_platforms,
            excluded_groups: raw.exclude_groups.iter().cloned().collect(),
            runtime_version,
        })
    }

    /// Root dependencies that survive group exclusion. A dependency with no
    /// groups is always kept.
    pub fn runtime_roots(&self) -> Vec<Dependency> {
        self.dependencies
            .iter()
            .filter(|dep| {
                dep.groups.is_empty()
                    || !dep
                        .groups
                        .iter()
                        .all(|group| self.excluded_groups.contains(group))
            })
            .cloned()
            .collect()
    }
}

fn build_dependency(
    name: &str,
    raw: &RawDependency,
    sources: &[SourceConfig],
) -> Result<Dependency> {
    match raw {
        RawDependency::Requirement(req) => {
            Ok(Dependency::new(name, Requirement::parse(req)?))
        }
        RawDependency::Detailed {
            version,
            groups,
            platform,
            source,
        } => {
            let req = match version {
                Some(text) => Requirement::parse(text)?,
                None => Requirement::any(),
            };
            let mut dep = Dependency::new(name, req);
            for group in groups {
                dep = dep.with_group(group);
            }
            if let Some(text) = platform {
                dep = dep.with_platform(Platform::parse(text)?);
            }
            if let Some(remote) = source {
                let declared = sources
                    .iter()
                    .find(|s| &s.id.remote == remote)
                    .ok_or_else(|| {
                        Error::Manifest(format!(
                            "dependency '{}' pins source '{}', which is not declared",
                            name, remote
                        ))
                    })?;
                dep = dep.with_source(declared.id.clone());
            }
            Ok(dep)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
runtime-version = "3.1.2"
platforms = ["x86_64-linux"]
exclude-groups = ["development"]

[[source]]
kind = "registry"
remote = "https://registry.example.org"
path = "registry"

[[source]]
kind = "git"
remote = "https://git.example.org/widgets.git"
path = "checkouts/widgets"
revision = "9f2c1aa"

[dependencies]
frame = "~> 2.0"
widgets = { source = "https://git.example.org/widgets.git" }
linter = { version = ">= 1.0", groups = ["development"] }
native-shim = { platform = "x86_64-linux" }
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::parse(SAMPLE, Path::new("/work")).unwrap();
        assert_eq!(manifest.sources.len(), 2);
        assert_eq!(manifest.dependencies.len(), 4);
        assert_eq!(manifest.requested_platforms.len(), 1);
        assert_eq!(
            manifest.runtime_version,
            Some(Version::parse("3.1.2").unwrap())
        );
        assert_eq!(manifest.sources[0].root, PathBuf::from("/work/registry"));
    }

    #[test]
    fn test_dependency_forms() {
        let manifest = Manifest::parse(SAMPLE, Path::new("/work")).unwrap();
        let frame = manifest
            .dependencies
            .iter()
            .find(|d| d.name == "frame")
            .unwrap();
        assert_eq!(frame.req, Requirement::parse("~> 2.0").unwrap());

        let widgets = manifest
            .dependencies
            .iter()
            .find(|d| d.name == "widgets")
            .unwrap();
        assert_eq!(
            widgets.source.as_ref().unwrap().kind,
            SourceKind::Git
        );

        let shim = manifest
            .dependencies
            .iter()
            .find(|d| d.name == "native-shim")
            .unwrap();
        assert_eq!(
            shim.platform,
            Some(Platform::specific("x86_64", "linux"))
        );
    }

    #[test]
    fn test_group_exclusion() {
        let manifest = Manifest::parse(SAMPLE, Path::new("/work")).unwrap();
        let roots = manifest.runtime_roots();
        assert!(roots.iter().all(|d| d.name != "linter"));
        assert_eq!(roots.len(), 3);
    }

    #[test]
    fn test_rejects_undeclared_pinned_source() {
        let text = r#"
[[source]]
kind = "registry"
remote = "https://registry.example.org"
path = "registry"

[dependencies]
widgets = { source = "https://nowhere.example.org" }
"#;
        assert!(Manifest::parse(text, Path::new(".")).is_err());
    }

    #[test]
    fn test_rejects_git_source_without_revision() {
        let text = r#"
[[source]]
kind = "git"
remote = "https://git.example.org/x.git"
path = "x"
"#;
        assert!(Manifest::parse(text, Path::new(".")).is_err());
    }

    #[test]
    fn test_rejects_missing_sources() {
        assert!(Manifest::parse("[dependencies]\nframe = \"1.0\"\n", Path::new(".")).is_err());
    }
}
