// src/source/mod.rs

//! Candidate sources
//!
//! Sources produce package candidates for the index: a registry source reads
//! per-package JSON index documents, a path source scans a directory tree for
//! package specs, and a git source reads a pinned checkout the same way. All
//! fetching happens here, before the solver runs; the resulting index is
//! read-only.

use crate::error::{Error, Result};
use crate::index::{Candidate, CandidateIndex, Dependency, SourceId};
use crate::manifest::SourceConfig;
use crate::platform::Platform;
use crate::version::{Requirement, Version};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

/// File name a path/git source looks for in each package directory.
pub const SPEC_FILE: &str = "spec.json";

/// A provider of package candidates.
pub trait PackageSource {
    fn id(&self) -> &SourceId;

    /// Every package name this source can provide.
    fn package_names(&self) -> Result<Vec<String>>;

    /// Ordered candidate specs for one package name.
    fn candidates(&self, name: &str) -> Result<Vec<Candidate>>;
}

/// JSON index document: one per package, listing its candidate versions.
#[derive(Debug, Deserialize)]
struct PackageDocument {
    name: String,
    #[serde(default)]
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: String,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    dependencies: Vec<DependencyEntry>,
    /// Runtime versions this candidate supports, e.g. ">= 3.0, < 4".
    #[serde(default)]
    runtime: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DependencyEntry {
    name: String,
    #[serde(default)]
    requirement: Option<String>,
}

fn entry_to_candidate(
    name: &str,
    entry: &VersionEntry,
    source: &SourceId,
) -> Result<Candidate> {
    let mut candidate = Candidate::new(name, Version::parse(&entry.version)?, source.clone());
    if let Some(text) = &entry.platform {
        candidate = candidate.with_platform(Platform::parse(text)?);
    }
    if let Some(text) = &entry.runtime {
        candidate = candidate.with_runtime_req(Requirement::parse(text)?);
    }
    if let Some(token) = &entry.checksum {
        candidate = candidate.with_checksum(token);
    }
    for dep in &entry.dependencies {
        let req = match &dep.requirement {
            Some(text) => Requirement::parse(text)?,
            None => Requirement::any(),
        };
        candidate = candidate.with_dep(Dependency::new(&dep.name, req));
    }
    Ok(candidate)
}

/// Registry source: a directory of `<name>.json` index documents.
pub struct RegistrySource {
    id: SourceId,
    dir: PathBuf,
}

impl RegistrySource {
    pub fn new(id: SourceId, dir: PathBuf) -> Self {
        Self { id, dir }
    }
}

impl PackageSource for RegistrySource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn package_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn candidates(&self, name: &str) -> Result<Vec<Candidate>> {
        let path = self.dir.join(format!("{}.json", name));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path)?;
        let doc: PackageDocument = serde_json::from_str(&text)
            .map_err(|e| Error::Source(format!("{}: {}", path.display(), e)))?;
        if doc.name != name {
            return Err(Error::Source(format!(
                "{}: document names '{}', expected '{}'",
                path.display(),
                doc.name,
                name
            )));
        }
        doc.versions
            .iter()
            .map(|entry| entry_to_candidate(name, entry, &self.id))
            .collect()
    }
}

/// Directory-scan source shared by path and git-checkout sources: walks the
/// root for `spec.json` package descriptions.
pub struct ScanSource {
    id: SourceId,
    root: PathBuf,
}

impl ScanSource {
    pub fn new(id: SourceId, root: PathBuf) -> Self {
        Self { id, root }
    }

    fn documents(&self) -> Result<Vec<(PathBuf, PackageDocument)>> {
        let mut docs = Vec::new();
        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && entry.file_name() == SPEC_FILE {
                let text = std::fs::read_to_string(entry.path())?;
                let doc: PackageDocument = serde_json::from_str(&text).map_err(|e| {
                    Error::Source(format!("{}: {}", entry.path().display(), e))
                })?;
                docs.push((entry.path().to_path_buf(), doc));
            }
        }
        Ok(docs)
    }
}

impl PackageSource for ScanSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn package_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .documents()?
            .into_iter()
            .map(|(_, doc)| doc.name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn candidates(&self, name: &str) -> Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for (path, doc) in self.documents()? {
            if doc.name != name {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let digest = format!("sha256:{}", hex::encode(Sha256::digest(&bytes)));
            for entry in &doc.versions {
                let mut candidate = entry_to_candidate(name, entry, &self.id)?;
                if candidate.checksum.is_none() {
                    candidate = candidate.with_checksum(&digest);
                }
                out.push(candidate);
            }
        }
        Ok(out)
    }
}

/// In-memory source, used by tests and programmatic callers.
pub struct StaticSource {
    id: SourceId,
    candidates: Vec<Candidate>,
}

impl StaticSource {
    pub fn new(id: SourceId, candidates: Vec<Candidate>) -> Self {
        Self { id, candidates }
    }
}

impl PackageSource for StaticSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn package_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> =
            self.candidates.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn candidates(&self, name: &str) -> Result<Vec<Candidate>> {
        Ok(self
            .candidates
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect())
    }
}

/// Instantiate the source a manifest entry describes.
pub fn from_config(config: &SourceConfig) -> Box<dyn PackageSource> {
    match config.id.kind {
        crate::index::SourceKind::Registry => Box::new(RegistrySource::new(
            config.id.clone(),
            config.root.clone(),
        )),
        _ => Box::new(ScanSource::new(config.id.clone(), config.root.clone())),
    }
}

/// Build the read-only candidate index from every configured source.
pub fn build_index(sources: &[Box<dyn PackageSource>]) -> Result<CandidateIndex> {
    let mut index = CandidateIndex::new();
    for source in sources {
        let names = source.package_names()?;
        debug!(source = %source.id(), packages = names.len(), "indexing source");
        for name in names {
            for candidate in source.candidates(&name)? {
                index.add(candidate);
            }
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write_registry_doc(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(format!("{}.json", name)), body).unwrap();
    }

    #[test]
    fn test_registry_source_reads_documents() {
        let tmp = tempfile::tempdir().unwrap();
        write_registry_doc(
            tmp.path(),
            "frame",
            r#"{
                "name": "frame",
                "versions": [
                    {"version": "2.0.1", "dependencies": [{"name": "logger", "requirement": ">= 1.0"}]},
                    {"version": "2.1.0", "platform": "x86_64-linux", "runtime": ">= 3.0"}
                ]
            }"#,
        );

        let source = RegistrySource::new(
            SourceId::registry("https://registry.example.org"),
            tmp.path().to_path_buf(),
        );
        assert_eq!(source.package_names().unwrap(), vec!["frame"]);

        let candidates = source.candidates("frame").unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].deps.len(), 1);
        assert_eq!(
            candidates[1].platform,
            Platform::specific("x86_64", "linux")
        );
        assert!(source.candidates("missing").unwrap().is_empty());
    }

    #[test]
    fn test_registry_source_rejects_name_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        write_registry_doc(tmp.path(), "frame", r#"{"name": "other", "versions": []}"#);
        let source = RegistrySource::new(
            SourceId::registry("https://registry.example.org"),
            tmp.path().to_path_buf(),
        );
        assert!(source.candidates("frame").is_err());
    }

    #[test]
    fn test_scan_source_computes_checksums() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("widgets");
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(
            pkg_dir.join(SPEC_FILE),
            r#"{"name": "widgets", "versions": [{"version": "0.3.0"}]}"#,
        )
        .unwrap();

        let source = ScanSource::new(
            SourceId::git("https://git.example.org/widgets.git", "9f2c1aa"),
            tmp.path().to_path_buf(),
        );
        let candidates = source.candidates("widgets").unwrap();
        assert_eq!(candidates.len(), 1);
        let token = candidates[0].checksum.as_ref().unwrap();
        assert!(token.starts_with("sha256:"));
    }

    #[test]
    fn test_build_index_merges_sources() {
        let registry = SourceId::registry("https://registry.example.org");
        let path_src = SourceId::path("vendor/widgets");
        let sources: Vec<Box<dyn PackageSource>> = vec![
            Box::new(StaticSource::new(
                registry.clone(),
                vec![Candidate::new(
                    "frame",
                    Version::parse("1.0").unwrap(),
                    registry.clone(),
                )],
            )),
            Box::new(StaticSource::new(
                path_src.clone(),
                vec![Candidate::new(
                    "widgets",
                    Version::parse("0.1").unwrap(),
                    path_src.clone(),
                )],
            )),
        ];
        let index = build_index(&sources).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains("frame"));
        assert!(index.contains("widgets"));
    }
}
