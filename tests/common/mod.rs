// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pinion::{
    Candidate, CandidateIndex, Dependency, Platform, Requirement, RuntimeEnv, SourceId, Version,
};

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub fn r(s: &str) -> Requirement {
    Requirement::parse(s).unwrap()
}

pub fn registry() -> SourceId {
    SourceId::registry("https://registry.example.org")
}

pub fn linux() -> Platform {
    Platform::specific("x86_64", "linux")
}

pub fn darwin() -> Platform {
    Platform::specific("arm64", "darwin")
}

/// A generic registry candidate.
pub fn pkg(name: &str, version: &str) -> Candidate {
    Candidate::new(name, v(version), registry())
}

/// A registry candidate with a dependency edge.
pub fn pkg_dep(name: &str, version: &str, dep: &str, req: &str) -> Candidate {
    pkg(name, version).with_dep(Dependency::new(dep, r(req)))
}

pub fn index_of(candidates: Vec<Candidate>) -> CandidateIndex {
    let mut index = CandidateIndex::new();
    for candidate in candidates {
        index.add(candidate);
    }
    index
}

/// Runtime 3.1 on x86_64-linux, the assumed environment for most tests.
pub fn runtime() -> RuntimeEnv {
    RuntimeEnv::new(Some(v("3.1")), linux())
}
