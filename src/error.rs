// src/error.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid version '{input}': {reason}")]
    VersionParse { input: String, reason: String },

    #[error("invalid requirement '{input}': {reason}")]
    RequirementParse { input: String, reason: String },

    #[error("invalid platform '{0}'")]
    PlatformParse(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("source error: {0}")]
    Source(String),

    /// No assignment satisfies the conjoined requirements. Carries the full
    /// conflict trace so the caller can render the reason chain.
    #[error("could not resolve dependencies:\n{0}")]
    Unsatisfiable(crate::resolver::ConflictTrace),

    #[error("resolution cancelled")]
    Cancelled,

    #[error("malformed lockfile at line {line}: {message}")]
    MalformedLockfile { line: usize, message: String },

    /// The lockfile would have to change but the caller forbade writes.
    #[error("the lockfile is out of date, but updates are forbidden in frozen mode: {0}")]
    FrozenLockOutdated(String),

    #[error(
        "integrity mismatch for {name} ({version}): lockfile records {locked}, source reports {fetched}"
    )]
    IntegrityMismatch {
        name: String,
        version: String,
        locked: String,
        fetched: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
