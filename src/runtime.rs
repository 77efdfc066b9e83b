// src/runtime.rs

//! The executing environment, passed through resolution as an explicit input
//! rather than read from ambient global state.

use crate::platform::Platform;
use crate::version::{Requirement, Version};

/// Version and platform of the runtime the resolved graph will execute on.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    /// Declared runtime version; `None` means unknown, which admits every
    /// candidate regardless of its runtime requirement.
    pub version: Option<Version>,
    pub platform: Platform,
}

impl RuntimeEnv {
    pub fn new(version: Option<Version>, platform: Platform) -> Self {
        Self { version, platform }
    }

    /// Detect the running platform; the runtime version comes from the
    /// manifest when declared.
    pub fn detect(declared_version: Option<Version>) -> Self {
        Self {
            version: declared_version,
            platform: Platform::detect(),
        }
    }

    /// Whether a candidate's runtime requirement admits this environment.
    pub fn admits(&self, req: &Requirement) -> bool {
        match &self.version {
            Some(version) => req.matches(version),
            None => true,
        }
    }
}
