// src/platform/mod.rs

//! Target platform descriptions and the candidate/target matching relation
//!
//! A platform is either the distinguished generic marker (source form, any
//! runtime) or a specific tuple of cpu, os and optional qualifiers. Matching
//! is asymmetric: a generic candidate runs everywhere, while a specific
//! candidate only matches targets it agrees with, and a candidate that omits
//! a qualifier subsumes every target value for it.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Text form of the generic marker.
pub const GENERIC: &str = "generic";

/// A target runtime platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// Source form, usable on any target subject to runtime constraints.
    Generic,
    /// A concrete runtime: cpu and os, with optional os version and ABI.
    Specific {
        cpu: String,
        os: String,
        os_version: Option<String>,
        abi: Option<String>,
    },
}

impl Platform {
    pub fn specific(cpu: &str, os: &str) -> Self {
        Platform::Specific {
            cpu: cpu.to_string(),
            os: os.to_string(),
            os_version: None,
            abi: None,
        }
    }

    pub fn with_os_version(mut self, version: &str) -> Self {
        if let Platform::Specific { os_version, .. } = &mut self {
            *os_version = Some(version.to_string());
        }
        self
    }

    pub fn with_abi(mut self, tag: &str) -> Self {
        if let Platform::Specific { abi, .. } = &mut self {
            *abi = Some(tag.to_string());
        }
        self
    }

    /// Parse a platform string: `generic`, `x86_64-linux`, `arm64-darwin-22`
    /// (numeric qualifier = os version), `x86_64-linux-musl` (other
    /// qualifier = ABI).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::PlatformParse(s.to_string()));
        }
        if s == GENERIC {
            return Ok(Platform::Generic);
        }

        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() < 2 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::PlatformParse(s.to_string()));
        }

        let mut os_version = None;
        let mut abi = None;
        for qualifier in &parts[2..] {
            let numeric = qualifier.chars().all(|c| c.is_ascii_digit());
            if numeric {
                if os_version.is_some() {
                    return Err(Error::PlatformParse(s.to_string()));
                }
                os_version = Some(qualifier.to_string());
            } else {
                if abi.is_some() {
                    return Err(Error::PlatformParse(s.to_string()));
                }
                abi = Some(qualifier.to_string());
            }
        }

        Ok(Platform::Specific {
            cpu: parts[0].to_string(),
            os: parts[1].to_string(),
            os_version,
            abi,
        })
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Platform::Generic)
    }

    /// Whether a candidate tagged with `self` can be used on `target`.
    ///
    /// Not symmetric: generic matches every target; a specific candidate
    /// never matches the generic target (which demands source form); between
    /// specifics, os must agree, cpu must agree unless the candidate is
    /// `universal`, and every qualifier the candidate pins must equal the
    /// target's.
    pub fn compatible(&self, target: &Platform) -> bool {
        match (self, target) {
            (Platform::Generic, _) => true,
            (Platform::Specific { .. }, Platform::Generic) => false,
            (
                Platform::Specific {
                    cpu,
                    os,
                    os_version,
                    abi,
                },
                Platform::Specific {
                    cpu: t_cpu,
                    os: t_os,
                    os_version: t_os_version,
                    abi: t_abi,
                },
            ) => {
                if os != t_os {
                    return false;
                }
                if cpu != "universal" && cpu != t_cpu {
                    return false;
                }
                if let Some(v) = os_version {
                    if t_os_version.as_ref() != Some(v) {
                        return false;
                    }
                }
                if let Some(a) = abi {
                    if t_abi.as_ref() != Some(a) {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// How narrowly this platform is pinned down. Used to prefer the most
    /// specific compatible variant of a candidate version.
    pub fn specificity(&self) -> u8 {
        match self {
            Platform::Generic => 0,
            Platform::Specific {
                cpu,
                os_version,
                abi,
                ..
            } => {
                let mut score = 1;
                if cpu != "universal" {
                    score += 1;
                }
                if os_version.is_some() {
                    score += 1;
                }
                if abi.is_some() {
                    score += 1;
                }
                score
            }
        }
    }

    /// Sort key for lockfile spec entries: specifics ascending by
    /// specificity then text, generic last.
    pub fn lock_sort_key(&self) -> (u8, u8, String) {
        let generic_last = u8::from(self.is_generic());
        (generic_last, self.specificity(), self.to_string())
    }

    /// The platform of the executing environment.
    pub fn detect() -> Self {
        Platform::specific(std::env::consts::ARCH, std::env::consts::OS)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Generic => write!(f, "{}", GENERIC),
            Platform::Specific {
                cpu,
                os,
                os_version,
                abi,
            } => {
                write!(f, "{}-{}", cpu, os)?;
                if let Some(v) = os_version {
                    write!(f, "-{}", v)?;
                }
                if let Some(a) = abi {
                    write!(f, "-{}", a)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Platform::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Platform {
        Platform::parse(s).unwrap()
    }

    #[test]
    fn test_parse_generic() {
        assert_eq!(p("generic"), Platform::Generic);
        assert!(p("generic").is_generic());
    }

    #[test]
    fn test_parse_cpu_os() {
        let plat = p("x86_64-linux");
        assert_eq!(
            plat,
            Platform::Specific {
                cpu: "x86_64".to_string(),
                os: "linux".to_string(),
                os_version: None,
                abi: None,
            }
        );
    }

    #[test]
    fn test_parse_numeric_qualifier_is_os_version() {
        let plat = p("arm64-darwin-22");
        assert_eq!(
            plat,
            Platform::specific("arm64", "darwin").with_os_version("22")
        );
    }

    #[test]
    fn test_parse_other_qualifier_is_abi() {
        let plat = p("x86_64-linux-musl");
        assert_eq!(plat, Platform::specific("x86_64", "linux").with_abi("musl"));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(Platform::parse("").is_err());
        assert!(Platform::parse("linux").is_err());
        assert!(Platform::parse("a-b-c-d-e").is_err());
        assert!(Platform::parse("x86_64--linux").is_err());
        assert!(Platform::parse("x86_64-linux-15-22").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["generic", "x86_64-linux", "arm64-darwin-22", "x86_64-linux-musl"] {
            assert_eq!(p(s).to_string(), s);
        }
    }

    #[test]
    fn test_generic_candidate_matches_everything() {
        assert!(Platform::Generic.compatible(&p("x86_64-linux")));
        assert!(Platform::Generic.compatible(&Platform::Generic));
    }

    #[test]
    fn test_specific_candidate_never_matches_generic_target() {
        assert!(!p("x86_64-linux").compatible(&Platform::Generic));
    }

    #[test]
    fn test_specific_matching() {
        let target = p("x86_64-darwin-15");
        assert!(p("x86_64-darwin").compatible(&target));
        assert!(p("x86_64-darwin-15").compatible(&target));
        assert!(!p("x86_64-darwin-14").compatible(&target));
        assert!(!p("arm64-darwin").compatible(&target));
        assert!(!p("x86_64-linux").compatible(&target));
    }

    #[test]
    fn test_universal_cpu_subsumes_target_cpu() {
        assert!(p("universal-darwin").compatible(&p("x86_64-darwin-15")));
        assert!(p("universal-darwin").compatible(&p("arm64-darwin-22")));
        assert!(!p("universal-darwin").compatible(&p("x86_64-linux")));
    }

    #[test]
    fn test_candidate_abi_must_agree() {
        assert!(p("x86_64-linux").compatible(&p("x86_64-linux-musl")));
        assert!(p("x86_64-linux-musl").compatible(&p("x86_64-linux-musl")));
        assert!(!p("x86_64-linux-musl").compatible(&p("x86_64-linux")));
    }

    #[test]
    fn test_matching_is_asymmetric() {
        let wide = p("x86_64-darwin");
        let narrow = p("x86_64-darwin-15");
        assert!(wide.compatible(&narrow));
        assert!(!narrow.compatible(&wide));
    }

    #[test]
    fn test_specificity_ordering() {
        assert_eq!(Platform::Generic.specificity(), 0);
        assert!(p("universal-darwin").specificity() < p("x86_64-darwin").specificity());
        assert!(p("x86_64-darwin").specificity() < p("x86_64-darwin-15").specificity());
    }

    #[test]
    fn test_lock_sort_key_puts_generic_last() {
        let mut platforms = vec![p("x86_64-linux"), Platform::Generic, p("universal-darwin")];
        platforms.sort_by_key(|plat| plat.lock_sort_key());
        assert_eq!(platforms.last(), Some(&Platform::Generic));
        assert_eq!(platforms[0], p("universal-darwin"));
    }
}
