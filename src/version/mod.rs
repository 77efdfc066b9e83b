// src/version/mod.rs

//! Version handling and requirement satisfaction for package dependencies
//!
//! Versions are ordered sequences of dot-separated segments. Numeric segments
//! compare numerically, alphanumeric segments lexically, and an alphanumeric
//! segment always orders below a numeric one, so `1.0.a < 1.0.0`. Missing
//! trailing segments count as zero (`1.0 == 1.0.0`). A version containing any
//! alphanumeric segment is a prerelease and orders below the corresponding
//! release.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One version segment: either a number or an alphanumeric tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Num(u64),
    Alpha(String),
}

impl Segment {
    fn compare(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Num(a), Segment::Num(b)) => a.cmp(b),
            (Segment::Alpha(a), Segment::Alpha(b)) => a.cmp(b),
            // Alphanumeric tags mark prereleases and sort below numbers.
            (Segment::Alpha(_), Segment::Num(_)) => Ordering::Less,
            (Segment::Num(_), Segment::Alpha(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Num(n) => write!(f, "{}", n),
            Segment::Alpha(s) => write!(f, "{}", s),
        }
    }
}

/// A parsed package version.
///
/// Keeps the original text for display, and a canonical segment list
/// (trailing zero segments stripped) for comparison and hashing.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    segments: Vec<Segment>,
}

impl Version {
    /// Parse a version string like `1.2.3`, `3.0.0.alpha.5` or `2.0.0.rc1`.
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::VersionParse {
                input: s.to_string(),
                reason: "empty version".to_string(),
            });
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
            return Err(Error::VersionParse {
                input: s.to_string(),
                reason: "versions may only contain alphanumerics and dots".to_string(),
            });
        }

        let mut segments = Vec::new();
        for piece in raw.split('.') {
            if piece.is_empty() {
                return Err(Error::VersionParse {
                    input: s.to_string(),
                    reason: "empty segment".to_string(),
                });
            }
            // Split runs of digits and letters within a piece, so `rc1`
            // becomes ("rc", 1) and sorts the way humans expect.
            let mut rest = piece;
            while !rest.is_empty() {
                let digits = rest.chars().next().is_some_and(|c| c.is_ascii_digit());
                let run_len = rest
                    .chars()
                    .take_while(|c| c.is_ascii_digit() == digits)
                    .count();
                let (run, tail) = rest.split_at(run_len);
                if digits {
                    let n = run.parse::<u64>().map_err(|e| Error::VersionParse {
                        input: s.to_string(),
                        reason: e.to_string(),
                    })?;
                    segments.push(Segment::Num(n));
                } else {
                    segments.push(Segment::Alpha(run.to_string()));
                }
                rest = tail;
            }
        }

        // Trailing zeros are not significant: 1.0 == 1.0.0.
        while matches!(segments.last(), Some(Segment::Num(0))) && segments.len() > 1 {
            segments.pop();
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    fn from_numeric(segs: &[u64]) -> Self {
        let raw = segs
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        let mut segments: Vec<Segment> = segs.iter().map(|&n| Segment::Num(n)).collect();
        while matches!(segments.last(), Some(Segment::Num(0))) && segments.len() > 1 {
            segments.pop();
        }
        Self { raw, segments }
    }

    /// Canonical segments (trailing zeros stripped).
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// A version is a prerelease when any segment is alphanumeric.
    pub fn is_prerelease(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Alpha(_)))
    }

    /// The smallest version strictly above every `self.x` release: the
    /// numeric prefix with its last-but-one segment incremented.
    ///
    /// `1.2.3` bumps to `1.3`, `1.2` to `2`, `5` to `6`. Used by the
    /// pessimistic operator.
    pub fn bump(&self) -> Version {
        let mut nums: Vec<u64> = Vec::new();
        for seg in &self.segments {
            match seg {
                Segment::Num(n) => nums.push(*n),
                Segment::Alpha(_) => break,
            }
        }
        if nums.is_empty() {
            nums.push(0);
        }
        if nums.len() > 1 {
            nums.pop();
        }
        if let Some(last) = nums.last_mut() {
            *last += 1;
        }
        Version::from_numeric(&nums)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        let zero = Segment::Num(0);
        for i in 0..len {
            let a = self.segments.get(i).unwrap_or(&zero);
            let b = other.segments.get(i).unwrap_or(&zero);
            match a.compare(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Version::parse(s)
    }
}

/// Requirement operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Exact version match
    Eq,
    /// Anything but this version
    NotEq,
    /// Strictly greater
    Gt,
    /// Greater or equal
    GtEq,
    /// Strictly less
    Lt,
    /// Less or equal
    LtEq,
    /// Pessimistic "compatible with": `~> 1.2.3` means `>= 1.2.3, < 1.3`
    Compatible,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "!=",
            Op::Gt => ">",
            Op::GtEq => ">=",
            Op::Lt => "<",
            Op::LtEq => "<=",
            Op::Compatible => "~>",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A conjunction of operator clauses over versions.
///
/// A requirement with zero clauses matches any version. Clauses are stored in
/// canonical order (rendered form, descending) so equal requirements compare
/// and serialize identically regardless of construction order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    clauses: Vec<(Op, Version)>,
}

impl Requirement {
    /// The requirement that matches every version.
    pub fn any() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// An exact-version requirement.
    pub fn exact(version: &Version) -> Self {
        Self::from_clauses(vec![(Op::Eq, version.clone())])
    }

    /// A requirement excluding exactly one version.
    pub fn excluding(version: &Version) -> Self {
        Self::from_clauses(vec![(Op::NotEq, version.clone())])
    }

    fn from_clauses(clauses: Vec<(Op, Version)>) -> Self {
        let mut req = Self { clauses };
        req.canonicalize();
        req
    }

    fn canonicalize(&mut self) {
        self.clauses
            .sort_by(|a, b| clause_string(b).cmp(&clause_string(a)));
        self.clauses.dedup();
    }

    /// Parse a requirement like `>= 1.0, < 2.0`, `~> 1.2.3` or `1.5`
    /// (a bare version means exact).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::any());
        }

        let mut clauses = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::RequirementParse {
                    input: s.to_string(),
                    reason: "empty clause".to_string(),
                });
            }
            let (op, rest) = if let Some(rest) = part.strip_prefix("~>") {
                (Op::Compatible, rest)
            } else if let Some(rest) = part.strip_prefix(">=") {
                (Op::GtEq, rest)
            } else if let Some(rest) = part.strip_prefix("<=") {
                (Op::LtEq, rest)
            } else if let Some(rest) = part.strip_prefix("!=") {
                (Op::NotEq, rest)
            } else if let Some(rest) = part.strip_prefix('>') {
                (Op::Gt, rest)
            } else if let Some(rest) = part.strip_prefix('<') {
                (Op::Lt, rest)
            } else if let Some(rest) = part.strip_prefix('=') {
                (Op::Eq, rest)
            } else {
                (Op::Eq, part)
            };
            clauses.push((op, Version::parse(rest.trim())?));
        }

        Ok(Self::from_clauses(clauses))
    }

    /// True when no clause constrains the version.
    pub fn is_none(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(Op, Version)] {
        &self.clauses
    }

    /// Check whether a version satisfies every clause. Pure and
    /// order-independent over clauses.
    pub fn matches(&self, version: &Version) -> bool {
        self.clauses.iter().all(|(op, v)| match op {
            Op::Eq => version == v,
            Op::NotEq => version != v,
            Op::Gt => version > v,
            Op::GtEq => version >= v,
            Op::Lt => version < v,
            Op::LtEq => version <= v,
            Op::Compatible => version >= v && *version < v.bump(),
        })
    }

    /// Prerelease versions are only admitted when some clause itself names a
    /// prerelease version.
    pub fn allows_prerelease(&self) -> bool {
        self.clauses.iter().any(|(_, v)| v.is_prerelease())
    }

    /// Conjoin two requirements: the result matches exactly the versions
    /// matched by both.
    pub fn intersect(&self, other: &Requirement) -> Requirement {
        let mut clauses = self.clauses.clone();
        clauses.extend(other.clauses.iter().cloned());
        Self::from_clauses(clauses)
    }

    /// Cheap unsatisfiability detection. `false` means the conjunction is
    /// provably empty; `true` means no contradiction was found (not a proof
    /// of satisfiability).
    pub fn is_satisfiable_hint(&self) -> bool {
        // Two distinct exact pins can never both hold; a single exact pin
        // must pass every other clause.
        let exacts: Vec<&Version> = self
            .clauses
            .iter()
            .filter(|(op, _)| *op == Op::Eq)
            .map(|(_, v)| v)
            .collect();
        if let Some(first) = exacts.first() {
            if exacts.iter().any(|v| v != first) {
                return false;
            }
            return self.matches(first);
        }

        // Effective bounds: greatest lower vs least upper.
        let mut lower: Option<(&Version, bool)> = None; // (version, inclusive)
        let mut upper: Option<(&Version, bool)> = None;
        let mut uppers_from_compat: Vec<Version> = Vec::new();
        for (op, v) in &self.clauses {
            match op {
                Op::Gt | Op::GtEq | Op::Compatible => {
                    let inclusive = *op != Op::Gt;
                    if lower.is_none_or(|(lv, _)| v > lv) {
                        lower = Some((v, inclusive));
                    }
                    if *op == Op::Compatible {
                        uppers_from_compat.push(v.bump());
                    }
                }
                Op::Lt | Op::LtEq => {
                    let inclusive = *op == Op::LtEq;
                    if upper.is_none_or(|(uv, _)| v < uv) {
                        upper = Some((v, inclusive));
                    }
                }
                Op::Eq | Op::NotEq => {}
            }
        }
        let upper_owned: Option<(Version, bool)> = {
            let explicit = upper.map(|(v, i)| (v.clone(), i));
            let compat = uppers_from_compat.into_iter().min().map(|v| (v, false));
            match (explicit, compat) {
                (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
                (a, b) => a.or(b),
            }
        };
        if let (Some((lo, lo_inc)), Some((hi, hi_inc))) = (lower, upper_owned.as_ref()) {
            match lo.cmp(hi) {
                Ordering::Greater => return false,
                Ordering::Equal if !(lo_inc && *hi_inc) => return false,
                _ => {}
            }
        }
        true
    }
}

impl Default for Requirement {
    fn default() -> Self {
        Self::any()
    }
}

fn clause_string(clause: &(Op, Version)) -> String {
    format!("{} {}", clause.0, clause.1)
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, ">= 0");
        }
        let parts: Vec<String> = self.clauses.iter().map(clause_string).collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl FromStr for Requirement {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Requirement::parse(s)
    }
}
