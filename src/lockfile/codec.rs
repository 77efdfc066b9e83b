// src/lockfile/codec.rs

//! Lockfile text codec
//!
//! Deterministic, round-trip-stable serialization of a `LockedGraph` to the
//! line-oriented lock format, and a strict parser that rejects structural
//! violations with line context while tolerating cosmetic whitespace.
//!
//! ```text
//! REGISTRY
//!   remote: https://registry.example.org
//!   specs:
//!     frame (2.0.1)
//!       logger (>= 1.0)
//!
//! PLATFORMS
//!   generic
//!   x86_64-linux
//!
//! DEPENDENCIES
//!   frame (~> 2.0)
//!   widgets!
//!
//! CHECKSUMS
//!   frame (2.0.1) sha256:9d0c...
//!
//! PINION VERSION
//!    0.1.0
//! ```

use crate::error::{Error, Result};
use crate::index::{SourceId, SourceKind};
use crate::platform::Platform;
use crate::version::{Requirement, Version};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use super::{
    ChecksumEntry, LockedDependency, LockedGraph, LockedSource, LockedSpec, sort_specs,
};

/// Header of the tool-version section.
pub const TOOL_SECTION: &str = "PINION VERSION";

const PLATFORMS_SECTION: &str = "PLATFORMS";
const DEPENDENCIES_SECTION: &str = "DEPENDENCIES";
const CHECKSUMS_SECTION: &str = "CHECKSUMS";

/// Render a graph to its canonical text form. Output is byte-stable for
/// equal graphs: sources, specs, platforms, dependencies and checksums all
/// serialize under fixed sort keys.
pub fn serialize(graph: &LockedGraph) -> String {
    let mut out = String::new();

    let mut sources = graph.sources.clone();
    sources.sort_by(|a, b| a.id.cmp(&b.id));
    for source in &sources {
        out.push_str(&format!("{}\n", source.id.kind));
        out.push_str(&format!("  remote: {}\n", source.id.remote));
        if let Some(revision) = &source.id.revision {
            out.push_str(&format!("  revision: {}\n", revision));
        }
        out.push_str("  specs:\n");
        let mut specs = source.specs.clone();
        sort_specs(&mut specs);
        for spec in &specs {
            out.push_str(&format!("    {}\n", spec.lock_name()));
            let mut deps = spec.deps.clone();
            deps.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, req) in &deps {
                if req.is_none() {
                    out.push_str(&format!("      {}\n", name));
                } else {
                    out.push_str(&format!("      {} ({})\n", name, req));
                }
            }
        }
        out.push('\n');
    }

    out.push_str(PLATFORMS_SECTION);
    out.push('\n');
    let mut platforms = graph.platforms.clone();
    platforms.sort_by_key(|p| p.to_string());
    platforms.dedup();
    for platform in &platforms {
        out.push_str(&format!("  {}\n", platform));
    }
    out.push('\n');

    out.push_str(DEPENDENCIES_SECTION);
    out.push('\n');
    let mut dependencies = graph.dependencies.clone();
    dependencies.sort_by(|a, b| a.name.cmp(&b.name));
    for dep in &dependencies {
        let mut line = format!("  {}", dep.name);
        if !dep.req.is_none() {
            line.push_str(&format!(" ({})", dep.req));
        }
        if dep.pinned {
            line.push('!');
        }
        out.push_str(&line);
        out.push('\n');
    }
    out.push('\n');

    if !graph.checksums.is_empty() {
        out.push_str(CHECKSUMS_SECTION);
        out.push('\n');
        let mut checksums = graph.checksums.clone();
        checksums.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.version.cmp(&b.version))
                .then_with(|| a.platform.lock_sort_key().cmp(&b.platform.lock_sort_key()))
        });
        for entry in &checksums {
            let spec = LockedSpec {
                name: entry.name.clone(),
                version: entry.version.clone(),
                platform: entry.platform.clone(),
                deps: Vec::new(),
            };
            out.push_str(&format!("  {} {}\n", spec.lock_name(), entry.token));
        }
        out.push('\n');
    }

    for block in &graph.trailing {
        for line in block {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }

    if let Some(version) = &graph.tool_version {
        out.push_str(TOOL_SECTION);
        out.push('\n');
        out.push_str(&format!("   {}\n", version));
    }

    out
}

fn malformed(line: usize, message: impl Into<String>) -> Error {
    Error::MalformedLockfile {
        line: line + 1,
        message: message.into(),
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Parse lockfile text. Structural violations (a source section without its
/// `specs:` delimiter, dependency indentation mismatched to its owning
/// package) fail with line context; unknown trailing sections are preserved
/// verbatim.
pub fn parse(text: &str) -> Result<LockedGraph> {
    let lines: Vec<String> = text.lines().map(|l| l.trim_end().to_string()).collect();
    let mut graph = LockedGraph::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].as_str();
        if line.trim().is_empty() {
            i += 1;
            continue;
        }
        if indent_of(line) != 0 {
            return Err(malformed(i, "unexpected indented line outside any section"));
        }

        if let Ok(kind) = SourceKind::from_str(line) {
            i = parse_source_section(kind, &lines, i + 1, &mut graph.sources)?;
        } else if line == PLATFORMS_SECTION {
            i = parse_platforms(&lines, i + 1, &mut graph.platforms)?;
        } else if line == DEPENDENCIES_SECTION {
            i = parse_dependencies(&lines, i + 1, &mut graph.dependencies)?;
        } else if line == CHECKSUMS_SECTION {
            i = parse_checksums(&lines, i + 1, &mut graph.checksums)?;
        } else if line == TOOL_SECTION {
            i = parse_tool_version(&lines, i + 1, &mut graph.tool_version)?;
        } else {
            i = capture_trailing(&lines, i, &mut graph.trailing);
        }
    }

    Ok(graph)
}

fn parse_source_section(
    kind: SourceKind,
    lines: &[String],
    mut i: usize,
    sources: &mut Vec<LockedSource>,
) -> Result<usize> {
    let remote = match lines.get(i).map(String::as_str) {
        Some(line) if line.starts_with("  remote: ") => {
            line["  remote: ".len()..].to_string()
        }
        _ => return Err(malformed(i, "source section must start with a remote line")),
    };
    i += 1;

    let revision = match lines.get(i).map(String::as_str) {
        Some(line) if line.starts_with("  revision: ") => {
            let rev = line["  revision: ".len()..].to_string();
            i += 1;
            Some(rev)
        }
        _ => None,
    };

    match lines.get(i).map(String::as_str) {
        Some("  specs:") => i += 1,
        _ => return Err(malformed(i, "source section is missing its specs: delimiter")),
    }

    let mut specs: Vec<LockedSpec> = Vec::new();
    while i < lines.len() {
        let line = lines[i].as_str();
        if line.trim().is_empty() {
            i += 1;
            break;
        }
        if indent_of(line) == 0 {
            break;
        }
        match indent_of(line) {
            4 => {
                let (name, version, platform) = parse_spec_name(line.trim_start(), i)?;
                specs.push(LockedSpec {
                    name,
                    version,
                    platform,
                    deps: Vec::new(),
                });
            }
            6 => {
                let Some(spec) = specs.last_mut() else {
                    return Err(malformed(i, "dependency line appears before any package"));
                };
                spec.deps.push(parse_spec_dep(line.trim_start(), i)?);
            }
            _ => {
                return Err(malformed(
                    i,
                    "dependency indentation mismatched to its owning package",
                ));
            }
        }
        i += 1;
    }

    sources.push(LockedSource {
        id: SourceId {
            kind,
            remote,
            revision,
        },
        specs,
    });
    Ok(i)
}

/// Parse `name (version[-platform])` into its parts. Versions never contain
/// dashes, so the first dash inside the parentheses starts the platform tag.
fn parse_spec_name(text: &str, line: usize) -> Result<(String, Version, Platform)> {
    let (name, rest) = text
        .split_once(" (")
        .ok_or_else(|| malformed(line, "expected 'name (version)'"))?;
    let inner = rest
        .strip_suffix(')')
        .ok_or_else(|| malformed(line, "unterminated version"))?;
    let (version_text, platform) = match inner.split_once('-') {
        Some((version_text, platform_text)) => {
            (version_text, Platform::parse(platform_text)?)
        }
        None => (inner, Platform::Generic),
    };
    Ok((name.to_string(), Version::parse(version_text)?, platform))
}

fn parse_spec_dep(text: &str, line: usize) -> Result<(String, Requirement)> {
    match text.split_once(" (") {
        Some((name, rest)) => {
            let req_text = rest
                .strip_suffix(')')
                .ok_or_else(|| malformed(line, "unterminated requirement"))?;
            Ok((name.to_string(), Requirement::parse(req_text)?))
        }
        None => Ok((text.to_string(), Requirement::any())),
    }
}

fn parse_platforms(
    lines: &[String],
    mut i: usize,
    platforms: &mut Vec<Platform>,
) -> Result<usize> {
    while i < lines.len() {
        let line = lines[i].as_str();
        if line.trim().is_empty() {
            i += 1;
            break;
        }
        if indent_of(line) == 0 {
            break;
        }
        if indent_of(line) != 2 {
            return Err(malformed(i, "platform entries must be indented two spaces"));
        }
        platforms.push(Platform::parse(line.trim())?);
        i += 1;
    }
    Ok(i)
}

fn parse_dependencies(
    lines: &[String],
    mut i: usize,
    dependencies: &mut Vec<LockedDependency>,
) -> Result<usize> {
    while i < lines.len() {
        let line = lines[i].as_str();
        if line.trim().is_empty() {
            i += 1;
            break;
        }
        if indent_of(line) == 0 {
            break;
        }
        if indent_of(line) != 2 {
            return Err(malformed(i, "dependency entries must be indented two spaces"));
        }
        let mut text = line.trim();
        let pinned = text.ends_with('!');
        if pinned {
            text = &text[..text.len() - 1];
        }
        let (name, req) = match text.split_once(" (") {
            Some((name, rest)) => {
                let req_text = rest
                    .strip_suffix(')')
                    .ok_or_else(|| malformed(i, "unterminated requirement"))?;
                (name.to_string(), Requirement::parse(req_text)?)
            }
            None => (text.to_string(), Requirement::any()),
        };
        dependencies.push(LockedDependency { name, req, pinned });
        i += 1;
    }
    Ok(i)
}

fn parse_checksums(
    lines: &[String],
    mut i: usize,
    checksums: &mut Vec<ChecksumEntry>,
) -> Result<usize> {
    while i < lines.len() {
        let line = lines[i].as_str();
        if line.trim().is_empty() {
            i += 1;
            break;
        }
        if indent_of(line) == 0 {
            break;
        }
        let text = line.trim();
        let (spec_part, token) = text
            .rsplit_once(") ")
            .ok_or_else(|| malformed(i, "expected 'name (version) token'"))?;
        let (name, version, platform) = parse_spec_name(&format!("{})", spec_part), i)?;
        checksums.push(ChecksumEntry {
            name,
            version,
            platform,
            token: token.to_string(),
        });
        i += 1;
    }
    Ok(i)
}

fn parse_tool_version(
    lines: &[String],
    mut i: usize,
    tool_version: &mut Option<String>,
) -> Result<usize> {
    while i < lines.len() {
        let line = lines[i].as_str();
        if line.trim().is_empty() {
            i += 1;
            continue;
        }
        if indent_of(line) == 0 {
            return Err(malformed(i, "tool version section is missing its value"));
        }
        *tool_version = Some(line.trim().to_string());
        return Ok(i + 1);
    }
    Err(malformed(i.saturating_sub(1), "tool version section is missing its value"))
}

/// Capture an unknown section verbatim: its header plus every following
/// indented line, up to the next top-level header.
fn capture_trailing(lines: &[String], mut i: usize, trailing: &mut Vec<Vec<String>>) -> usize {
    let mut block = vec![lines[i].clone()];
    i += 1;
    while i < lines.len() {
        let line = lines[i].as_str();
        if line.trim().is_empty() {
            i += 1;
            break;
        }
        if indent_of(line) == 0 {
            break;
        }
        block.push(lines[i].clone());
        i += 1;
    }
    trailing.push(block);
    i
}

/// Read and parse a lockfile. `Ok(None)` when the file does not exist.
pub fn read_file(path: &Path) -> Result<Option<LockedGraph>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    parse(&text).map(Some)
}

/// Write a lockfile atomically: serialize to a temp file in the same
/// directory, then rename over the target. Nothing partial ever lands.
pub fn write_file(path: &Path, graph: &LockedGraph) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(serialize(graph).as_bytes())?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
