// src/main.rs

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pinion::lockfile::{LOCKFILE_NAME, codec};
use pinion::manifest::MANIFEST_NAME;
use pinion::resolver::{ReconcileRequest, reconcile};
use pinion::source::{PackageSource, build_index, from_config};
use pinion::{Error, Manifest, Platform, RuntimeEnv};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "pinion")]
#[command(author, version, about = "Resolve dependencies into a reproducible lockfile", long_about = None)]
struct Cli {
    /// Manifest path
    #[arg(short, long, default_value = MANIFEST_NAME, global = true)]
    manifest: PathBuf,

    /// Lockfile path
    #[arg(short, long, default_value = LOCKFILE_NAME, global = true)]
    lockfile: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the manifest and write the lockfile
    Lock {
        /// Fail instead of writing when the lockfile would change
        #[arg(long)]
        frozen: bool,
        /// Resolve for the generic platform only
        #[arg(long)]
        generic: bool,
    },
    /// Re-resolve the named packages (all of them when none are given)
    Update {
        /// Packages to unlock
        names: Vec<String>,
    },
    /// Manage the locked target platforms
    Platform {
        #[command(subcommand)]
        command: PlatformCommands,
    },
    /// Verify that the lockfile matches the manifest without writing
    Check,
}

#[derive(Subcommand)]
enum PlatformCommands {
    /// Add target platforms and re-resolve minimally
    Add { platforms: Vec<String> },
    /// Remove target platforms
    Remove { platforms: Vec<String> },
}

struct Operation {
    unlock: BTreeSet<String>,
    unlock_all: bool,
    add_platforms: Vec<Platform>,
    remove_platforms: Vec<Platform>,
    force_generic: bool,
    frozen: bool,
    write: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let operation = match cli.command {
        Commands::Lock { frozen, generic } => Operation {
            unlock: BTreeSet::new(),
            unlock_all: false,
            add_platforms: Vec::new(),
            remove_platforms: Vec::new(),
            force_generic: generic,
            frozen,
            write: !frozen,
        },
        Commands::Update { names } => Operation {
            unlock_all: names.is_empty(),
            unlock: names.into_iter().collect(),
            add_platforms: Vec::new(),
            remove_platforms: Vec::new(),
            force_generic: false,
            frozen: false,
            write: true,
        },
        Commands::Platform { command } => match command {
            PlatformCommands::Add { platforms } => Operation {
                unlock: BTreeSet::new(),
                unlock_all: false,
                add_platforms: parse_platforms(&platforms)?,
                remove_platforms: Vec::new(),
                force_generic: false,
                frozen: false,
                write: true,
            },
            PlatformCommands::Remove { platforms } => Operation {
                unlock: BTreeSet::new(),
                unlock_all: false,
                add_platforms: Vec::new(),
                remove_platforms: parse_platforms(&platforms)?,
                force_generic: false,
                frozen: false,
                write: true,
            },
        },
        Commands::Check => Operation {
            unlock: BTreeSet::new(),
            unlock_all: false,
            add_platforms: Vec::new(),
            remove_platforms: Vec::new(),
            force_generic: false,
            frozen: true,
            write: false,
        },
    };

    run(&cli.manifest, &cli.lockfile, operation)
}

fn parse_platforms(texts: &[String]) -> Result<Vec<Platform>> {
    if texts.is_empty() {
        bail!("at least one platform is required");
    }
    texts
        .iter()
        .map(|text| Platform::parse(text).map_err(Into::into))
        .collect()
}

fn run(manifest_path: &PathBuf, lockfile_path: &PathBuf, operation: Operation) -> Result<()> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("failed to load {}", manifest_path.display()))?;

    let sources: Vec<Box<dyn PackageSource>> =
        manifest.sources.iter().map(from_config).collect();
    let index = build_index(&sources)?;

    let runtime = RuntimeEnv::detect(manifest.runtime_version.clone());
    let previous = codec::read_file(lockfile_path)?;

    let mut unlock = operation.unlock;
    if operation.unlock_all {
        if let Some(previous) = &previous {
            unlock.extend(previous.locked_names());
        }
    }

    let request = ReconcileRequest {
        manifest: &manifest,
        index: &index,
        runtime: &runtime,
        previous: previous.as_ref(),
        unlock,
        add_platforms: operation.add_platforms,
        remove_platforms: operation.remove_platforms,
        force_generic: operation.force_generic,
        frozen: operation.frozen,
        cancel: None,
    };

    let outcome = match reconcile(&request) {
        Ok(outcome) => outcome,
        Err(err @ Error::Unsatisfiable(_)) => {
            // The trace is the user-facing explanation; print it verbatim.
            eprintln!("{err}");
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    for platform in &outcome.dropped_platforms {
        eprintln!("warning: no valid assignment for platform {platform}, dropped it");
    }
    if !outcome.relaxed.is_empty() {
        eprintln!(
            "note: locked versions of {} changed beyond what was requested",
            outcome.relaxed.join(", ")
        );
    }

    if outcome.changed && operation.write {
        codec::write_file(lockfile_path, &outcome.graph)?;
        info!(path = %lockfile_path.display(), "lockfile written");
    }
    println!(
        "{} packages locked for {} platforms{}",
        outcome.graph.locked_names().len(),
        outcome.graph.platforms.len(),
        if outcome.changed { "" } else { " (up to date)" }
    );
    Ok(())
}
