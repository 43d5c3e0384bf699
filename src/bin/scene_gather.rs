//! scene-gather CLI
//!
//! Scan, resolve, gather and publish project documents from the command line.
//! Results are printed to stdout as JSON; logs go to stderr.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `SCENE_GATHER_CONFIG`: JSON configuration file
//! - `SCENE_GATHER_VERIFIED_COPY`: override `verified_copy`
//! - `RUST_LOG`: Log level filter (default: scene_gather=info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for humans (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! cargo run --features cli -- gather shots/sh010.project /tmp/sh010_gathered
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scene_gather::{
    CullSpec, GatherConfig, GatherError, GatherOptions, GatherPipeline, LocalLibrarian,
    ProjectFileHost, PublishOrchestrator, ReferenceScanner,
};

#[derive(Debug, Parser)]
#[command(name = "scene-gather", version, about = "Gather and publish project documents")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "SCENE_GATHER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the files one document references.
    Scan {
        /// Document to scan.
        document: PathBuf,
    },
    /// Resolve every file reachable from a root document.
    Deps {
        /// Root document.
        document: PathBuf,
    },
    /// Copy a project and its dependencies into a directory.
    Gather {
        /// Root document.
        project: PathBuf,
        /// Existing destination directory.
        dest: PathBuf,
        /// Write absolute paths instead of placeholder-relative ones.
        #[arg(long)]
        absolute: bool,
        /// Verify every copy by checksum.
        #[arg(long)]
        verify: bool,
        /// Leave files already inside a repository where they are.
        #[arg(long)]
        skip_published: bool,
        /// Repository as NAME=ROOT (repeatable).
        #[arg(long = "repo-root", value_parser = parse_repo)]
        repo_roots: Vec<(String, PathBuf)>,
        /// Restrict --skip-published to these repositories.
        #[arg(long = "repo")]
        repos: Vec<String>,
    },
    /// Publish a document as an asset.
    Publish {
        /// Unit document; its file stem is the asset name.
        unit: PathBuf,
        /// Repository as NAME=ROOT (repeatable, first is the default).
        #[arg(long = "repo-root", value_parser = parse_repo, required = true)]
        repo_roots: Vec<(String, PathBuf)>,
        /// Parent directory for scratch gathers.
        #[arg(long)]
        scratch: PathBuf,
        /// Target repository (default: the first --repo-root).
        #[arg(long)]
        repo: Option<String>,
        /// Replace the unit document with a reference once published.
        #[arg(long)]
        as_reference: bool,
    },
}

fn parse_repo(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, root)) if !name.is_empty() && !root.is_empty() => {
            Ok((name.to_string(), PathBuf::from(root)))
        }
        _ => Err(format!("expected NAME=ROOT, got '{}'", value)),
    }
}

/// Initialize the tracing subscriber with pretty or JSON format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scene_gather=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&Path>) -> scene_gather::Result<GatherConfig> {
    match path {
        Some(path) => {
            let mut config = GatherConfig::from_file(path)?;
            config.apply_env_overrides()?;
            Ok(config)
        }
        None => GatherConfig::from_env(),
    }
}

fn librarian(roots: &[(String, PathBuf)], scratch: PathBuf) -> Option<LocalLibrarian> {
    let ((default, root), rest) = roots.split_first()?;
    let librarian = LocalLibrarian::new(default.clone(), root.clone(), scratch);
    Some(
        rest.iter()
            .fold(librarian, |lib, (name, root)| lib.with_repo(name.clone(), root.clone())),
    )
}

fn print_json<T: Serialize>(value: &T) -> scene_gather::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| GatherError::Config(format!("cannot render output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn run(cli: Cli) -> scene_gather::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Scan { document } => {
            let result = ReferenceScanner::from_config(&config).scan(&document)?;
            print_json(&result)
        }
        Command::Deps { document } => {
            let pipeline = GatherPipeline::new(&config)?;
            let deps = pipeline.resolver().resolve_transitive(&document)?;
            print_json(&deps)
        }
        Command::Gather {
            project,
            dest,
            absolute,
            verify,
            skip_published,
            repo_roots,
            repos,
        } => {
            let pipeline = GatherPipeline::new(&config)?;
            let mut options = GatherOptions::from_config(&config);
            options.relative = options.relative && !absolute;
            options.verify = options.verify || verify;

            let library = librarian(&repo_roots, std::env::temp_dir());
            if skip_published && library.is_none() {
                return Err(GatherError::Config(
                    "--skip-published needs at least one --repo-root".to_string(),
                ));
            }
            let cull = match (&library, skip_published) {
                (Some(library), true) => Some(CullSpec {
                    librarian: library,
                    repos: (!repos.is_empty()).then_some(repos.as_slice()),
                }),
                _ => None,
            };

            let manifest = pipeline.gather_project(&project, &dest, &options, cull)?;
            print_json(&manifest)
        }
        Command::Publish {
            unit,
            repo_roots,
            scratch,
            repo,
            as_reference,
        } => {
            let library = librarian(&repo_roots, scratch).ok_or_else(|| {
                GatherError::Config("publish needs at least one --repo-root".to_string())
            })?;
            let host = ProjectFileHost::from_config(&config);
            let mut orchestrator = PublishOrchestrator::new(config, &library, &host)?;

            let receipt = if as_reference {
                orchestrator.publish_as_reference(&unit, repo.as_deref())?
            } else {
                orchestrator.publish(&unit, repo.as_deref())?
            };
            print_json(&receipt)
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.code();
            tracing::error!(code = %code, error = %e, "command failed");
            let body = serde_json::json!({
                "code": code.to_string(),
                "message": e.to_string(),
            });
            eprintln!("{}", body);
            // Exit status is the code class: 1 precondition .. 5 config.
            ExitCode::from((code.as_u16() / 100) as u8)
        }
    }
}
