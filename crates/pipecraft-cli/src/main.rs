//! pipecraft CLI tool.

use clap::{Parser, Subcommand};
use pipecraft_config::DocumentKind;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Project, ProjectOptions};

#[derive(Parser)]
#[command(name = "pipecraft")]
#[command(about = "Render pipeline templates and keep the stored pipelines in sync", long_about = None)]
struct Cli {
    /// Pipeline API URL (overrides the backend in pipecraft.kdl)
    #[arg(long, env = "PIPECRAFT_API_URL")]
    api_url: Option<String>,

    /// Project root directory
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Project configuration file [default: <project>/pipecraft.kdl]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Template arguments as a JSON object
    #[arg(long)]
    args: Option<String>,

    /// File containing template arguments as a JSON object
    #[arg(long)]
    args_file: Option<PathBuf>,

    /// Document to render
    #[arg(long, default_value = "pipeline")]
    kind: DocumentKind,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the project and print the document
    Render,
    /// Compare the rendered pipeline with the stored one
    Diff {
        /// Show unchanged properties too
        #[arg(long)]
        full: bool,
        /// Exit with status 1 unless the pipelines fully match
        #[arg(long)]
        exit_code: bool,
    },
    /// Render the project and save it to the backend
    Save {
        /// Print the documents that would be saved without saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the project configuration and dependency manifest
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries documents and diffs.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let project = Project::load(ProjectOptions {
        root: cli.project,
        config: cli.config,
        api_url: cli.api_url,
        args: cli.args,
        args_file: cli.args_file,
    })?;

    match cli.command {
        Commands::Render => {
            commands::render::run(&project, cli.kind)?;
        }
        Commands::Diff { full, exit_code } => {
            let matched = commands::diff::run(&project, cli.kind, full).await?;
            if exit_code && !matched {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Save { dry_run } => {
            commands::save::run(&project, cli.kind, dry_run).await?;
        }
        Commands::Validate => {
            commands::validate::run(&project)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
