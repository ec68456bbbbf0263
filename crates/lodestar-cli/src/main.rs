//! Lodestar CLI: local deploys against SQLite spec storage and a
//! filesystem artifact directory.

mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lodestar", version, about = "Data-pipeline control plane")]
struct Cli {
    /// Path of the workspace database.
    #[arg(long, global = true, default_value = "lodestar.db")]
    db: PathBuf,

    /// Directory compiled artifacts are written into, one subdirectory
    /// per project.
    #[arg(long, global = true, default_value = "dags")]
    artifacts_dir: PathBuf,

    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register (or overwrite) a project.
    RegisterProject {
        name: String,
    },
    /// List registered projects.
    ListProjects,
    /// Deploy every job spec YAML in a directory to a project.
    Deploy {
        #[arg(long)]
        project: String,
        /// Directory of job spec files (*.yaml).
        #[arg(long)]
        path: PathBuf,
    },
    /// List the job specs of a project.
    List {
        #[arg(long)]
        project: String,
    },
    /// Compile one job and print the artifact without deploying.
    Dump {
        #[arg(long)]
        project: String,
        #[arg(long)]
        job: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let service = commands::build_service(&cli.db, &cli.artifacts_dir)?;
    match cli.command {
        Command::RegisterProject { name } => commands::register_project(&service, &name),
        Command::ListProjects => commands::list_projects(&service),
        Command::Deploy { project, path } => commands::deploy(&service, &project, &path).await,
        Command::List { project } => commands::list(&service, &project).await,
        Command::Dump { project, job } => commands::dump(&service, &project, &job).await,
    }
}
