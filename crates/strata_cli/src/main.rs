//! Strata CLI
//!
//! Command-line client for versioned project sync.
//!
//! # Commands
//!
//! - `import` - Put a project under version control
//! - `commit` - Upload the changes since the checked-out version
//! - `get` - Check out a version, from the local cache when possible
//! - `status` - Show the checked-out version and pending changes
//! - `versions` - List the versions of a project
//! - `hash` - Order-independent digest of an ASCII STL mesh
//!
//! Projects are stored in a repository directory (`--repo`) holding the
//! document store and the version registry.

mod commands;

use clap::{Parser, Subcommand};
use commands::{Format, Repository};
use std::path::PathBuf;
use strata_sync_engine::{ResultLayout, DEFAULT_RESULT_FOLDER};
use tracing_subscriber::EnvFilter;

/// Strata command-line project sync.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the repository directory
    #[arg(global = true, short, long)]
    repo: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Result files are siblings of the root document instead of a folder
    #[arg(global = true, long)]
    siblings: bool,

    /// Name of the result folder below `<base>/`
    #[arg(global = true, long, default_value = DEFAULT_RESULT_FOLDER)]
    result_folder: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put a project under version control
    Import {
        /// Root document of the project
        file: PathBuf,

        /// Project name on the model service
        #[arg(short, long)]
        project: String,

        /// Change comment
        #[arg(short, long, default_value = "initial import")]
        message: String,

        /// Leave result files out
        #[arg(long)]
        no_results: bool,
    },

    /// Upload the changes since the checked-out version
    Commit {
        /// Root document of the project
        file: PathBuf,

        /// Project name on the model service
        #[arg(short, long)]
        project: String,

        /// Change comment
        #[arg(short, long)]
        message: String,

        /// Leave result files out (cached results are reported deleted)
        #[arg(long)]
        no_results: bool,
    },

    /// Check out a version
    Get {
        /// Root document of the project
        file: PathBuf,

        /// Project name on the model service
        #[arg(short, long)]
        project: String,

        /// Version label
        #[arg(value_name = "VERSION")]
        target: String,
    },

    /// Show the checked-out version and pending changes
    Status {
        /// Root document of the project
        file: PathBuf,

        /// Project name on the model service
        #[arg(short, long)]
        project: String,

        /// Leave result files out
        #[arg(long)]
        no_results: bool,
    },

    /// List the versions of a project
    Versions {
        /// Project name on the model service
        #[arg(short, long)]
        project: String,
    },

    /// Order-independent digest of an ASCII STL mesh
    Hash {
        /// Mesh file
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = Format::parse(&cli.format)?;
    let results = if cli.siblings {
        ResultLayout::Siblings
    } else {
        ResultLayout::Folder(cli.result_folder.clone())
    };
    let open_repo = || -> Result<Repository, Box<dyn std::error::Error>> {
        let path = cli
            .repo
            .as_deref()
            .ok_or("Repository path required (--repo)")?;
        Ok(Repository::open(path, results.clone())?)
    };

    match &cli.command {
        Commands::Import {
            file,
            project,
            message,
            no_results,
        } => {
            let repo = open_repo()?;
            commands::transfer::import(&repo, file, project, message, !no_results, format)?;
        }
        Commands::Commit {
            file,
            project,
            message,
            no_results,
        } => {
            let repo = open_repo()?;
            commands::transfer::commit(&repo, file, project, message, !no_results, format)?;
        }
        Commands::Get {
            file,
            project,
            target,
        } => {
            let repo = open_repo()?;
            commands::transfer::get(&repo, file, project, target, format)?;
        }
        Commands::Status {
            file,
            project,
            no_results,
        } => {
            let repo = open_repo()?;
            commands::status::status(&repo, file, project, !no_results, format)?;
        }
        Commands::Versions { project } => {
            let repo = open_repo()?;
            commands::status::versions(&repo, project, format)?;
        }
        Commands::Hash { file } => {
            commands::hash::run(file, format)?;
        }
    }

    Ok(())
}
