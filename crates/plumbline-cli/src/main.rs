//! Plumbline CLI - inspect a git repository through the object database.

use clap::{Parser, Subcommand};
use commands::{DiffArgs, Output};
use plumbline_odb::{Repository, StatusOptions};
use plumbline_process::GitConfig;
use std::io::{self, Write};
use std::path::PathBuf;

mod commands;
mod logging;

/// Plumbline - typed access to git objects
#[derive(Parser, Debug)]
#[command(name = "plumbline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print command output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Repository directory (default: current directory)
    #[arg(short = 'C', long, global = true)]
    repo: Option<PathBuf>,

    /// Git executable (overrides PLUMBLINE_GIT)
    #[arg(long, global = true)]
    git: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print an object
    Cat {
        /// Revision or object id
        revision: String,
    },

    /// Print the type and size of an object
    Header {
        /// Revision or object id
        revision: String,
        /// Path inside the tree-ish
        #[arg(short, long)]
        path: Option<String>,
    },

    /// List the entries of a tree
    LsTree {
        /// Tree-ish to list
        #[arg(default_value = "HEAD")]
        treeish: String,
        /// Recurse into subtrees
        #[arg(short, long)]
        recursive: bool,
        /// Limit to these paths
        paths: Vec<String>,
    },

    /// Compare two trees, or show what a commit changed
    Diff {
        /// Old side, or the commit to show
        from: String,
        /// New side
        to: Option<String>,
        /// Show only status letters and paths
        #[arg(long)]
        name_status: bool,
        /// Detect copies
        #[arg(long)]
        find_copies: bool,
        /// Limit to these paths
        #[arg(last = true)]
        paths: Vec<String>,
    },

    /// Show working copy status
    Status {
        /// Include ignored files
        #[arg(long)]
        ignored: bool,
        /// Include the stash count
        #[arg(long)]
        show_stash: bool,
        /// List files inside untracked directories
        #[arg(short, long)]
        untracked_all: bool,
    },

    /// List references
    Refs {
        /// Only references under this prefix, e.g. refs/tags
        prefix: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(logging::level_for(cli.verbose), cli.json_logs);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = GitConfig::from_env();
    if let Some(git) = cli.git {
        config.git_path = git;
    }
    let dir = match cli.repo {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let repo = Repository::open(config.with_working_dir(dir));
    let output = if cli.json { Output::Json } else { Output::Text };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = match cli.command {
        Commands::Cat { revision } => commands::cat(&repo, &revision, output, &mut out),
        Commands::Header { revision, path } => {
            commands::header(&repo, &revision, path.as_deref(), output, &mut out)
        }
        Commands::LsTree {
            treeish,
            recursive,
            paths,
        } => commands::ls_tree(&repo, &treeish, recursive, &paths, output, &mut out),
        Commands::Diff {
            from,
            to,
            name_status,
            find_copies,
            paths,
        } => {
            let args = DiffArgs {
                from,
                to,
                name_status,
                find_copies,
                paths,
            };
            commands::diff(&repo, &args, output, &mut out)
        }
        Commands::Status {
            ignored,
            show_stash,
            untracked_all,
        } => {
            let options = StatusOptions {
                ignored,
                show_stash,
                all_untracked: untracked_all,
            };
            commands::status(&repo, &options, output, &mut out)
        }
        Commands::Refs { prefix } => commands::refs(&repo, prefix.as_deref(), output, &mut out),
        Commands::Version => commands::version(&repo, output, &mut out),
    };

    let stats = repo.odb().cache_stats();
    tracing::debug!(hits = stats.hits, misses = stats.misses, "object cache");
    repo.odb().dispose();

    // A closed pipe (e.g. `| head`) is not an error.
    match result {
        Err(e) if is_broken_pipe(&e) => Ok(()),
        other => {
            out.flush()?;
            other
        }
    }
}

fn is_broken_pipe(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
}
