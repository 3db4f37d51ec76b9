//! CLI argument definitions for cmirror.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{Language, ProjectBinding};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CMIRROR_GIT_COMMIT"),
    ", built ",
    env!("CMIRROR_BUILD_TIMESTAMP"),
    ")"
);

/// cmirror - Keep a local mirror of an analysis server in sync.
///
/// Declare connections in connections.kdl, then run `cmirror sync` for a bound project.
#[derive(Parser, Debug)]
#[command(name = "cmirror")]
#[command(author, version, long_version = LONG_VERSION, about = "Keep a local mirror of an analysis server's findings, plugins and settings in sync", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Log debug messages (overridden by CMIRROR_LOG)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Root directory of the mirrors. Can also be set via CMIRROR_DATA_DIR.
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path of connections.kdl. Can also be set via CMIRROR_CONFIG.
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// A project of a declared connection, on one branch.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Connection id, as declared in connections.kdl
    #[arg(long)]
    pub connection: String,

    /// Project key on the server
    #[arg(long)]
    pub project: String,

    /// Branch to mirror
    #[arg(long)]
    pub branch: String,
}

/// Path prefixes of a binding between an IDE workspace and a server project.
#[derive(Args, Debug, Clone, Default)]
pub struct BindingArgs {
    /// Prefix of the project files in the IDE workspace
    #[arg(long, default_value = "")]
    pub ide_prefix: String,

    /// Prefix of the project files on the server
    #[arg(long, default_value = "")]
    pub server_prefix: String,
}

impl BindingArgs {
    pub fn binding(&self, project_key: &str) -> ProjectBinding {
        ProjectBinding::new(project_key, self.server_prefix.as_str(), self.ide_prefix.as_str())
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronize server info, plugins, analyzer configuration and findings of a project
    Sync {
        #[command(flatten)]
        target: ProjectArgs,

        /// Enabled language (repeat or comma-separate, e.g. -l java,js)
        #[arg(short = 'l', long = "language", required = true, value_delimiter = ',')]
        languages: Vec<Language>,

        /// Key of a plugin embedded in the local engine (repeatable)
        #[arg(long = "embedded-plugin", value_delimiter = ',')]
        embedded_plugins: Vec<String>,

        /// Query server info even when it is cached
        #[arg(long)]
        force_server_info: bool,
    },

    /// Refresh the issues of one file (servers without the pull endpoint only)
    RefreshFile {
        #[command(flatten)]
        target: ProjectArgs,

        #[command(flatten)]
        binding: BindingArgs,

        /// File path in the IDE workspace
        #[arg(long)]
        ide_path: String,
    },

    /// Show what is mirrored for a connection (no network access)
    Status {
        /// Connection id, as declared in connections.kdl
        #[arg(long)]
        connection: String,

        /// Only show this project
        #[arg(long)]
        project: Option<String>,

        /// Only show this branch
        #[arg(long)]
        branch: Option<String>,
    },

    /// List the mirrored findings of an IDE file (no network access)
    Findings {
        #[command(flatten)]
        target: ProjectArgs,

        #[command(flatten)]
        binding: BindingArgs,

        /// File path in the IDE workspace
        #[arg(long)]
        ide_path: String,
    },
}
