use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quarry - Python dependency and environment manager
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if started in this directory instead of the current one
    #[arg(long, short = 'C', global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interact with the project's virtualenvs
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },

    /// Spawn a shell within the virtual environment (created if needed)
    Shell,

    /// Run a command inside the project's environment
    Run {
        /// The command and its arguments
        #[arg(
            value_name = "COMMAND",
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum EnvAction {
    /// Activate or create a new virtualenv for the current project
    Use {
        /// Python version or executable to use; "system" deactivates
        #[arg(value_name = "PYTHON")]
        python: String,
    },

    /// Remove a specific virtualenv associated with the project
    Remove {
        /// Virtualenv name, Python version or executable
        #[arg(value_name = "PYTHON")]
        python: String,
    },

    /// List all virtualenvs associated with the current project
    List {
        /// Output the full paths of the virtualenvs
        #[arg(long)]
        full_path: bool,
    },

    /// Display information about the current environment
    Info {
        /// Only display the environment's path
        #[arg(long, short = 'p')]
        path: bool,
    },
}
