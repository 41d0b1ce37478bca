//! CLI definitions for TaskMesh.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// TaskMesh CLI.
#[derive(Parser)]
#[command(name = "taskmesh")]
#[command(about = "Component runtime with distributed connection management")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to ~/.taskmesh/config.toml when present)
    #[arg(short, long, global = true, env = "TASKMESH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the process name from the configuration
    #[arg(short, long, global = true)]
    pub name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a stand-alone global component manager
    Gcm {
        /// Address the global manager listens on
        #[arg(long, default_value = "tcp://127.0.0.1:7700")]
        listen: String,

        /// Address the process's local manager listens on
        #[arg(long, default_value = "tcp://127.0.0.1:7701")]
        local_listen: String,
    },

    /// Run a process and the components declared in its configuration
    Process,

    /// Run a process with an interactive management shell
    Shell {
        /// Execute the commands in this file instead of reading stdin
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,

        /// Execute these commands and exit
        #[arg(short = 'e', long)]
        execute: Option<String>,

        /// Seconds `waitfor` blocks (0 checks once, negative waits forever)
        #[arg(long, default_value_t = 20.0, allow_negative_numbers = true)]
        wait: f64,
    },
}
