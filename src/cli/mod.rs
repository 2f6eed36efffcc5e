//! CLI argument parsing for lockwarden.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lockwarden: database-backed migration lock with stale lock reclamation.
///
/// A single row in a shared SQLite database serializes a protected
/// operation across processes. A lock left behind by a process that no
/// longer exists is reclaimed automatically; a lock held by a running
/// process is never touched.
#[derive(Parser, Debug)]
#[command(name = "lockwarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ./lockwarden.yaml when present).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Protected resource key, overriding the config.
    #[arg(long, global = true, value_name = "KEY")]
    pub resource: Option<String>,

    /// Log filter used when RUST_LOG is not set (e.g. "debug").
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for lockwarden.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the lock table and the unlocked row for the resource.
    ///
    /// Safe to run repeatedly; an existing row is left as it is.
    Init,

    /// Show the lock row and whether its holder is still running.
    Status,

    /// Run a command while holding the lock.
    ///
    /// Waits for the lock (reclaiming it if its holder is gone), runs the
    /// command exactly once, and releases the lock however the command ends.
    Run(RunArgs),

    /// Release the lock regardless of who holds it.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(ClearArgs),

    /// Print the owner identity this process would record.
    Whoami,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Program and arguments to run, after `--`.
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
