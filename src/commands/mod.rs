//! Command implementations for lockwarden.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command works on a [`WardenContext`] resolved from
//! the config file and the global flags.

mod init;
mod run;
mod status;


use crate::cli::{ClearArgs, Cli, Command};
use crate::config::Config;
use crate::context::{Overrides, WardenContext};
use crate::error::{Result, WardenError};
use crate::logging;

pub use init::cmd_init;
pub use run::cmd_run;
pub use status::cmd_status;

/// Dispatch a command to its implementation.
///
/// Loads the config, applies the global overrides, installs logging and
/// routes the command to its handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    let overrides = Overrides {
        resource: cli.resource,
        log_level: cli.log_level,
    };
    WardenContext::apply_overrides(&mut config, &overrides)?;
    logging::init(&config.log_level)?;

    let ctx = WardenContext::new(config);
    match cli.command {
        Command::Init => cmd_init(&ctx),
        Command::Status => cmd_status(&ctx),
        Command::Run(args) => cmd_run(&ctx, args),
        Command::Clear(args) => cmd_clear(&ctx, args),
        Command::Whoami => cmd_whoami(&ctx),
    }
}

/// Release the lock unconditionally.
///
/// For operators only: if the holder is still running, the protected
/// operation may now run twice.
pub fn cmd_clear(ctx: &WardenContext, args: ClearArgs) -> Result<()> {
    // Require --force flag
    if !args.force {
        return Err(WardenError::UserError(format!(
            "refusing to clear lock without --force flag.\n\n\
             Clearing a lock while its holder is still running lets a second\n\
             process start the protected operation concurrently.\n\
             Stale locks of exited processes are reclaimed automatically.\n\n\
             To clear the lock, run:\n  lockwarden --resource {} clear --force",
            ctx.resource()
        )));
    }

    let store = ctx.record_store(ctx.open_store()?);
    let previous = store.read_lock_state()?;
    store.force_release()?;

    if !previous.locked {
        println!("Lock '{}' was not held.", ctx.resource());
        return Ok(());
    }

    println!("Cleared lock: {}", ctx.resource());
    println!();
    println!("Lock details:");
    println!("  Owner:      {}", display_owner(&previous.owner));
    if let Some(granted_at) = previous.granted_at {
        println!("  Granted:    {}", granted_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}

/// Print the owner value this process records when it takes the lock.
pub fn cmd_whoami(ctx: &WardenContext) -> Result<()> {
    let identity = ctx.identity()?;
    println!("{}", identity.encode());
    Ok(())
}

pub(crate) fn display_owner(owner: &str) -> &str {
    if owner.trim().is_empty() {
        "(none)"
    } else {
        owner
    }
}
