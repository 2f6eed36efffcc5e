//! Implementation of the `lockwarden init` command.
//!
//! Creates the lock table in the configured database and the unlocked row
//! for the configured resource. The command is idempotent: an existing row,
//! held or not, is left untouched.

use crate::context::WardenContext;
use crate::error::Result;

/// Execute the `lockwarden init` command.
pub fn cmd_init(ctx: &WardenContext) -> Result<()> {
    let store = ctx.open_store()?;
    let created = store.bootstrap(ctx.resource())?;

    if created {
        tracing::info!(resource = %ctx.resource(), database = %ctx.config.database.display(), "created lock row");
        println!(
            "Initialized lock '{}' in {}",
            ctx.resource(),
            ctx.config.database.display()
        );
    } else {
        println!(
            "Lock '{}' already exists in {}",
            ctx.resource(),
            ctx.config.database.display()
        );
    }

    Ok(())
}
