//! Implementation of the `lockwarden status` command.

use super::display_owner;
use crate::context::WardenContext;
use crate::coordinator::OwnerState;
use crate::error::Result;

/// Show the lock row and the liveness of its holder. Changes nothing.
pub fn cmd_status(ctx: &WardenContext) -> Result<()> {
    let coordinator = ctx.coordinator()?;
    let status = coordinator.inspect()?;

    println!("Resource:   {}", ctx.resource());
    println!("Database:   {}", ctx.config.database.display());
    println!(
        "Locked:     {}",
        if status.record.locked { "yes" } else { "no" }
    );
    if status.record.locked {
        println!("Owner:      {}", display_owner(&status.record.owner));
        if let Some(granted_at) = status.record.granted_at {
            let age = chrono::Utc::now().signed_duration_since(granted_at);
            println!(
                "Granted:    {} ({} min ago)",
                granted_at.format("%Y-%m-%d %H:%M:%S UTC"),
                age.num_minutes()
            );
        }
    }
    println!("Holder:     {}", describe_owner(&status.owner));

    if matches!(status.owner, OwnerState::Missing | OwnerState::Unparseable(_)) {
        println!();
        println!(
            "Note: this lock will never be reclaimed automatically. If no process is \
             using it, run `lockwarden --resource {} clear --force`.",
            ctx.resource()
        );
    }

    Ok(())
}

/// One-line verdict on the current holder.
pub(crate) fn describe_owner(state: &OwnerState) -> String {
    match state {
        OwnerState::Unlocked => "none".to_string(),
        OwnerState::Active(owner) => format!("running ({})", owner),
        OwnerState::Inactive(owner) => {
            format!("gone ({}); reclaimed on the next acquisition", owner)
        }
        OwnerState::Missing => "unknown: lock is held but no owner is recorded".to_string(),
        OwnerState::Unparseable(err) => format!("unknown: {}", err),
        OwnerState::Unverified(owner, err) => format!("unverified ({}): {}", owner, err),
    }
}
