//! Implementation of the `lockwarden run` command.
//!
//! The lock row names the `lockwarden` process, not the command it runs.
//! On Linux the command is therefore bound to its parent with
//! `PR_SET_PDEATHSIG`: if `lockwarden` is killed, the kernel kills the
//! command too, so a waiter that reclaims the lock from the dead owner never
//! overlaps with a still-running command.

use crate::cli::RunArgs;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use std::process::{Command, ExitStatus};

/// Run the given program while holding the lock.
///
/// The program runs at most once, and only after the lock is held. The lock
/// is released whether the program succeeds, fails, or cannot be started.
pub fn cmd_run(ctx: &WardenContext, args: RunArgs) -> Result<()> {
    let command_line = args.command.join(" ");
    let coordinator = ctx.coordinator()?;

    let outcome = coordinator.with_lock(|| {
        tracing::info!(resource = %ctx.resource(), command = %command_line, "running protected command");
        run_protected(&args.command, &command_line)
    })?;

    let status = outcome?;
    if !status.success() {
        return Err(WardenError::OperationFailed {
            command: command_line,
            status: status.to_string(),
        });
    }
    Ok(())
}

fn run_protected(argv: &[String], command_line: &str) -> Result<ExitStatus> {
    protected_command(argv)?
        .status()
        .map_err(|e| WardenError::OperationFailed {
            command: command_line.to_string(),
            status: format!("failed to start: {}", e),
        })
}

/// Build the command for `argv`, tied to the lifetime of the spawning thread.
pub(crate) fn protected_command(argv: &[String]) -> Result<Command> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| WardenError::UserError("no command given to run".to_string()))?;

    let mut command = Command::new(program);
    command.args(rest);
    bind_to_parent(&mut command);
    Ok(command)
}

/// Deliver SIGKILL to the child when the thread that spawned it exits.
#[cfg(target_os = "linux")]
fn bind_to_parent(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    let parent = std::process::id();
    // SAFETY: the hook only calls async-signal-safe functions (prctl,
    // getppid) and allocates nothing before exec.
    unsafe {
        command.pre_exec(move || {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL, 0, 0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            // The parent may have died between fork and prctl.
            if libc::getppid() as u32 != parent {
                return Err(std::io::Error::from_raw_os_error(libc::ESRCH));
            }
            Ok(())
        });
    }
}

// TODO: bind the child on other platforms (a job object on Windows,
// a kqueue NOTE_EXIT watcher on macOS).
#[cfg(not(target_os = "linux"))]
fn bind_to_parent(_command: &mut Command) {}
