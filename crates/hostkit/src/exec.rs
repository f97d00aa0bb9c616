//! One-shot command execution
//!
//! Commands run through `sh -c`, optionally as another user via `runuser`.
//! Refresh-only commands never reach this module except through the
//! scheduler's forced path.

use crate::error::{Error, Result};
use std::process::Command;

/// Run a one-shot command, capturing output. Non-zero exit is an error
/// carrying the command's stderr.
pub fn run(command: &str, user: Option<&str>) -> Result<()> {
    log::debug!(
        "running command{}: {command}",
        user.map(|u| format!(" as {u}")).unwrap_or_default()
    );

    let output = match user {
        Some(user) => Command::new("runuser")
            .args(["-u", user, "--", "sh", "-c", command])
            .output()?,
        None => Command::new("sh").args(["-c", command]).output()?,
    };

    if !output.status.success() {
        return Err(Error::Command {
            command: command.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_command_is_ok() {
        run("exit 0", None).unwrap();
    }

    #[test]
    fn failing_command_carries_stderr() {
        let err = run("echo nope >&2; exit 3", None).unwrap_err();
        match err {
            Error::Command { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("expected command error, got {other}"),
        }
    }
}
