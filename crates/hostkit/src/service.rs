//! Service collaborator - systemd control
//!
//! Probing uses `systemctl is-active`/`is-enabled`, which exit non-zero for
//! inactive/disabled units without that being an error.

use crate::error::{Error, Result};
use std::process::Command;

pub fn is_active(name: &str) -> Result<bool> {
    let output = Command::new("systemctl").args(["is-active", name]).output()?;
    Ok(output.status.success())
}

pub fn is_enabled(name: &str) -> Result<bool> {
    let output = Command::new("systemctl")
        .args(["is-enabled", name])
        .output()?;
    Ok(output.status.success())
}

pub fn start(name: &str) -> Result<()> {
    control("start", name)
}

pub fn stop(name: &str) -> Result<()> {
    control("stop", name)
}

pub fn enable(name: &str) -> Result<()> {
    control("enable", name)
}

pub fn disable(name: &str) -> Result<()> {
    control("disable", name)
}

fn control(verb: &str, name: &str) -> Result<()> {
    log::debug!("systemctl {verb} {name}");
    let output = Command::new("systemctl").args([verb, name]).output()?;
    if !output.status.success() {
        return Err(Error::Command {
            command: format!("systemctl {verb} {name}"),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
