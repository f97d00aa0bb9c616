//! OS package manager backend
//!
//! The [`PkgBackend`] trait abstracts the node's package manager, enabling:
//! - Real CLI execution via apt-get/dpkg-query or dnf/rpm
//! - Mock implementations for testing

use crate::error::{Error, Result};
use std::process::Command;

/// Backend trait for package operations.
pub trait PkgBackend: Send + Sync {
    /// Human-readable backend name ("apt", "dnf").
    fn name(&self) -> &'static str;

    /// Version of an installed package, or None when not installed.
    fn installed_version(&self, package: &str) -> Result<Option<String>>;

    /// Install a package, optionally pinned to a version.
    fn install(&self, package: &str, version: Option<&str>) -> Result<()>;

    /// Remove a package.
    fn remove(&self, package: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Apt,
    Dnf,
}

/// Backend that executes the node's real package manager.
pub struct SystemPkg {
    flavor: Flavor,
}

impl SystemPkg {
    /// Detect which package manager drives this node.
    pub fn detect() -> Result<Self> {
        if tool_exists("dpkg-query") && tool_exists("apt-get") {
            Ok(Self { flavor: Flavor::Apt })
        } else if tool_exists("rpm") && tool_exists("dnf") {
            Ok(Self { flavor: Flavor::Dnf })
        } else {
            Err(Error::PkgToolNotFound)
        }
    }

    fn run_checked(&self, tool: &str, args: &[&str], context: &str) -> Result<String> {
        log::debug!("running {tool} {}", args.join(" "));
        let output = Command::new(tool).args(args).output()?;
        if !output.status.success() {
            return Err(Error::PackageManager {
                message: context.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl PkgBackend for SystemPkg {
    fn name(&self) -> &'static str {
        match self.flavor {
            Flavor::Apt => "apt",
            Flavor::Dnf => "dnf",
        }
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        match self.flavor {
            Flavor::Apt => {
                let output = Command::new("dpkg-query")
                    .args(["-W", "-f", "${Status}\t${Version}", package])
                    .output()?;
                if !output.status.success() {
                    // dpkg-query exits non-zero for unknown packages
                    return Ok(None);
                }
                Ok(parse_dpkg_status(&String::from_utf8_lossy(&output.stdout)))
            }
            Flavor::Dnf => {
                let output = Command::new("rpm")
                    .args(["-q", "--qf", "%{VERSION}-%{RELEASE}", package])
                    .output()?;
                if !output.status.success() {
                    return Ok(None);
                }
                let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok((!version.is_empty()).then_some(version))
            }
        }
    }

    fn install(&self, package: &str, version: Option<&str>) -> Result<()> {
        let spec = match (self.flavor, version) {
            (Flavor::Apt, Some(v)) => format!("{package}={v}"),
            (Flavor::Dnf, Some(v)) => format!("{package}-{v}"),
            (_, None) => package.to_string(),
        };
        let tool = match self.flavor {
            Flavor::Apt => "apt-get",
            Flavor::Dnf => "dnf",
        };
        self.run_checked(
            tool,
            &["install", "-y", &spec],
            &format!("install {package}"),
        )?;
        Ok(())
    }

    fn remove(&self, package: &str) -> Result<()> {
        let tool = match self.flavor {
            Flavor::Apt => "apt-get",
            Flavor::Dnf => "dnf",
        };
        self.run_checked(tool, &["remove", "-y", package], &format!("remove {package}"))?;
        Ok(())
    }
}

/// Parse `dpkg-query -W -f '${Status}\t${Version}'` output. A package can be
/// known to dpkg without being installed (config-files state), so the status
/// field matters, not just the exit code.
fn parse_dpkg_status(output: &str) -> Option<String> {
    let (status, version) = output.trim().rsplit_once('\t')?;
    if status.split_whitespace().last() == Some("installed") && !version.is_empty() {
        Some(version.to_string())
    } else {
        None
    }
}

fn tool_exists(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
