//! Per-kind providers wiring the engine to the system collaborators

use crate::files::{self, Ownership};
use crate::{exec, pkg, service};
use anyhow::bail;
use converge::{
    Applied, Kind, PackageEnsure, Probe, Provider, ProviderSet, Resource, ResourceSpec,
    ServiceEnsure,
};

fn probe_from_reasons(reasons: Vec<String>) -> Probe {
    if reasons.is_empty() {
        Probe::Matches
    } else {
        Probe::Mismatch { reasons }
    }
}

/// Package kind, backed by the node's package manager.
pub struct PackageProvider {
    backend: Box<dyn pkg::PkgBackend>,
}

impl PackageProvider {
    pub fn new(backend: Box<dyn pkg::PkgBackend>) -> Self {
        Self { backend }
    }
}

impl Provider for PackageProvider {
    fn probe(&self, resource: &Resource) -> anyhow::Result<Probe> {
        let ResourceSpec::Package { ensure } = resource.spec() else {
            bail!("package provider dispatched for {}", resource.id());
        };
        let installed = self.backend.installed_version(&resource.id().name)?;
        Ok(match (ensure, installed) {
            (PackageEnsure::Installed, Some(_)) => Probe::Matches,
            (PackageEnsure::Installed, None) => Probe::mismatch("not installed"),
            (PackageEnsure::Absent, None) => Probe::Matches,
            (PackageEnsure::Absent, Some(v)) => {
                Probe::mismatch(format!("installed at {v}, want absent"))
            }
            (PackageEnsure::Version(want), Some(have)) if &have == want => Probe::Matches,
            (PackageEnsure::Version(want), Some(have)) => {
                Probe::mismatch(format!("version {have}, want {want}"))
            }
            (PackageEnsure::Version(_), None) => Probe::mismatch("not installed"),
        })
    }

    fn apply(&self, resource: &Resource) -> anyhow::Result<Applied> {
        let ResourceSpec::Package { ensure } = resource.spec() else {
            bail!("package provider dispatched for {}", resource.id());
        };
        if self.probe(resource)?.matches() {
            return Ok(Applied::Unchanged);
        }
        let name = &resource.id().name;
        match ensure {
            PackageEnsure::Installed => self.backend.install(name, None)?,
            PackageEnsure::Version(v) => self.backend.install(name, Some(v.as_str()))?,
            PackageEnsure::Absent => self.backend.remove(name)?,
        }
        Ok(Applied::Changed)
    }
}

/// File kind, backed by the filesystem collaborator.
pub struct FileProvider;

impl Provider for FileProvider {
    fn probe(&self, resource: &Resource) -> anyhow::Result<Probe> {
        let ResourceSpec::File {
            path,
            ensure,
            owner,
            group,
            mode,
            content,
        } = resource.spec()
        else {
            bail!("file provider dispatched for {}", resource.id());
        };
        let ownership = Ownership::new(owner.clone(), group.clone());
        let reasons = files::probe_file(path, *ensure, &ownership, *mode, content.as_ref())?;
        Ok(probe_from_reasons(reasons))
    }

    fn apply(&self, resource: &Resource) -> anyhow::Result<Applied> {
        let ResourceSpec::File {
            path,
            ensure,
            owner,
            group,
            mode,
            content,
        } = resource.spec()
        else {
            bail!("file provider dispatched for {}", resource.id());
        };
        let ownership = Ownership::new(owner.clone(), group.clone());
        let changed = files::ensure_file(path, *ensure, &ownership, *mode, content.as_ref())?;
        Ok(if changed { Applied::Changed } else { Applied::Unchanged })
    }
}

/// Directory kind, backed by the filesystem collaborator.
pub struct DirectoryProvider;

impl Provider for DirectoryProvider {
    fn probe(&self, resource: &Resource) -> anyhow::Result<Probe> {
        let ResourceSpec::Directory {
            path,
            owner,
            group,
            mode,
            recurse,
        } = resource.spec()
        else {
            bail!("directory provider dispatched for {}", resource.id());
        };
        let ownership = Ownership::new(owner.clone(), group.clone());
        let reasons = files::probe_dir(path, &ownership, *mode, *recurse)?;
        Ok(probe_from_reasons(reasons))
    }

    fn apply(&self, resource: &Resource) -> anyhow::Result<Applied> {
        let ResourceSpec::Directory {
            path,
            owner,
            group,
            mode,
            recurse,
        } = resource.spec()
        else {
            bail!("directory provider dispatched for {}", resource.id());
        };
        let ownership = Ownership::new(owner.clone(), group.clone());
        let changed = files::ensure_dir(path, &ownership, *mode, *recurse)?;
        Ok(if changed { Applied::Changed } else { Applied::Unchanged })
    }
}

/// Exec kind. A non-refresh-only exec runs once every cycle; the scheduler
/// never probes refresh-only execs at all.
pub struct ExecProvider;

impl Provider for ExecProvider {
    fn probe(&self, resource: &Resource) -> anyhow::Result<Probe> {
        let ResourceSpec::Exec { .. } = resource.spec() else {
            bail!("exec provider dispatched for {}", resource.id());
        };
        Ok(Probe::mismatch("command has not run this cycle"))
    }

    fn apply(&self, resource: &Resource) -> anyhow::Result<Applied> {
        let ResourceSpec::Exec { command, user, .. } = resource.spec() else {
            bail!("exec provider dispatched for {}", resource.id());
        };
        exec::run(command, user.as_deref())?;
        Ok(Applied::Changed)
    }
}

/// Service kind, backed by systemd.
pub struct ServiceProvider;

impl Provider for ServiceProvider {
    fn probe(&self, resource: &Resource) -> anyhow::Result<Probe> {
        let ResourceSpec::Service { ensure, enable } = resource.spec() else {
            bail!("service provider dispatched for {}", resource.id());
        };
        let name = &resource.id().name;
        let mut reasons = Vec::new();
        let active = service::is_active(name)?;
        match ensure {
            ServiceEnsure::Running if !active => reasons.push("not running".to_string()),
            ServiceEnsure::Stopped if active => reasons.push("running, want stopped".to_string()),
            _ => {}
        }
        if *enable != service::is_enabled(name)? {
            reasons.push(if *enable {
                "not enabled".to_string()
            } else {
                "enabled, want disabled".to_string()
            });
        }
        Ok(probe_from_reasons(reasons))
    }

    fn apply(&self, resource: &Resource) -> anyhow::Result<Applied> {
        let ResourceSpec::Service { ensure, enable } = resource.spec() else {
            bail!("service provider dispatched for {}", resource.id());
        };
        let name = &resource.id().name;
        let mut changed = false;
        let active = service::is_active(name)?;
        match ensure {
            ServiceEnsure::Running if !active => {
                service::start(name)?;
                changed = true;
            }
            ServiceEnsure::Stopped if active => {
                service::stop(name)?;
                changed = true;
            }
            _ => {}
        }
        if *enable != service::is_enabled(name)? {
            if *enable {
                service::enable(name)?;
            } else {
                service::disable(name)?;
            }
            changed = true;
        }
        Ok(if changed { Applied::Changed } else { Applied::Unchanged })
    }
}

/// Provider set covering every kind, wired to the live system.
pub fn system() -> crate::error::Result<ProviderSet> {
    let backend = pkg::SystemPkg::detect()?;
    Ok(ProviderSet::new()
        .with(Kind::Package, Box::new(PackageProvider::new(Box::new(backend))))
        .with(Kind::File, Box::new(FileProvider))
        .with(Kind::Directory, Box::new(DirectoryProvider))
        .with(Kind::Exec, Box::new(ExecProvider))
        .with(Kind::Service, Box::new(ServiceProvider)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{Catalog, Options, ResourceId, Status};

    fn fs_providers() -> ProviderSet {
        ProviderSet::new()
            .with(Kind::File, Box::new(FileProvider))
            .with(Kind::Directory, Box::new(DirectoryProvider))
            .with(Kind::Exec, Box::new(ExecProvider))
    }

    fn policy_catalog(root: &std::path::Path, allowed: bool) -> Catalog {
        let policy = root.join("etc/policy.conf").to_string_lossy().into_owned();
        let etc = root.join("etc").to_string_lossy().into_owned();
        let mut catalog = Catalog::new();
        catalog
            .add(Resource::directory(etc.as_str()).build().unwrap())
            .unwrap();
        catalog
            .add(
                Resource::file(policy.as_str())
                    .content_exact(format!("privilegeEscalationAllowed={allowed}\n"))
                    .build()
                    .unwrap()
                    .require(ResourceId::new(Kind::Directory, etc.as_str()))
                    .notify(ResourceId::new(Kind::Exec, "register")),
            )
            .unwrap();
        catalog
            .add(
                Resource::exec("register", "exit 0")
                    .refresh_only(true)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn policy_flag_flip_refreshes_register_exactly_once_per_change() {
        let dir = tempfile::tempdir().unwrap();
        let register = ResourceId::new(Kind::Exec, "register");

        // first run: file is created, registration fires
        let catalog = policy_catalog(dir.path(), false);
        let report = converge::converge(&catalog, &fs_providers(), &Options::default()).unwrap();
        assert!(report.ok());
        let policy_id = &report.entries()[1].id;
        assert_eq!(report.status_of(policy_id), Some(&Status::Changed));
        assert_eq!(report.status_of(&register), Some(&Status::Changed));

        // same declaration again: nothing changes, registration stays quiet
        let report = converge::converge(&catalog, &fs_providers(), &Options::default()).unwrap();
        assert_eq!(report.status_of(policy_id), Some(&Status::Unchanged));
        assert_eq!(report.status_of(&register), Some(&Status::Unchanged));

        // flipped flag: content rewritten, registration fires again
        let catalog = policy_catalog(dir.path(), true);
        let report = converge::converge(&catalog, &fs_providers(), &Options::default()).unwrap();
        assert_eq!(report.status_of(policy_id), Some(&Status::Changed));
        assert_eq!(report.status_of(&register), Some(&Status::Changed));
    }

    #[test]
    fn exec_failure_is_contained_in_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran").to_string_lossy().into_owned();

        let mut catalog = Catalog::new();
        catalog
            .add(Resource::exec("broken", "exit 12").build().unwrap())
            .unwrap();
        catalog
            .add(Resource::exec("touch-marker", format!("touch {marker}")).build().unwrap())
            .unwrap();

        let report = converge::converge(&catalog, &fs_providers(), &Options::default()).unwrap();
        assert!(!report.ok());
        assert!(
            report
                .status_of(&ResourceId::new(Kind::Exec, "broken"))
                .unwrap()
                .is_failed()
        );
        // the independent exec still ran
        assert_eq!(
            report.status_of(&ResourceId::new(Kind::Exec, "touch-marker")),
            Some(&Status::Changed)
        );
        assert!(std::path::Path::new(&marker).exists());
    }
}
