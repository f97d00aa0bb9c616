//! Catalog assembly - the suite declaration rendered into engine resources
//!
//! Relationship shape mirrors how the agent actually behaves on a node: the
//! install tree and config files depend on the packages that ship them, and
//! the device-registration command is refresh-only - it runs when the core
//! certificate or the policy file actually changed, and never otherwise.

use crate::config::Config;
use converge::{Catalog, Kind, PackageEnsure, Resource, ResourceId, ServiceEnsure};
use std::path::Path;

const REGISTER_EXEC: &str = "register-device";

/// Render the sudoers entry for the agent account.
fn sudoers_body(user: &str) -> String {
    format!("{user} ALL=(ALL)  NOPASSWD: ALL\nDefaults:{user} !requiretty\n")
}

/// Render the policy file body. The engine treats this as an opaque string;
/// flipping any field is what drives re-registration downstream.
fn policy_body(config: &Config) -> String {
    let mut body = format!("coreServer={}\n", config.core_server);
    if let Some(device_id) = &config.device_id {
        body.push_str(&format!("deviceId={device_id}\n"));
    }
    body.push_str(&format!(
        "privilegeEscalationAllowed={}\n",
        config.privilege_escalation_allowed
    ));
    body
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Build the full desired-state catalog for the agent suite.
pub fn catalog(config: &Config) -> converge::Result<Catalog> {
    let mut catalog = Catalog::new();
    let register = ResourceId::new(Kind::Exec, REGISTER_EXEC);

    let package_ids: Vec<ResourceId> = config
        .packages
        .iter()
        .map(|name| ResourceId::new(Kind::Package, name.as_str()))
        .collect();
    for name in &config.packages {
        catalog.add(Resource::package(name.as_str(), PackageEnsure::Installed)?)?;
    }
    let base = config
        .base_package()
        .map(|name| ResourceId::new(Kind::Package, name));

    // the resident agent daemon ships with the cba package
    if let Some(cba) = config.packages.iter().find(|p| p.contains("cba")) {
        catalog.add(
            Resource::service("cba8", ServiceEnsure::Running, true)?
                .require(ResourceId::new(Kind::Package, cba.as_str())),
        )?;
    }

    // install tree, owned by the agent account
    let root = path_str(&config.install_root);
    let etc = path_str(&config.install_root.join("etc"));
    let certs = path_str(&config.install_root.join("var/cbaroot/certs"));
    let cache = path_str(&config.install_root.join("cache"));

    let mut root_dir = Resource::directory(root.as_str())
        .owner(config.agent_user.as_str())
        .group(config.agent_group.as_str())
        .mode("0755")
        .build()?;
    if let Some(base) = &base {
        root_dir = root_dir.require(base.clone());
    }
    catalog.add(root_dir)?;

    let root_id = ResourceId::new(Kind::Directory, root.as_str());
    for path in [&etc, &certs, &cache] {
        let dir = Resource::directory(path.as_str())
            .owner(config.agent_user.as_str())
            .group(config.agent_group.as_str())
            .mode("0755")
            .recurse(path == &certs)
            .build()?
            .require(root_id.clone());
        catalog.add(dir)?;
    }

    // sudo entry for the agent account; nixsetup and the scanners expect
    // passwordless escalation regardless of the policy flag
    let sudoers_path = format!("/etc/sudoers.d/10_{}", config.agent_user);
    let mut sudoers = Resource::file(sudoers_path.as_str())
        .owner("root")
        .group("root")
        .mode("0440")
        .content_exact(sudoers_body(&config.agent_user))
        .build()?;
    if let Some(base) = &base {
        sudoers = sudoers.require(base.clone());
    }
    catalog.add(sudoers)?;

    // core certificate fetched from the core server at enrollment time
    let cert_path = path_str(
        &config
            .install_root
            .join("var/cbaroot/certs")
            .join(&config.core_cert_name),
    );
    catalog.add(
        Resource::file(cert_path.as_str())
            .owner(config.agent_user.as_str())
            .group(config.agent_group.as_str())
            .mode("0644")
            .content_exact(config.core_cert_pem.as_str())
            .build()?
            .require(ResourceId::new(Kind::Directory, certs.as_str()))
            .notify(register.clone()),
    )?;

    // agent policy - requires the whole package suite
    let policy_path = path_str(&config.install_root.join("etc/policy.conf"));
    let mut policy = Resource::file(policy_path.as_str())
        .owner(config.agent_user.as_str())
        .group(config.agent_group.as_str())
        .mode("0644")
        .content_exact(policy_body(config))
        .build()?
        .require(ResourceId::new(Kind::Directory, etc.as_str()))
        .notify(register.clone());
    for id in &package_ids {
        policy = policy.require(id.clone());
    }
    catalog.add(policy)?;

    // registration runs only when the certificate or policy actually changed
    let mut register_exec = Resource::exec(
        REGISTER_EXEC,
        path_str(&config.install_root.join("bin/ldiscan")),
    )
    .user(config.agent_user.as_str())
    .refresh_only(true)
    .build()?;
    if let Some(base) = &base {
        register_exec = register_exec.require(base.clone());
    }
    catalog.add(register_exec)?;

    log::debug!("assembled suite catalog with {} resources", catalog.len());
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{Content, Graph, ResourceSpec};
    use regex::Regex;

    fn exact_content(catalog: &Catalog, id: &ResourceId) -> String {
        match catalog.get(id).map(Resource::spec) {
            Some(ResourceSpec::File {
                content: Some(Content::Exact(body)),
                ..
            }) => body.clone(),
            other => panic!("expected exact file content for {id}, got {other:?}"),
        }
    }

    #[test]
    fn stock_suite_declares_all_packages_installed() {
        let catalog = catalog(&Config::default()).unwrap();
        for name in [
            "ivanti-software-distribution",
            "ivanti-base-agent",
            "ivanti-pds2",
            "ivanti-schedule",
            "ivanti-inventory",
            "ivanti-vulnerability",
            "ivanti-cba8",
        ] {
            let resource = catalog
                .get(&ResourceId::new(Kind::Package, name))
                .unwrap_or_else(|| panic!("{name} missing from catalog"));
            assert_eq!(
                resource.spec(),
                &ResourceSpec::Package {
                    ensure: PackageEnsure::Installed
                }
            );
        }
    }

    #[test]
    fn sudoers_entry_grants_passwordless_escalation() {
        let catalog = catalog(&Config::default()).unwrap();
        let body = exact_content(
            &catalog,
            &ResourceId::new(Kind::File, "/etc/sudoers.d/10_landesk"),
        );
        let re = Regex::new(r"^landesk\s+ALL=\(ALL\)\s+NOPASSWD:\s+ALL$").unwrap();
        assert!(body.lines().any(|line| re.is_match(line)), "{body}");
        assert!(body.contains("Defaults:landesk !requiretty"));
    }

    #[test]
    fn policy_body_follows_the_escalation_flag() {
        let off = catalog(&Config::default()).unwrap();
        let on = catalog(&Config {
            privilege_escalation_allowed: true,
            ..Config::default()
        })
        .unwrap();

        let policy_id = ResourceId::new(Kind::File, "/opt/landesk/etc/policy.conf");
        let body_off = exact_content(&off, &policy_id);
        let body_on = exact_content(&on, &policy_id);
        assert!(body_off.contains("privilegeEscalationAllowed=false"));
        assert!(body_on.contains("privilegeEscalationAllowed=true"));
        assert_ne!(body_off, body_on);
    }

    #[test]
    fn registration_is_refresh_only_and_subscribed_to_cert_and_policy() {
        let catalog = catalog(&Config::default()).unwrap();
        let register = ResourceId::new(Kind::Exec, REGISTER_EXEC);

        assert!(catalog.get(&register).unwrap().is_refresh_only());
        for path in [
            "/opt/landesk/var/cbaroot/certs/187227ec.0",
            "/opt/landesk/etc/policy.conf",
        ] {
            let source = catalog.get(&ResourceId::new(Kind::File, path)).unwrap();
            assert!(source.notifies().contains(&register), "{path}");
        }
    }

    #[test]
    fn suite_graph_validates_and_orders_packages_first() {
        let catalog = catalog(&Config::default()).unwrap();
        let graph = Graph::build(&catalog).unwrap();

        let pos: std::collections::HashMap<String, usize> = graph
            .order()
            .iter()
            .enumerate()
            .map(|(pos, &i)| (graph.id(i).to_string(), pos))
            .collect();
        let policy = pos["file[/opt/landesk/etc/policy.conf]"];
        for name in Config::default().packages {
            assert!(pos[&format!("package[{name}]")] < policy);
        }
        // the refresh-only exec sits after both of its notification sources
        let register = pos["exec[register-device]"];
        assert!(pos["file[/opt/landesk/var/cbaroot/certs/187227ec.0]"] < register);
        assert!(policy < register);
    }

    #[test]
    fn agent_daemon_is_kept_running_behind_its_package() {
        let catalog = catalog(&Config::default()).unwrap();
        let daemon = catalog
            .get(&ResourceId::new(Kind::Service, "cba8"))
            .unwrap();
        assert_eq!(
            daemon.spec(),
            &ResourceSpec::Service {
                ensure: ServiceEnsure::Running,
                enable: true
            }
        );
        assert_eq!(
            daemon.requires(),
            &[ResourceId::new(Kind::Package, "ivanti-cba8")]
        );
    }

    #[test]
    fn device_id_lands_in_the_policy_body() {
        let config = Config {
            device_id: Some("4c4c4544-0042-3010".to_string()),
            ..Config::default()
        };
        let catalog = catalog(&config).unwrap();
        let body = exact_content(
            &catalog,
            &ResourceId::new(Kind::File, "/opt/landesk/etc/policy.conf"),
        );
        assert!(body.contains("deviceId=4c4c4544-0042-3010"));
    }
}
