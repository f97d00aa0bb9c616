//! # Converge
//!
//! A declarative resource convergence engine for a single managed node.
//!
//! The engine consumes an already-resolved, typed [`Catalog`] of desired-state
//! declarations plus the dependency/notification edges between them, and
//! drives the live system toward that state exactly once per resource, in
//! dependency order. Secondary ("refresh-only") actions fire exactly when, and
//! only when, a resource they subscribe to actually changed during the run.
//!
//! ## Core Concepts
//!
//! - **Resource**: one unit of desired state (package, file, directory,
//!   one-shot command, service) with kind-specific attributes
//! - **Catalog**: the full, declaration-ordered set of resources for one run
//! - **Graph**: the validated DAG built from `requires`/`notifies` edges
//! - **Provider**: per-kind prober/applier, the seam to the real system
//! - **RunReport**: ordered per-resource outcome plus an overall success flag
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Catalog, Options, PackageEnsure, ProviderSet, Resource};
//!
//! let mut catalog = Catalog::new();
//! let agent = Resource::package("base-agent", PackageEnsure::Installed)?;
//! let agent_id = agent.id().clone();
//! catalog.add(agent)?;
//! catalog.add(
//!     Resource::file("/etc/agent/agent.conf")
//!         .mode("0644")
//!         .content_exact("managed=true\n")
//!         .build()?
//!         .require(agent_id),
//! )?;
//!
//! // providers: one Provider implementation per kind in the catalog
//! let report = converge::converge(&catalog, &providers, &Options::default())?;
//! assert!(report.ok());
//! ```
//!
//! Construction and graph validation fail fast before any side effect occurs;
//! apply-time failures are folded into the report so one run always surfaces
//! the full blast radius.

pub mod error;
pub mod graph;
pub mod provider;
pub mod report;
pub mod resource;
pub mod scheduler;

// Re-export main types at crate root
pub use error::{Error, Result};
pub use graph::Graph;
pub use provider::{Applied, Probe, Provider, ProviderSet};
pub use report::{ReportEntry, RunReport, Status, Summary};
pub use resource::{
    Catalog, Content, Ensure, Kind, Mode, PackageEnsure, Resource, ResourceId, ResourceSpec,
    ServiceEnsure,
};
pub use scheduler::{Options, converge};
