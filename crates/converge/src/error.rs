//! Error types for the convergence engine
//!
//! Construction-time and graph-build-time errors are fatal to the whole run:
//! nothing is ever partially applied from a malformed catalog. Apply-time
//! failures are not errors at this level - the scheduler folds them into the
//! run report as per-resource status values.

use crate::resource::{Kind, ResourceId};
use thiserror::Error;

/// Errors that abort a run before any side effect occurs
#[derive(Debug, Error)]
pub enum Error {
    /// Resource construction failed validation
    #[error("invalid resource {id}: {reason}")]
    InvalidResource { id: ResourceId, reason: String },

    /// Two catalog entries share an id
    #[error("duplicate resource id: {0}")]
    DuplicateResource(ResourceId),

    /// The ordering graph contains a cycle
    #[error("dependency cycle among: {}", format_cycle(.members))]
    CyclicDependency { members: Vec<ResourceId> },

    /// An edge names a resource that is not in the catalog
    #[error("{from} references unknown resource {to}")]
    DanglingReference { from: ResourceId, to: ResourceId },

    /// The catalog contains a kind no provider was registered for
    #[error("no provider registered for kind '{0}'")]
    MissingProvider(Kind),
}

fn format_cycle(members: &[ResourceId]) -> String {
    members
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
