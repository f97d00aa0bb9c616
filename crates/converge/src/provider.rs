//! Provider traits - the seam between the engine and the real system
//!
//! One [`Provider`] per resource kind. Probing inspects live state and must
//! be side-effect-free; applying performs the minimal action to converge and
//! reports whether anything actually changed. Both return `anyhow::Result` so
//! implementations can attach whatever context they have; the scheduler
//! recovers errors into per-resource Failed status.

use crate::error::{Error, Result};
use crate::resource::{Catalog, Kind, Resource};
use std::collections::HashMap;

/// Outcome of probing live state against a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Live state already matches the declaration
    Matches,
    /// Live state differs; reasons are human-readable
    Mismatch { reasons: Vec<String> },
}

impl Probe {
    pub fn mismatch(reason: impl Into<String>) -> Self {
        Probe::Mismatch {
            reasons: vec![reason.into()],
        }
    }

    pub fn matches(&self) -> bool {
        matches!(self, Probe::Matches)
    }
}

/// Outcome of one apply invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Live state was mutated to converge
    Changed,
    /// Nothing needed doing - apply is idempotent
    Unchanged,
}

/// Per-kind prober/applier.
///
/// Implementations must be idempotent: applying twice in a row on an
/// already-converged resource yields `Unchanged` the second time, never an
/// error and never a duplicate side effect. Probing is never invoked for
/// refresh-only resources.
pub trait Provider: Send + Sync {
    fn probe(&self, resource: &Resource) -> anyhow::Result<Probe>;

    fn apply(&self, resource: &Resource) -> anyhow::Result<Applied>;
}

/// Registry of one provider per kind.
#[derive(Default)]
pub struct ProviderSet {
    providers: HashMap<Kind, Box<dyn Provider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the provider for a kind, replacing any previous one.
    pub fn register(&mut self, kind: Kind, provider: Box<dyn Provider>) {
        self.providers.insert(kind, provider);
    }

    pub fn with(mut self, kind: Kind, provider: Box<dyn Provider>) -> Self {
        self.register(kind, provider);
        self
    }

    pub fn get(&self, kind: Kind) -> Option<&dyn Provider> {
        self.providers.get(&kind).map(|p| &**p)
    }

    /// Verify every kind present in the catalog has a provider. Runs before
    /// any probe or apply so a misconfigured run has zero side effects.
    pub fn ensure_covers(&self, catalog: &Catalog) -> Result<()> {
        for resource in catalog.resources() {
            let kind = resource.id().kind;
            if !self.providers.contains_key(&kind) {
                return Err(Error::MissingProvider(kind));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::PackageEnsure;

    struct NullProvider;

    impl Provider for NullProvider {
        fn probe(&self, _resource: &Resource) -> anyhow::Result<Probe> {
            Ok(Probe::Matches)
        }

        fn apply(&self, _resource: &Resource) -> anyhow::Result<Applied> {
            Ok(Applied::Unchanged)
        }
    }

    #[test]
    fn missing_provider_detected_before_run() {
        let mut catalog = Catalog::new();
        catalog
            .add(Resource::package("base-agent", PackageEnsure::Installed).unwrap())
            .unwrap();

        let empty = ProviderSet::new();
        assert!(matches!(
            empty.ensure_covers(&catalog),
            Err(Error::MissingProvider(Kind::Package))
        ));

        let set = ProviderSet::new().with(Kind::Package, Box::new(NullProvider));
        assert!(set.ensure_covers(&catalog).is_ok());
    }
}
