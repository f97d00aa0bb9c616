//! Convergence scheduler - topological walk with refresh propagation
//!
//! Walks the validated graph in dependency order, applies each resource at
//! most once, and delivers refresh signals along notify edges immediately
//! after a source finishes Changed - before the target's own slot, never as a
//! separate later pass. A failure aborts only its own downstream dependents;
//! independent branches run to completion so one report carries the full
//! blast radius.

use crate::error::Result;
use crate::graph::Graph;
use crate::provider::{Applied, Probe, Provider, ProviderSet};
use crate::report::{RunReport, Status};
use crate::resource::{Catalog, Resource};
use rayon::prelude::*;

/// Scheduler options
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of workers for independent resources of the same dependency
    /// generation. 1 means a plain sequential walk.
    pub jobs: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

/// Drive the live system toward the catalog's declared state.
///
/// Graph validation and provider coverage run first; a cyclic, dangling or
/// uncovered catalog returns an error with zero side effects. Apply-time
/// failures never error out of this function - they surface as per-resource
/// status in the report.
pub fn converge(catalog: &Catalog, providers: &ProviderSet, opts: &Options) -> Result<RunReport> {
    let graph = Graph::build(catalog)?;
    providers.ensure_covers(catalog)?;

    if opts.jobs > 1 && graph.len() > 1 {
        Ok(run_parallel(catalog, &graph, providers, opts.jobs))
    } else {
        Ok(run_sequential(catalog, &graph, providers))
    }
}

fn run_sequential(catalog: &Catalog, graph: &Graph, providers: &ProviderSet) -> RunReport {
    let n = graph.len();
    let mut statuses: Vec<Option<Status>> = vec![None; n];
    let mut pending = vec![false; n];
    let mut report = RunReport::default();

    for &i in graph.order() {
        let resource = &catalog.resources()[i];
        let status = if blocked(graph, &statuses, i) {
            log::debug!("{}: skipped, failed dependency upstream", resource.id());
            Status::Skipped
        } else {
            evaluate(resource, providers, pending[i])
        };
        deliver_signals(graph, &mut pending, i, &status);
        statuses[i] = Some(status.clone());
        report.record(resource.id().clone(), status);
    }

    report
}

/// Generation-parallel walk: all ordering predecessors of a generation are
/// terminal before it starts, and refresh signals are delivered at the
/// barrier between generations, so each resource is still applied exactly
/// once with its final signal state known.
fn run_parallel(catalog: &Catalog, graph: &Graph, providers: &ProviderSet, jobs: usize) -> RunReport {
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool,
        Err(e) => {
            log::warn!("falling back to sequential apply: {e}");
            return run_sequential(catalog, graph, providers);
        }
    };

    let n = graph.len();
    let mut statuses: Vec<Option<Status>> = vec![None; n];
    let mut pending = vec![false; n];

    for generation in graph.generations() {
        let batch: Vec<(usize, Status)> = pool.install(|| {
            generation
                .par_iter()
                .map(|&i| {
                    let resource = &catalog.resources()[i];
                    let status = if blocked(graph, &statuses, i) {
                        Status::Skipped
                    } else {
                        evaluate(resource, providers, pending[i])
                    };
                    (i, status)
                })
                .collect()
        });
        for (i, status) in batch {
            deliver_signals(graph, &mut pending, i, &status);
            statuses[i] = Some(status);
        }
    }

    // Report in the deterministic topological order, not completion order.
    let mut report = RunReport::default();
    for &i in graph.order() {
        if let Some(status) = statuses[i].take() {
            report.record(graph.id(i).clone(), status);
        }
    }
    report
}

/// Skip rule: any `requires` predecessor that failed, or was itself skipped
/// because of a failure further upstream, blocks this resource. Notify
/// sources do not block - a failed source just means no refresh arrives.
fn blocked(graph: &Graph, statuses: &[Option<Status>], i: usize) -> bool {
    graph.requires_preds(i).iter().any(|&p| {
        matches!(
            statuses[p].as_ref(),
            Some(Status::Failed { .. } | Status::Skipped)
        )
    })
}

/// Mark refresh-signal flags on notify targets, only for an actual change.
/// Signals from Unchanged, Failed or Skipped sources are never sent; several
/// signals on one target collapse into a single forced apply.
fn deliver_signals(graph: &Graph, pending: &mut [bool], i: usize, status: &Status) {
    if !status.is_changed() {
        return;
    }
    for &t in graph.notify_targets(i) {
        log::debug!("{} changed, scheduling refresh of {}", graph.id(i), graph.id(t));
        pending[t] = true;
    }
}

fn evaluate(resource: &Resource, providers: &ProviderSet, refresh_pending: bool) -> Status {
    let id = resource.id();
    let Some(provider) = providers.get(id.kind) else {
        // coverage is checked before the walk starts
        return Status::Failed {
            error: format!("no provider for kind '{}'", id.kind),
        };
    };

    // Refresh-only resources are never probed: they run exactly once per
    // received signal, or not at all.
    if resource.is_refresh_only() {
        if !refresh_pending {
            log::debug!("{id}: refresh-only, no signal received, not run");
            return Status::Unchanged;
        }
        log::debug!("{id}: refresh signal pending, running");
        return apply(provider, resource);
    }

    match provider.probe(resource) {
        Ok(Probe::Matches) if !refresh_pending => {
            log::debug!("{id}: in sync");
            Status::Unchanged
        }
        Ok(Probe::Matches) => {
            log::debug!("{id}: in sync but refresh pending, re-applying");
            apply(provider, resource)
        }
        Ok(Probe::Mismatch { reasons }) => {
            log::debug!("{id}: out of sync ({})", reasons.join("; "));
            apply(provider, resource)
        }
        Err(e) => {
            log::warn!("{id}: probe failed: {e}");
            Status::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn apply(provider: &dyn Provider, resource: &Resource) -> Status {
    match provider.apply(resource) {
        Ok(Applied::Changed) => Status::Changed,
        Ok(Applied::Unchanged) => Status::Unchanged,
        Err(e) => {
            log::warn!("{}: apply failed: {e}", resource.id());
            Status::Failed {
                error: e.to_string(),
            }
        }
    }
}
