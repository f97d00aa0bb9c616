//! Dependency graph builder - validated DAG over resource ids
//!
//! `requires` edges are reversed into apply-order predecessors; `notifies`
//! edges get their own adjacency, consulted only for refresh-signal
//! propagation. A notification source must converge before its target so the
//! signal can be delivered ahead of the target's own topological slot, so
//! notify edges also constrain ordering.
//!
//! Graph construction runs before any probe or apply: a cyclic or dangling
//! catalog fails fast with zero side effects.

use crate::error::{Error, Result};
use crate::resource::{Catalog, ResourceId};
use std::collections::HashMap;

/// A validated DAG over the resources of one catalog.
///
/// Node index `i` is the catalog declaration position of the resource, which
/// keeps tie-breaking deterministic and lets the scheduler look attributes up
/// by index.
#[derive(Debug)]
pub struct Graph {
    ids: Vec<ResourceId>,
    /// Targets of each node's `requires` edges (deduplicated)
    requires_preds: Vec<Vec<usize>>,
    /// Full ordering predecessors: `requires` targets plus notify sources
    order_preds: Vec<Vec<usize>>,
    /// Targets of each node's `notifies` edges (deduplicated)
    notify_targets: Vec<Vec<usize>>,
    /// Topological order: predecessors before dependents, ties by
    /// declaration order
    order: Vec<usize>,
}

impl Graph {
    /// Build and validate the graph for a catalog.
    pub fn build(catalog: &Catalog) -> Result<Self> {
        let n = catalog.len();
        let ids: Vec<ResourceId> = catalog.resources().iter().map(|r| r.id().clone()).collect();
        let mut index: HashMap<&ResourceId, usize> = HashMap::with_capacity(n);
        for (i, id) in ids.iter().enumerate() {
            index.insert(id, i);
        }

        let mut requires_preds = vec![Vec::new(); n];
        let mut order_preds = vec![Vec::new(); n];
        let mut notify_targets = vec![Vec::new(); n];

        for (i, resource) in catalog.resources().iter().enumerate() {
            for target in resource.requires() {
                let t = resolve(&index, &ids[i], target)?;
                push_unique(&mut requires_preds[i], t);
                push_unique(&mut order_preds[i], t);
            }
            for target in resource.notifies() {
                let t = resolve(&index, &ids[i], target)?;
                push_unique(&mut notify_targets[i], t);
                push_unique(&mut order_preds[t], i);
            }
        }

        let order = toposort(&ids, &order_preds)?;
        log::debug!("graph built: {n} resources, order {order:?}");

        Ok(Self {
            ids,
            requires_preds,
            order_preds,
            notify_targets,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Node indexes in apply order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn id(&self, idx: usize) -> &ResourceId {
        &self.ids[idx]
    }

    /// Predecessors whose failure skips this node (`requires` targets only -
    /// a failed notification source does not block its target).
    pub fn requires_preds(&self, idx: usize) -> &[usize] {
        &self.requires_preds[idx]
    }

    pub fn notify_targets(&self, idx: usize) -> &[usize] {
        &self.notify_targets[idx]
    }

    /// Group nodes into dependency generations: every ordering predecessor of
    /// a generation-`g` node lives in a generation before `g`. Used by the
    /// parallel scheduler; within a generation resources are independent.
    pub fn generations(&self) -> Vec<Vec<usize>> {
        let mut level = vec![0usize; self.ids.len()];
        let mut generations: Vec<Vec<usize>> = Vec::new();
        for &i in &self.order {
            let lvl = self.order_preds[i]
                .iter()
                .map(|&p| level[p] + 1)
                .max()
                .unwrap_or(0);
            level[i] = lvl;
            if generations.len() <= lvl {
                generations.resize_with(lvl + 1, Vec::new);
            }
            generations[lvl].push(i);
        }
        generations
    }
}

fn resolve(
    index: &HashMap<&ResourceId, usize>,
    from: &ResourceId,
    target: &ResourceId,
) -> Result<usize> {
    index
        .get(target)
        .copied()
        .ok_or_else(|| Error::DanglingReference {
            from: from.clone(),
            to: target.clone(),
        })
}

fn push_unique(edges: &mut Vec<usize>, target: usize) {
    if !edges.contains(&target) {
        edges.push(target);
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    New,
    InProgress,
    Done,
}

/// Depth-first postorder with an in-progress marker set for cycle detection.
/// Visiting nodes and predecessor lists in declaration order makes the result
/// stable and reproducible across runs.
fn toposort(ids: &[ResourceId], preds: &[Vec<usize>]) -> Result<Vec<usize>> {
    fn visit(
        i: usize,
        ids: &[ResourceId],
        preds: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = stack.iter().rposition(|&s| s == i).unwrap_or(0);
                let mut members: Vec<ResourceId> =
                    stack[start..].iter().map(|&s| ids[s].clone()).collect();
                members.push(ids[i].clone());
                return Err(Error::CyclicDependency { members });
            }
            Mark::New => {}
        }
        marks[i] = Mark::InProgress;
        stack.push(i);
        for &p in &preds[i] {
            visit(p, ids, preds, marks, stack, order)?;
        }
        stack.pop();
        marks[i] = Mark::Done;
        order.push(i);
        Ok(())
    }

    let mut marks = vec![Mark::New; ids.len()];
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(ids.len());
    for i in 0..ids.len() {
        visit(i, ids, preds, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Kind, PackageEnsure, Resource};

    fn pkg(name: &str) -> Resource {
        Resource::package(name, PackageEnsure::Installed).unwrap()
    }

    fn pkg_id(name: &str) -> ResourceId {
        ResourceId::new(Kind::Package, name)
    }

    fn positions(graph: &Graph) -> HashMap<String, usize> {
        graph
            .order()
            .iter()
            .enumerate()
            .map(|(pos, &i)| (graph.id(i).to_string(), pos))
            .collect()
    }

    #[test]
    fn independent_resources_keep_declaration_order() {
        let mut catalog = Catalog::new();
        for name in ["inventory", "schedule", "pds2"] {
            catalog.add(pkg(name)).unwrap();
        }
        let graph = Graph::build(&catalog).unwrap();
        assert_eq!(graph.order(), &[0, 1, 2]);
    }

    #[test]
    fn requires_target_sorts_before_source() {
        let mut catalog = Catalog::new();
        catalog
            .add(
                Resource::file("/etc/agent.conf")
                    .build()
                    .unwrap()
                    .require(pkg_id("base-agent")),
            )
            .unwrap();
        catalog.add(pkg("base-agent")).unwrap();
        let graph = Graph::build(&catalog).unwrap();

        let pos = positions(&graph);
        assert!(pos["package[base-agent]"] < pos["file[/etc/agent.conf]"]);
    }

    #[test]
    fn notify_source_sorts_before_target() {
        // The exec is declared first; the notifying file must still converge
        // ahead of it so the refresh signal lands before the exec's slot.
        let mut catalog = Catalog::new();
        catalog
            .add(
                Resource::exec("register", "/opt/agent/bin/register")
                    .refresh_only(true)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .add(
                Resource::file("/etc/agent.conf")
                    .build()
                    .unwrap()
                    .notify(ResourceId::new(Kind::Exec, "register")),
            )
            .unwrap();
        let graph = Graph::build(&catalog).unwrap();

        let pos = positions(&graph);
        assert!(pos["file[/etc/agent.conf]"] < pos["exec[register]"]);
        // but the skip rule only looks at requires edges
        let exec_idx = graph.order()[1];
        assert!(graph.requires_preds(exec_idx).is_empty());
        let file_idx = graph.order()[0];
        assert_eq!(graph.notify_targets(file_idx), &[0]);
    }

    #[test]
    fn duplicate_requires_listing_collapses() {
        let mut catalog = Catalog::new();
        catalog.add(pkg("base-agent")).unwrap();
        catalog
            .add(
                Resource::file("/etc/agent.conf")
                    .build()
                    .unwrap()
                    .require(pkg_id("base-agent"))
                    .require(pkg_id("base-agent")),
            )
            .unwrap();
        let graph = Graph::build(&catalog).unwrap();
        assert_eq!(graph.requires_preds(1), &[0]);
    }

    #[test]
    fn cycle_fails_with_member_ids() {
        let mut catalog = Catalog::new();
        catalog
            .add(pkg("a").require(pkg_id("b")))
            .unwrap();
        catalog
            .add(pkg("b").require(pkg_id("a")))
            .unwrap();
        let err = Graph::build(&catalog).unwrap_err();
        match err {
            Error::CyclicDependency { members } => {
                let names: Vec<String> = members.iter().map(ToString::to_string).collect();
                assert!(names.contains(&"package[a]".to_string()), "{names:?}");
                assert!(names.contains(&"package[b]".to_string()), "{names:?}");
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut catalog = Catalog::new();
        catalog.add(pkg("a").require(pkg_id("a"))).unwrap();
        assert!(matches!(
            Graph::build(&catalog),
            Err(Error::CyclicDependency { .. })
        ));
    }

    #[test]
    fn dangling_requires_reference_fails() {
        let mut catalog = Catalog::new();
        catalog.add(pkg("a").require(pkg_id("ghost"))).unwrap();
        let err = Graph::build(&catalog).unwrap_err();
        assert!(matches!(err, Error::DanglingReference { .. }));
        assert!(err.to_string().contains("package[ghost]"));
    }

    #[test]
    fn dangling_notify_reference_fails() {
        let mut catalog = Catalog::new();
        catalog.add(pkg("a").notify(pkg_id("ghost"))).unwrap();
        assert!(matches!(
            Graph::build(&catalog),
            Err(Error::DanglingReference { .. })
        ));
    }

    #[test]
    fn generations_split_at_dependency_boundaries() {
        let mut catalog = Catalog::new();
        for i in 1..=7 {
            catalog.add(pkg(&format!("p{i}"))).unwrap();
        }
        let mut file = Resource::file("/etc/agent.conf").build().unwrap();
        for i in 1..=7 {
            file = file.require(pkg_id(&format!("p{i}")));
        }
        catalog.add(file).unwrap();
        let graph = Graph::build(&catalog).unwrap();

        let generations = graph.generations();
        assert_eq!(generations.len(), 2);
        assert_eq!(generations[0].len(), 7);
        assert_eq!(generations[1], vec![7]);
    }
}
