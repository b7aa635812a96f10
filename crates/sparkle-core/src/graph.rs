//! Dependency graph, backed by the live aggregates.
//!
//! The graph is stored only as forward edges (`dependencies`/`dependents`)
//! per aggregate, referenced by id rather than by pointer. This module
//! converts to a transient
//! index/queue representation only inside [`dag`], never persisting one.

use crate::aggregate::{Manager, ManagerError};
use crate::model::ItemId;
use crate::state::Aggregate;
use std::collections::{HashSet, VecDeque};

/// `isPending(itemId)`: not completed, and every dependency is completed.
pub fn is_pending(mgr: &Manager, item_id: &ItemId) -> Result<bool, ManagerError> {
    let agg = mgr.get(item_id)?;
    is_pending_of(mgr, &agg)
}

fn is_pending_of(mgr: &Manager, agg: &Aggregate) -> Result<bool, ManagerError> {
    if agg.status == "completed" {
        return Ok(false);
    }
    for dep in &agg.dependencies {
        if mgr.get(dep)?.status != "completed" {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `pendingWork()`: every item id whose [`is_pending`] holds, in item-id
/// order (a stable, deterministic iteration order for a "lazy iterator" in
/// a single-process in-memory implementation).
pub fn pending_work(mgr: &Manager, all_ids: &[ItemId]) -> Result<Vec<ItemId>, ManagerError> {
    let mut out = Vec::new();
    for id in all_ids {
        if is_pending(mgr, id)? {
            out.push(id.clone());
        }
    }
    Ok(out)
}

/// `roots()`: items with no dependents, ordered by `created`.
pub fn roots(mgr: &Manager, all_ids: &[ItemId]) -> Result<Vec<ItemId>, ManagerError> {
    let mut entries = Vec::new();
    for id in all_ids {
        let agg = mgr.get(id)?;
        if agg.dependents.is_empty() {
            entries.push((agg.created.clone(), id.clone()));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries.into_iter().map(|(_, id)| id).collect())
}

/// `wouldCreateCycle(from, to)`: would adding a dependency edge `from`
/// (needing) → `to` (needed) close a cycle? True iff `to` can already
/// reach `from` by following existing `dependencies` edges. Assumes
/// `from != to` — a self-loop is rejected separately by the API layer
/// before this check runs.
pub fn would_create_cycle(mgr: &Manager, from: &ItemId, to: &ItemId) -> Result<bool, ManagerError> {
    let mut visited = HashSet::new();
    let mut stack = vec![to.clone()];
    while let Some(current) = stack.pop() {
        if &current == from {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        let agg = mgr.get(&current)?;
        for dep in agg.dependencies {
            if !visited.contains(&dep) {
                stack.push(dep);
            }
        }
    }
    Ok(false)
}

/// The neighbour lists carried by a [`DagEmission`] on its first encounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagFull {
    pub depends_on: Vec<ItemId>,
    pub provides_to: Vec<ItemId>,
}

/// One node emitted by [`dag`]. The reference node is emitted first with
/// `depth = 0` and `needed_by = None`; every other node's first emission
/// carries `full`, subsequent re-encounters (diamonds) carry `full = None`
///.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagEmission {
    pub item: ItemId,
    pub depth: u32,
    pub needed_by: Option<ItemId>,
    pub full: Option<DagFull>,
}

/// `dag(referenceId)`: bidirectional BFS over the live aggregate graph.
/// Downward expansion follows `dependencies`; upward follows `dependents`.
/// A per-call visited set prevents infinite loops on diamonds; a node can
/// be emitted more than once (once per reaching edge) but `full` only on
/// its first emission.
pub fn dag(mgr: &Manager, reference_id: &ItemId) -> Result<Vec<DagEmission>, ManagerError> {
    let mut visited: HashSet<ItemId> = HashSet::new();
    let mut out = Vec::new();
    let mut queue: VecDeque<(ItemId, u32, Aggregate)> = VecDeque::new();

    let root = mgr.get(reference_id)?;
    visited.insert(reference_id.clone());
    out.push(DagEmission {
        item: reference_id.clone(),
        depth: 0,
        needed_by: None,
        full: Some(DagFull {
            depends_on: root.dependencies.clone(),
            provides_to: root.dependents.clone(),
        }),
    });
    queue.push_back((reference_id.clone(), 0, root));

    while let Some((id, depth, agg)) = queue.pop_front() {
        let neighbours: Vec<ItemId> = agg
            .dependencies
            .iter()
            .chain(agg.dependents.iter())
            .cloned()
            .collect();
        for neighbour in neighbours {
            if visited.contains(&neighbour) {
                out.push(DagEmission {
                    item: neighbour,
                    depth: depth + 1,
                    needed_by: Some(id.clone()),
                    full: None,
                });
                continue;
            }
            let neighbour_agg = mgr.get(&neighbour)?;
            visited.insert(neighbour.clone());
            out.push(DagEmission {
                item: neighbour.clone(),
                depth: depth + 1,
                needed_by: Some(id.clone()),
                full: Some(DagFull {
                    depends_on: neighbour_agg.dependencies.clone(),
                    provides_to: neighbour_agg.dependents.clone(),
                }),
            });
            queue.push_back((neighbour, depth + 1, neighbour_agg));
        }
    }
    Ok(out)
}

/// Result of [`potential_dependencies`]/[`potential_dependents`]: items
/// already linked versus items that could be newly linked without closing
/// a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Potential {
    pub current: Vec<ItemId>,
    pub candidates: Vec<ItemId>,
}

/// `potentialDependencies(itemId)`: every other item, split into those
/// already a dependency of `item_id` and those that could become one
/// without closing a cycle.
pub fn potential_dependencies(
    mgr: &Manager,
    item_id: &ItemId,
    all_ids: &[ItemId],
) -> Result<Potential, ManagerError> {
    let agg = mgr.get(item_id)?;
    let current: HashSet<ItemId> = agg.dependencies.iter().cloned().collect();
    let mut candidates = Vec::new();
    for other in all_ids {
        if other == item_id || current.contains(other) {
            continue;
        }
        if !would_create_cycle(mgr, item_id, other)? {
            candidates.push(other.clone());
        }
    }
    let mut current: Vec<ItemId> = current.into_iter().collect();
    current.sort();
    candidates.sort();
    Ok(Potential { current, candidates })
}

/// `potentialDependents(itemId)`: the mirror of [`potential_dependencies`]
/// — other items that could newly depend on `item_id`.
pub fn potential_dependents(
    mgr: &Manager,
    item_id: &ItemId,
    all_ids: &[ItemId],
) -> Result<Potential, ManagerError> {
    let agg = mgr.get(item_id)?;
    let current: HashSet<ItemId> = agg.dependents.iter().cloned().collect();
    let mut candidates = Vec::new();
    for other in all_ids {
        if other == item_id || current.contains(other) {
            continue;
        }
        if !would_create_cycle(mgr, other, item_id)? {
            candidates.push(other.clone());
        }
    }
    let mut current: Vec<ItemId> = current.into_iter().collect();
    current.sort();
    candidates.sort();
    Ok(Potential { current, candidates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Person;
    use crate::store::EventStore;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn tmp(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("sparkle-graph-test-{label}-{n}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn person() -> Person {
        Person {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            timestamp: "ts".into(),
        }
    }

    fn setup(label: &str) -> (Manager, PathBuf) {
        let dir = tmp(label);
        let store = EventStore::new(dir.join("data"));
        let agg_dir = dir.join("data/.aggregates");
        (Manager::new(store, agg_dir), dir)
    }

    fn id(s: &str) -> ItemId {
        ItemId::parse(s).unwrap()
    }

    #[test]
    fn is_pending_requires_all_dependencies_completed() {
        let (mgr, _d) = setup("pending");
        let a = id("11111111");
        let b = id("22222222");
        mgr.store().write_create(&a, "A", "incomplete", &person(), "ts0").unwrap();
        mgr.store().write_create(&b, "B", "incomplete", &person(), "ts0").unwrap();
        let f = mgr
            .store()
            .write_dependency(&a, crate::event::LinkAction::Linked, &b, &person())
            .unwrap();
        mgr.record_write(&f).unwrap();

        assert!(is_pending(&mgr, &b).unwrap());
        assert!(!is_pending(&mgr, &a).unwrap());

        let status_file = mgr.store().write_status(&b, "completed", None, &person()).unwrap();
        mgr.record_write(&status_file).unwrap();
        assert!(is_pending(&mgr, &a).unwrap());
    }

    #[test]
    fn would_create_cycle_detects_transitive_loop() {
        let (mgr, _d) = setup("cycle");
        let a = id("11111111");
        let b = id("22222222");
        let c = id("33333333");
        for (i, name) in [(&a, "A"), (&b, "B"), (&c, "C")] {
            mgr.store().write_create(i, name, "incomplete", &person(), "ts0").unwrap();
        }
        let f1 = mgr
            .store()
            .write_dependency(&a, crate::event::LinkAction::Linked, &b, &person())
            .unwrap();
        mgr.record_write(&f1).unwrap();
        let f2 = mgr
            .store()
            .write_dependency(&b, crate::event::LinkAction::Linked, &c, &person())
            .unwrap();
        mgr.record_write(&f2).unwrap();

        assert!(would_create_cycle(&mgr, &c, &a).unwrap());
        assert!(!would_create_cycle(&mgr, &a, &c).unwrap());
    }

    #[test]
    fn roots_are_items_with_no_dependents() {
        let (mgr, _d) = setup("roots");
        let a = id("11111111");
        let b = id("22222222");
        mgr.store().write_create(&a, "A", "incomplete", &person(), "ts0").unwrap();
        mgr.store().write_create(&b, "B", "incomplete", &person(), "ts1").unwrap();
        let f = mgr
            .store()
            .write_dependency(&a, crate::event::LinkAction::Linked, &b, &person())
            .unwrap();
        mgr.record_write(&f).unwrap();
        let all = vec![a.clone(), b.clone()];
        assert_eq!(roots(&mgr, &all).unwrap(), vec![a]);
    }

    #[test]
    fn dag_emits_reference_first_with_depth_zero() {
        let (mgr, _d) = setup("dag");
        let a = id("11111111");
        let b = id("22222222");
        mgr.store().write_create(&a, "A", "incomplete", &person(), "ts0").unwrap();
        mgr.store().write_create(&b, "B", "incomplete", &person(), "ts0").unwrap();
        let f = mgr
            .store()
            .write_dependency(&a, crate::event::LinkAction::Linked, &b, &person())
            .unwrap();
        mgr.record_write(&f).unwrap();

        let nodes = dag(&mgr, &a).unwrap();
        assert_eq!(nodes[0].item, a);
        assert_eq!(nodes[0].depth, 0);
        assert!(nodes[0].needed_by.is_none());
        assert!(nodes[0].full.is_some());

        let full_count = nodes.iter().filter(|n| n.item == b && n.full.is_some()).count();
        assert_eq!(full_count, 1);
    }

    #[test]
    fn dag_diamond_reencounter_has_no_full() {
        let (mgr, _d) = setup("diamond");
        let a = id("11111111");
        let b = id("22222222");
        let c = id("33333333");
        let d = id("44444444");
        for (i, name) in [(&a, "A"), (&b, "B"), (&c, "C"), (&d, "D")] {
            mgr.store().write_create(i, name, "incomplete", &person(), "ts0").unwrap();
        }
        for (needing, needed) in [(&a, &b), (&a, &c), (&b, &d), (&c, &d)] {
            let f = mgr
                .store()
                .write_dependency(needing, crate::event::LinkAction::Linked, needed, &person())
                .unwrap();
            mgr.record_write(&f).unwrap();
        }
        let nodes = dag(&mgr, &a).unwrap();
        let d_emissions: Vec<_> = nodes.iter().filter(|n| n.item == d).collect();
        assert_eq!(d_emissions.len(), 2);
        assert_eq!(d_emissions.iter().filter(|n| n.full.is_some()).count(), 1);
    }

    #[test]
    fn potential_dependencies_excludes_cycle_candidates() {
        let (mgr, _d) = setup("potential");
        let a = id("11111111");
        let b = id("22222222");
        let c = id("33333333");
        for (i, name) in [(&a, "A"), (&b, "B"), (&c, "C")] {
            mgr.store().write_create(i, name, "incomplete", &person(), "ts0").unwrap();
        }
        let f = mgr
            .store()
            .write_dependency(&a, crate::event::LinkAction::Linked, &b, &person())
            .unwrap();
        mgr.record_write(&f).unwrap();

        let all = vec![a.clone(), b.clone(), c.clone()];
        let p = potential_dependencies(&mgr, &a, &all).unwrap();
        assert_eq!(p.current, vec![b.clone()]);
        assert_eq!(p.candidates, vec![c]);

        let p_b = potential_dependencies(&mgr, &b, &all).unwrap();
        assert!(!p_b.candidates.contains(&a));
    }
}
