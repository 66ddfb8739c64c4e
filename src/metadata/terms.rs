//! Term graph with identity-preserving reconciliation.
//!
//! Terms live in one map keyed by id. Parent and child links are ids resolved
//! through that map, so a term mutated by [`TermGraph::sync`] is seen by every
//! holder of its id or [`TermHandle`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::errors::AppError;
use crate::models::{Term, TermHandle, TermId, TermSnapshot};

/// Which ids a sync added, changed or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TermDiff {
    pub added: Vec<TermId>,
    pub changed: Vec<TermId>,
    pub removed: Vec<TermId>,
}

impl TermDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// The authoritative, identity-preserving term collection.
#[derive(Debug, Default)]
pub struct TermGraph {
    terms: BTreeMap<TermId, Term>,
}

impl TermGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &TermSnapshot) -> Result<Self, AppError> {
        let mut graph = Self::new();
        graph.sync(snapshot)?;
        Ok(graph)
    }

    pub fn get(&self, id: TermId) -> Option<&Term> {
        self.terms.get(&id)
    }

    /// Resolve a handle, or `None` once its instance has been dropped.
    pub fn resolve(&self, handle: TermHandle) -> Option<&Term> {
        self.terms
            .get(&handle.id)
            .filter(|term| term.serial == handle.serial)
    }

    pub fn contains(&self, id: TermId) -> bool {
        self.terms.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.terms.values()
    }

    pub fn parent_of(&self, id: TermId) -> Option<&Term> {
        self.get(id)
            .and_then(|term| term.parent)
            .and_then(|parent| self.get(parent))
    }

    pub fn children_of(&self, id: TermId) -> impl Iterator<Item = &Term> {
        self.get(id)
            .map(|term| term.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |child| self.get(*child))
    }

    /// The term itself followed by its parent, grandparent and so on.
    pub fn lineage(&self, id: TermId) -> impl Iterator<Item = &Term> {
        std::iter::successors(self.get(id), move |term| {
            term.parent.and_then(|parent| self.get(parent))
        })
    }

    /// Reconcile this graph with a freshly fetched snapshot.
    ///
    /// Ids present on both sides keep their instance and are updated in place;
    /// ids missing from `current` are dropped and new ids are inserted. The
    /// snapshot is validated first, so an error leaves the graph untouched.
    pub fn sync(&mut self, current: &TermSnapshot) -> Result<TermDiff, AppError> {
        current.validate()?;

        let mut diff = TermDiff::default();
        let mut changed = BTreeSet::new();

        diff.removed = self
            .terms
            .keys()
            .filter(|id| !current.contains(**id))
            .copied()
            .collect();
        for id in &diff.removed {
            self.terms.remove(id);
        }

        for (id, term) in self.terms.iter_mut() {
            let Some(raw) = current.get(*id) else {
                continue;
            };
            if term.name != raw.name {
                term.name.clone_from(&raw.name);
                changed.insert(*id);
            }
            if term.slug != raw.slug {
                term.slug.clone_from(&raw.slug);
                changed.insert(*id);
            }
            if term.taxonomy != raw.taxonomy {
                term.taxonomy = raw.taxonomy.clone();
                changed.insert(*id);
            }
            if term.parent != raw.parent {
                term.parent = raw.parent;
                changed.insert(*id);
            }
        }

        for raw in current.iter() {
            if !self.terms.contains_key(&raw.id) {
                self.terms
                    .insert(raw.id, Term::from_raw(raw, next_serial()));
                diff.added.push(raw.id);
            }
        }

        // Children come from the snapshot's parent links and always point back
        // into this map, which now holds every id the snapshot names.
        let mut children = current.children();
        for (id, term) in self.terms.iter_mut() {
            let next = children.remove(id).unwrap_or_default();
            if !same_members(&term.children, &next) {
                if !diff.added.contains(id) {
                    changed.insert(*id);
                }
                term.children = next;
            }
        }

        diff.changed = changed.into_iter().collect();

        if !diff.is_empty() {
            self.sort_children();
        }

        tracing::debug!(
            added = diff.added.len(),
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            "Synced term graph"
        );

        Ok(diff)
    }

    /// Order every children list by name, then id.
    fn sort_children(&mut self) {
        let keys: BTreeMap<TermId, String> = self
            .terms
            .values()
            .map(|term| (term.id, term.name.clone()))
            .collect();
        for term in self.terms.values_mut() {
            term.children
                .sort_by(|a, b| keys.get(a).cmp(&keys.get(b)).then(a.cmp(b)));
        }
    }
}

/// Serials are unique across every graph in the process, so a handle never
/// resolves against a graph that was rebuilt from scratch.
fn next_serial() -> u64 {
    static NEXT_SERIAL: AtomicU64 = AtomicU64::new(0);
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

fn same_members(before: &[TermId], after: &[TermId]) -> bool {
    if before.len() != after.len() {
        return false;
    }
    let mut before = before.to_vec();
    before.sort_unstable();
    // Snapshot children are already in ascending id order
    before == after
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawTerm, Taxonomy, TermKind};

    fn snapshot(terms: Vec<RawTerm>) -> TermSnapshot {
        TermSnapshot::from_terms(terms).unwrap()
    }

    fn foo_bar() -> TermSnapshot {
        snapshot(vec![
            RawTerm::category(1, "Foo", "foo", None),
            RawTerm::category(2, "Bar", "bar", Some(1)),
        ])
    }

    #[test]
    fn test_initial_sync_adds_everything() {
        let mut graph = TermGraph::new();
        let diff = graph.sync(&foo_bar()).unwrap();

        assert_eq!(diff.added, vec![1, 2]);
        assert!(diff.changed.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(graph.get(1).unwrap().children, vec![2]);
        assert_eq!(graph.parent_of(2).unwrap().name, "Foo");
    }

    #[test]
    fn test_identical_snapshot_reports_no_change() {
        let mut graph = TermGraph::from_snapshot(&foo_bar()).unwrap();
        let diff = graph.sync(&foo_bar()).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_sync_empty_removes_all() {
        let mut graph = TermGraph::from_snapshot(&foo_bar()).unwrap();
        let diff = graph.sync(&TermSnapshot::new()).unwrap();

        assert_eq!(diff.removed, vec![1, 2]);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_identity_preserved_across_rename() {
        let mut graph = TermGraph::from_snapshot(&foo_bar()).unwrap();
        let foo = graph.get(1).unwrap().handle();
        let bar = graph.get(2).unwrap().handle();

        let diff = graph
            .sync(&snapshot(vec![
                RawTerm::category(1, "Foo Renamed", "foo-renamed", None),
                RawTerm::category(2, "Bar", "bar", Some(1)),
            ]))
            .unwrap();

        assert_eq!(diff.changed, vec![1]);
        assert_eq!(graph.resolve(foo).unwrap().name, "Foo Renamed");
        assert!(graph.resolve(bar).is_some());
        // The child sees its parent's new name through the shared map
        assert_eq!(graph.parent_of(2).unwrap().slug, "foo-renamed");
    }

    #[test]
    fn test_handle_goes_stale_when_id_returns() {
        let mut graph = TermGraph::from_snapshot(&foo_bar()).unwrap();
        let bar = graph.get(2).unwrap().handle();

        graph
            .sync(&snapshot(vec![RawTerm::category(1, "Foo", "foo", None)]))
            .unwrap();
        assert!(graph.resolve(bar).is_none());

        graph.sync(&foo_bar()).unwrap();
        assert!(graph.get(2).is_some());
        assert!(graph.resolve(bar).is_none());
    }

    #[test]
    fn test_reparent_updates_both_children_lists() {
        let mut graph = TermGraph::from_snapshot(&snapshot(vec![
            RawTerm::category(1, "A", "a", None),
            RawTerm::category(2, "B", "b", None),
            RawTerm::category(3, "C", "c", Some(1)),
        ]))
        .unwrap();

        let diff = graph
            .sync(&snapshot(vec![
                RawTerm::category(1, "A", "a", None),
                RawTerm::category(2, "B", "b", None),
                RawTerm::category(3, "C", "c", Some(2)),
            ]))
            .unwrap();

        assert_eq!(diff.changed, vec![1, 2, 3]);
        assert!(graph.get(1).unwrap().children.is_empty());
        assert_eq!(graph.get(2).unwrap().children, vec![3]);
        assert_eq!(graph.get(3).unwrap().parent, Some(2));
    }

    #[test]
    fn test_clearing_parent_is_a_change() {
        let mut graph = TermGraph::from_snapshot(&foo_bar()).unwrap();
        let diff = graph
            .sync(&snapshot(vec![
                RawTerm::category(1, "Foo", "foo", None),
                RawTerm::category(2, "Bar", "bar", None),
            ]))
            .unwrap();

        assert_eq!(diff.changed, vec![1, 2]);
        assert_eq!(graph.get(2).unwrap().parent, None);
        assert!(graph.get(1).unwrap().children.is_empty());
    }

    #[test]
    fn test_new_child_of_existing_parent() {
        let mut graph = TermGraph::from_snapshot(&foo_bar()).unwrap();
        let diff = graph
            .sync(&snapshot(vec![
                RawTerm::category(1, "Foo", "foo", None),
                RawTerm::category(2, "Bar", "bar", Some(1)),
                RawTerm::category(3, "Apple", "apple", Some(1)),
            ]))
            .unwrap();

        assert_eq!(diff.added, vec![3]);
        assert_eq!(diff.changed, vec![1]);
        // Children are ordered by name
        assert_eq!(graph.get(1).unwrap().children, vec![3, 2]);
    }

    #[test]
    fn test_children_sorted_by_name_then_id() {
        let graph = TermGraph::from_snapshot(&snapshot(vec![
            RawTerm::category(1, "Root", "root", None),
            RawTerm::category(4, "Same", "same-b", Some(1)),
            RawTerm::category(2, "Zed", "zed", Some(1)),
            RawTerm::category(3, "Same", "same-a", Some(1)),
        ]))
        .unwrap();
        assert_eq!(graph.get(1).unwrap().children, vec![3, 4, 2]);
    }

    #[test]
    fn test_malformed_snapshot_leaves_graph_untouched() {
        let mut graph = TermGraph::from_snapshot(&foo_bar()).unwrap();
        let result = graph.sync(&snapshot(vec![
            RawTerm::category(1, "Changed", "changed", None),
            RawTerm::category(2, "Bar", "bar", Some(9)),
        ]));

        assert!(matches!(result, Err(AppError::MalformedSnapshot(_))));
        assert_eq!(graph.get(1).unwrap().name, "Foo");
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_lineage_walks_to_root() {
        let graph = TermGraph::from_snapshot(&snapshot(vec![
            RawTerm::category(3, "Shopping", "shopping", None),
            RawTerm::category(100, "Subcategory", "subcategory", Some(3)),
            RawTerm::category(101, "Subsubcategory", "subsubcategory", Some(100)),
        ]))
        .unwrap();

        let slugs: Vec<&str> = graph.lineage(101).map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["subsubcategory", "subcategory", "shopping"]);
        let children: Vec<TermId> = graph.children_of(3).map(|t| t.id).collect();
        assert_eq!(children, vec![100]);
    }

    #[test]
    fn test_handle_does_not_resolve_in_rebuilt_graph() {
        let first = TermGraph::from_snapshot(&foo_bar()).unwrap();
        let handle = first.get(2).unwrap().handle();

        let rebuilt = TermGraph::from_snapshot(&foo_bar()).unwrap();

        assert!(first.resolve(handle).is_some());
        assert!(rebuilt.resolve(handle).is_none());
        assert!(rebuilt.resolve(rebuilt.get(2).unwrap().handle()).is_some());
    }

    #[test]
    fn test_taxonomy_change_keeps_instance() {
        let mut graph = TermGraph::from_snapshot(&snapshot(vec![
            RawTerm::category(1, "Jazz", "jazz", None),
            RawTerm::tag(2, "Swing", "swing"),
        ]))
        .unwrap();
        let jazz = graph.get(1).unwrap().handle();

        let mut genre = RawTerm::category(1, "Jazz", "jazz", None);
        genre.taxonomy = Taxonomy::parse("genre");
        let diff = graph
            .sync(&snapshot(vec![genre, RawTerm::tag(2, "Swing", "swing")]))
            .unwrap();

        assert_eq!(diff.changed, vec![1]);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
        let term = graph.resolve(jazz).unwrap();
        assert_eq!(term.taxonomy, Taxonomy::Custom("genre".to_string()));
        assert_eq!(term.kind(), TermKind::Category);
    }
}
