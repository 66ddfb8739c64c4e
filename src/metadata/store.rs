//! Metadata store: the term graph and archive plus views derived from them.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::AppError;
use crate::models::{
    ArchiveYear, Dated, Post, Taxonomy, Term, TermHandle, TermId, TermKind, TermSnapshot,
};

use super::{ArchiveIndex, TermDiff, TermGraph};

/// Long-lived root holding one blog's terms and archive.
///
/// `categories`, `tags`, `term_slugs` and `taxonomies` are rebuilt from the
/// graph whenever a sync changes it, so they never drift from `terms`.
#[derive(Debug, Default)]
pub struct MetadataStore {
    terms: TermGraph,
    categories: Vec<TermId>,
    tags: Vec<TermId>,
    term_slugs: BTreeMap<String, TermId>,
    taxonomies: Vec<String>,
    archive: ArchiveIndex,
}

impl MetadataStore {
    pub fn new(archive: ArchiveIndex) -> Self {
        Self {
            archive,
            ..Self::default()
        }
    }

    pub fn from_snapshot(snapshot: &TermSnapshot, archive: ArchiveIndex) -> Result<Self, AppError> {
        let mut store = Self::new(archive);
        store.sync(snapshot)?;
        Ok(store)
    }

    /// Reconcile terms with a fresh snapshot and refresh the derived views if
    /// anything changed.
    pub fn sync(&mut self, snapshot: &TermSnapshot) -> Result<TermDiff, AppError> {
        let diff = self.terms.sync(snapshot)?;
        if !diff.is_empty() {
            self.recompute();
        }
        Ok(diff)
    }

    /// Rebuild every derived view from the term graph.
    pub fn recompute(&mut self) {
        let by_name = |a: &&Term, b: &&Term| a.name.cmp(&b.name).then(a.id.cmp(&b.id));

        let mut categories: Vec<&Term> = Vec::new();
        let mut tags: Vec<&Term> = Vec::new();
        let mut term_slugs = BTreeMap::new();
        let mut taxonomies = BTreeSet::new();

        for term in self.terms.iter() {
            match term.kind() {
                TermKind::Category => {
                    categories.push(term);
                    // Ascending id order, so the oldest term keeps a contested slug
                    term_slugs.entry(term.slug.clone()).or_insert(term.id);
                    if let Taxonomy::Custom(name) = &term.taxonomy {
                        taxonomies.insert(name.clone());
                    }
                }
                TermKind::Tag => tags.push(term),
            }
        }

        categories.sort_by(by_name);
        tags.sort_by(by_name);

        self.categories = categories.iter().map(|t| t.id).collect();
        self.tags = tags.iter().map(|t| t.id).collect();
        self.term_slugs = term_slugs;
        self.taxonomies = taxonomies.into_iter().collect();
    }

    pub fn terms(&self) -> &TermGraph {
        &self.terms
    }

    pub fn term(&self, id: TermId) -> Option<&Term> {
        self.terms.get(id)
    }

    pub fn resolve(&self, handle: TermHandle) -> Option<&Term> {
        self.terms.resolve(handle)
    }

    /// Category-like terms sorted by name.
    pub fn categories(&self) -> impl Iterator<Item = &Term> {
        self.categories.iter().filter_map(move |id| self.terms.get(*id))
    }

    /// Tags sorted by name.
    pub fn tags(&self) -> impl Iterator<Item = &Term> {
        self.tags.iter().filter_map(move |id| self.terms.get(*id))
    }

    pub fn category_ids(&self) -> &[TermId] {
        &self.categories
    }

    pub fn tag_ids(&self) -> &[TermId] {
        &self.tags
    }

    pub fn term_slugs(&self) -> &BTreeMap<String, TermId> {
        &self.term_slugs
    }

    pub fn category_by_slug(&self, slug: &str) -> Option<&Term> {
        self.term_slugs.get(slug).and_then(|id| self.terms.get(*id))
    }

    /// Custom taxonomy names in use, sorted.
    pub fn taxonomies(&self) -> &[String] {
        &self.taxonomies
    }

    pub fn archive(&self) -> &ArchiveIndex {
        &self.archive
    }

    pub fn archive_years(&self) -> &[ArchiveYear] {
        self.archive.years()
    }

    pub fn add_post<P: Dated + ?Sized>(&mut self, post: &P) -> Option<bool> {
        self.archive.add_post(post)
    }

    pub fn remove_post<P: Dated + ?Sized>(&mut self, post: &P) -> Option<bool> {
        self.archive.remove_post(post)
    }

    /// True when the category or one of its ancestors has `slug`.
    pub fn category_matches(&self, id: TermId, slug: &str) -> bool {
        self.terms.lineage(id).any(|term| term.slug == slug)
    }

    /// Replace a post's categories and tags with the related term ids this
    /// store knows about.
    pub fn bind_post_terms(&self, post: &mut Post, related: &[TermId]) {
        post.categories.clear();
        post.tags.clear();
        for term in related.iter().filter_map(|id| self.terms.get(*id)) {
            match term.kind() {
                TermKind::Category => post.categories.push(term.id),
                TermKind::Tag => post.tags.push(term.id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::RawTerm;

    fn fixture() -> TermSnapshot {
        TermSnapshot::from_terms(vec![
            RawTerm::category(3, "Shopping", "shopping", None),
            RawTerm::category(100, "Subcategory", "subcategory", Some(3)),
            RawTerm::category(101, "Subsubcategory", "subsubcategory", Some(100)),
            RawTerm::category(2, "Bacon", "bacon", None),
            RawTerm::tag(7, "Awesome", "awesome"),
            RawTerm::tag(8, "Radical", "radical"),
            RawTerm {
                id: 20,
                name: "Jazz".to_string(),
                slug: "jazz".to_string(),
                taxonomy: Taxonomy::parse("genre"),
                parent: None,
            },
        ])
        .unwrap()
    }

    fn names<'a>(terms: impl Iterator<Item = &'a Term>) -> Vec<&'a str> {
        terms.map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_derived_views() {
        let store = MetadataStore::from_snapshot(&fixture(), ArchiveIndex::new()).unwrap();

        assert_eq!(
            names(store.categories()),
            vec!["Bacon", "Jazz", "Shopping", "Subcategory", "Subsubcategory"]
        );
        assert_eq!(names(store.tags()), vec!["Awesome", "Radical"]);
        assert_eq!(store.category_by_slug("subcategory").unwrap().id, 100);
        assert!(store.category_by_slug("awesome").is_none());
        assert_eq!(store.taxonomies(), &["genre".to_string()]);
    }

    #[test]
    fn test_taxonomy_change_moves_term_between_views() {
        let mut store = MetadataStore::from_snapshot(&fixture(), ArchiveIndex::new()).unwrap();
        let radical = store.term(8).unwrap().handle();

        let mut moved = fixture()
            .iter()
            .filter(|t| t.id != 8 && t.id != 20)
            .cloned()
            .collect::<Vec<_>>();
        moved.push(RawTerm::category(8, "Radical", "radical", None));
        moved.push(RawTerm::tag(20, "Jazz", "jazz"));
        let diff = store.sync(&TermSnapshot::from_terms(moved).unwrap()).unwrap();

        assert_eq!(diff.changed, vec![8, 20]);
        assert_eq!(names(store.tags()), vec!["Awesome", "Jazz"]);
        assert!(names(store.categories()).contains(&"Radical"));
        assert!(!names(store.categories()).contains(&"Jazz"));
        assert_eq!(store.category_by_slug("radical").map(|t| t.id), Some(8));
        assert!(store.category_by_slug("jazz").is_none());
        assert!(store.taxonomies().is_empty());
        assert_eq!(store.resolve(radical).unwrap().kind(), TermKind::Category);
    }

    #[test]
    fn test_sync_to_empty_clears_views() {
        let mut store = MetadataStore::from_snapshot(
            &TermSnapshot::from_terms(vec![
                RawTerm::category(1, "Foo", "foo", None),
                RawTerm::category(2, "Bar", "bar", Some(1)),
            ])
            .unwrap(),
            ArchiveIndex::new(),
        )
        .unwrap();

        let diff = store.sync(&TermSnapshot::new()).unwrap();

        assert!(!diff.is_empty());
        assert!(store.terms().is_empty());
        assert_eq!(store.categories().count(), 0);
        assert_eq!(store.tags().count(), 0);
        assert!(store.term_slugs().is_empty());
    }

    #[test]
    fn test_rename_moves_slug_key_and_keeps_instance() {
        let mut store = MetadataStore::from_snapshot(&fixture(), ArchiveIndex::new()).unwrap();
        let shopping = store.term(3).unwrap().handle();

        let mut renamed = fixture()
            .iter()
            .filter(|t| t.id != 3)
            .cloned()
            .collect::<Vec<_>>();
        renamed.push(RawTerm::category(3, "Groceries", "groceries", None));
        let diff = store
            .sync(&TermSnapshot::from_terms(renamed).unwrap())
            .unwrap();

        assert_eq!(diff.changed, vec![3]);
        assert!(store.term_slugs().get("shopping").is_none());
        assert_eq!(store.term_slugs().get("groceries"), Some(&3));
        assert_eq!(store.resolve(shopping).unwrap().name, "Groceries");
        assert_eq!(store.terms().parent_of(100).unwrap().name, "Groceries");
        assert_eq!(names(store.categories()).first(), Some(&"Bacon"));
        assert_eq!(names(store.categories()).get(2), Some(&"Jazz"));
    }

    #[test]
    fn test_unchanged_sync_keeps_views() {
        let mut store = MetadataStore::from_snapshot(&fixture(), ArchiveIndex::new()).unwrap();
        let before = store.category_ids().to_vec();

        let diff = store.sync(&fixture()).unwrap();

        assert!(diff.is_empty());
        assert_eq!(store.category_ids(), before.as_slice());
    }

    #[test]
    fn test_category_matches_ancestors() {
        let store = MetadataStore::from_snapshot(&fixture(), ArchiveIndex::new()).unwrap();

        assert!(store.category_matches(101, "subsubcategory"));
        assert!(store.category_matches(101, "shopping"));
        assert!(!store.category_matches(100, "subsubcategory"));
        assert!(!store.category_matches(999, "shopping"));
    }

    #[test]
    fn test_bind_post_terms() {
        let store = MetadataStore::from_snapshot(&fixture(), ArchiveIndex::new()).unwrap();
        let date = Utc.with_ymd_and_hms(2011, 11, 1, 0, 0, 0).unwrap();
        let mut post = Post::new(1, "Bacon ipsum", date, None);

        store.bind_post_terms(&mut post, &[2, 3, 8, 404]);

        assert_eq!(post.categories, vec![2, 3]);
        assert_eq!(post.tags, vec![8]);
    }

    #[test]
    fn test_archive_passthrough() {
        let mut store = MetadataStore::default();
        let date = Utc.with_ymd_and_hms(2011, 10, 10, 0, 0, 0).unwrap();

        assert_eq!(store.add_post(&date), Some(true));
        assert_eq!(store.archive().count(2011, 10), 1);
        assert_eq!(store.remove_post(&date), Some(true));
        assert!(store.archive_years().is_empty());
    }
}
