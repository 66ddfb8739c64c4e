//! Term model: categories, tags and custom taxonomies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Term identifier (`term_taxonomy_id` in the WordPress schema).
pub type TermId = i64;

/// The taxonomy a term belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Taxonomy {
    Category,
    PostTag,
    Custom(String),
}

impl Taxonomy {
    pub fn as_str(&self) -> &str {
        match self {
            Taxonomy::Category => "category",
            Taxonomy::PostTag => "post_tag",
            Taxonomy::Custom(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "category" => Taxonomy::Category,
            "post_tag" => Taxonomy::PostTag,
            other => Taxonomy::Custom(other.to_string()),
        }
    }

    /// Tags are flat; every other taxonomy is treated as a category hierarchy.
    pub fn kind(&self) -> TermKind {
        match self {
            Taxonomy::PostTag => TermKind::Tag,
            _ => TermKind::Category,
        }
    }
}

impl From<String> for Taxonomy {
    fn from(s: String) -> Self {
        Taxonomy::parse(&s)
    }
}

impl From<Taxonomy> for String {
    fn from(taxonomy: Taxonomy) -> Self {
        taxonomy.as_str().to_string()
    }
}

/// Category-like or tag-like, decided once from the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Category,
    Tag,
}

/// A category or tag held by the metadata store.
///
/// `parent` and `children` are ids resolved through the store that owns the term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Term {
    pub id: TermId,
    pub name: String,
    pub slug: String,
    pub taxonomy: Taxonomy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<TermId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TermId>,
    #[serde(skip)]
    pub(crate) serial: u64,
}

impl Term {
    pub(crate) fn from_raw(raw: &RawTerm, serial: u64) -> Self {
        Self {
            id: raw.id,
            name: raw.name.clone(),
            slug: raw.slug.clone(),
            taxonomy: raw.taxonomy.clone(),
            parent: raw.parent,
            children: Vec::new(),
            serial,
        }
    }

    pub fn kind(&self) -> TermKind {
        self.taxonomy.kind()
    }

    /// A handle that resolves to this instance for as long as it stays in its store.
    pub fn handle(&self) -> TermHandle {
        TermHandle {
            id: self.id,
            serial: self.serial,
        }
    }
}

/// Stable reference to one term instance.
///
/// A handle keeps resolving while the term's id persists across syncs. Once the id
/// disappears from a snapshot the handle goes stale, even if the id comes back later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TermHandle {
    pub id: TermId,
    pub(crate) serial: u64,
}

/// One term as fetched from the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTerm {
    pub id: TermId,
    pub name: String,
    pub slug: String,
    pub taxonomy: Taxonomy,
    #[serde(default)]
    pub parent: Option<TermId>,
}

impl RawTerm {
    pub fn category(id: TermId, name: &str, slug: &str, parent: Option<TermId>) -> Self {
        Self {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            taxonomy: Taxonomy::Category,
            parent,
        }
    }

    pub fn tag(id: TermId, name: &str, slug: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            taxonomy: Taxonomy::PostTag,
            parent: None,
        }
    }
}

/// A freshly fetched, short-lived set of terms keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermSnapshot {
    terms: BTreeMap<TermId, RawTerm>,
}

impl TermSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot, failing on the first repeated id.
    pub fn from_terms(terms: impl IntoIterator<Item = RawTerm>) -> Result<Self, AppError> {
        let mut snapshot = Self::new();
        for term in terms {
            snapshot.insert(term)?;
        }
        Ok(snapshot)
    }

    pub fn insert(&mut self, term: RawTerm) -> Result<(), AppError> {
        if self.terms.contains_key(&term.id) {
            return Err(AppError::DuplicateTerm(term.id));
        }
        self.terms.insert(term.id, term);
        Ok(())
    }

    pub fn get(&self, id: TermId) -> Option<&RawTerm> {
        self.terms.get(&id)
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
    pub fn iter(&self) -> impl Iterator<Item = &RawTerm> {
        self.terms.values()
    }

    /// Direct children of every term that has any, in ascending id order.
    pub fn children(&self) -> BTreeMap<TermId, Vec<TermId>> {
        let mut children: BTreeMap<TermId, Vec<TermId>> = BTreeMap::new();
        for term in self.terms.values() {
            if let Some(parent) = term.parent {
                children.entry(parent).or_default().push(term.id);
            }
        }
        children
    }

    /// Check the graph invariants: parents exist in this snapshot, tags are flat,
    /// categories only hang below categories, and no parent chain loops.
    pub fn validate(&self) -> Result<(), AppError> {
        for term in self.terms.values() {
            let Some(parent_id) = term.parent else {
                continue;
            };
            if term.taxonomy.kind() == TermKind::Tag {
                return Err(AppError::MalformedSnapshot(format!(
                    "Tag {} cannot have a parent",
                    term.id
                )));
            }
            let parent = self.terms.get(&parent_id).ok_or_else(|| {
                AppError::MalformedSnapshot(format!(
                    "Term {} has unknown parent {}",
                    term.id, parent_id
                ))
            })?;
            if parent.taxonomy.kind() != TermKind::Category {
                return Err(AppError::MalformedSnapshot(format!(
                    "Term {} has non-category parent {}",
                    term.id, parent_id
                )));
            }
        }

        for term in self.terms.values() {
            let mut steps = 0;
            let mut cursor = term.parent;
            while let Some(id) = cursor {
                steps += 1;
                if id == term.id || steps > self.terms.len() {
                    return Err(AppError::MalformedSnapshot(format!(
                        "Term {} is part of a parent cycle",
                        term.id
                    )));
                }
                cursor = self.terms.get(&id).and_then(|t| t.parent);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_kind() {
        assert_eq!(Taxonomy::parse("category"), Taxonomy::Category);
        assert_eq!(Taxonomy::parse("post_tag").kind(), TermKind::Tag);
        let custom = Taxonomy::parse("genre");
        assert_eq!(custom.as_str(), "genre");
        assert_eq!(custom.kind(), TermKind::Category);
    }

    #[test]
    fn test_snapshot_rejects_duplicate_ids() {
        let result = TermSnapshot::from_terms(vec![
            RawTerm::category(1, "Foo", "foo", None),
            RawTerm::tag(1, "Bar", "bar"),
        ]);
        assert_eq!(result, Err(AppError::DuplicateTerm(1)));
    }

    #[test]
    fn test_snapshot_children() {
        let snapshot = TermSnapshot::from_terms(vec![
            RawTerm::category(1, "Root", "root", None),
            RawTerm::category(3, "B", "b", Some(1)),
            RawTerm::category(2, "A", "a", Some(1)),
        ])
        .unwrap();
        let children = snapshot.children();
        assert_eq!(children.get(&1), Some(&vec![2, 3]));
        assert!(children.get(&2).is_none());
    }

    #[test]
    fn test_validate_dangling_parent() {
        let snapshot =
            TermSnapshot::from_terms(vec![RawTerm::category(2, "Bar", "bar", Some(1))]).unwrap();
        assert!(matches!(
            snapshot.validate(),
            Err(AppError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_validate_cycle() {
        let snapshot = TermSnapshot::from_terms(vec![
            RawTerm::category(1, "A", "a", Some(2)),
            RawTerm::category(2, "B", "b", Some(1)),
        ])
        .unwrap();
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_validate_tag_parent() {
        let mut tag = RawTerm::tag(2, "Tag", "tag");
        tag.parent = Some(1);
        let snapshot =
            TermSnapshot::from_terms(vec![RawTerm::category(1, "A", "a", None), tag]).unwrap();
        assert!(snapshot.validate().is_err());

        let snapshot = TermSnapshot::from_terms(vec![
            RawTerm::tag(1, "Tag", "tag"),
            RawTerm::category(2, "A", "a", Some(1)),
        ])
        .unwrap();
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_validate_ok() {
        let snapshot = TermSnapshot::from_terms(vec![
            RawTerm::category(1, "A", "a", None),
            RawTerm::category(2, "B", "b", Some(1)),
            RawTerm::category(3, "C", "c", Some(2)),
            RawTerm::tag(4, "T", "t"),
        ])
        .unwrap();
        assert!(snapshot.validate().is_ok());
    }
}
