//! In-memory triple store with positional indexes
//!
//! Triples are held in insertion order (so query evaluation is stable for a
//! given store snapshot) with subject, predicate and object posting lists on
//! top for selective pattern lookup. Insertion is idempotent; the subset has
//! no delete or update operations. After the load phase the store is shared
//! immutably across request handlers — if live updates are ever added, this
//! must switch to copy-on-write snapshots so a running query keeps seeing a
//! consistent store.

use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap};

use super::namespace::NamespaceManager;
use super::term::{NamedNode, Subject, Term, Triple};

/// Triple identifier: index into the insertion-ordered triple list
type TripleId = u32;

/// Store-level statistics, as reported by the `/stats` boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of triples
    pub total_triples: usize,
    /// Number of distinct subjects
    pub distinct_subjects: usize,
    /// Number of distinct predicates
    pub distinct_predicates: usize,
    /// Number of distinct objects
    pub distinct_objects: usize,
}

/// Indexed, append-only triple container plus the bound prefix table.
pub struct TripleStore {
    /// All triples, insertion-ordered and deduplicated
    triples: IndexSet<Triple, FxBuildHasher>,
    /// Subject -> triple ids
    by_subject: FxHashMap<Subject, Vec<TripleId>>,
    /// Predicate -> triple ids
    by_predicate: FxHashMap<NamedNode, Vec<TripleId>>,
    /// Object -> triple ids
    by_object: FxHashMap<Term, Vec<TripleId>>,
    /// Bound prefixes (display/parsing convenience only)
    namespaces: NamespaceManager,
}

impl TripleStore {
    /// Create an empty store with the default prefix table
    pub fn new() -> Self {
        Self {
            triples: IndexSet::default(),
            by_subject: FxHashMap::default(),
            by_predicate: FxHashMap::default(),
            by_object: FxHashMap::default(),
            namespaces: NamespaceManager::new(),
        }
    }

    /// Insert a triple. Returns `true` if it was new, `false` if the store
    /// already contained it (idempotent no-op).
    pub fn insert(&mut self, triple: Triple) -> bool {
        let (id, inserted) = self.triples.insert_full(triple);
        if !inserted {
            return false;
        }
        let id = id as TripleId;
        // insert_full moved the triple in; read it back for the index keys
        let triple = self.triples.get_index(id as usize).cloned();
        if let Some(triple) = triple {
            self.by_subject.entry(triple.subject).or_default().push(id);
            self.by_predicate
                .entry(triple.predicate)
                .or_default()
                .push(id);
            self.by_object.entry(triple.object).or_default().push(id);
        }
        true
    }

    /// Check if a triple is present
    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    /// Total number of triples
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Iterate all triples in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Lazily yield triples equal to the pattern on its bound positions.
    ///
    /// All eight bound/unbound combinations are supported: the most selective
    /// bound position picks a posting list (subject, then object, then
    /// predicate), remaining positions are checked per candidate, and the
    /// all-wildcard pattern falls back to a full scan. Nothing beyond O(1)
    /// bookkeeping is allocated up front.
    pub fn matching(
        &self,
        subject: Option<Subject>,
        predicate: Option<NamedNode>,
        object: Option<Term>,
    ) -> Box<dyn Iterator<Item = &Triple> + '_> {
        static EMPTY: Vec<TripleId> = Vec::new();

        let candidates: Box<dyn Iterator<Item = &Triple>> = if let Some(s) = &subject {
            let ids = self.by_subject.get(s).unwrap_or(&EMPTY);
            Box::new(ids.iter().filter_map(|&id| self.triples.get_index(id as usize)))
        } else if let Some(o) = &object {
            let ids = self.by_object.get(o).unwrap_or(&EMPTY);
            Box::new(ids.iter().filter_map(|&id| self.triples.get_index(id as usize)))
        } else if let Some(p) = &predicate {
            let ids = self.by_predicate.get(p).unwrap_or(&EMPTY);
            Box::new(ids.iter().filter_map(|&id| self.triples.get_index(id as usize)))
        } else {
            Box::new(self.triples.iter())
        };

        Box::new(candidates.filter(move |t| {
            subject.as_ref().map_or(true, |s| &t.subject == s)
                && predicate.as_ref().map_or(true, |p| &t.predicate == p)
                && object.as_ref().map_or(true, |o| &t.object == o)
        }))
    }

    /// Store statistics: triple count plus distinct term counts per position
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_triples: self.triples.len(),
            distinct_subjects: self.by_subject.len(),
            distinct_predicates: self.by_predicate.len(),
            distinct_objects: self.by_object.len(),
        }
    }

    /// The bound prefix table
    pub fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    /// Mutable access to the prefix table (load phase only)
    pub fn namespaces_mut(&mut self) -> &mut NamespaceManager {
        &mut self.namespaces
    }
}

impl Default for TripleStore {
    fn default() -> Self {
        Self::new()
    }
}
