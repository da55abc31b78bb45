//! RDF data model and triple store
//!
//! This module provides the core graph representation:
//! - the term model (named nodes, blank nodes, literals)
//! - an indexed in-memory triple store with idempotent insertion
//! - namespace prefix management
//! - Turtle seed loading
//!
//! # Example
//!
//! ```rust
//! use ontoserve::rdf::{TripleStore, Triple, NamedNode, Literal};
//!
//! let mut store = TripleStore::new();
//!
//! let alice = NamedNode::new("http://example.org/alice");
//! let name = NamedNode::new("http://xmlns.com/foaf/0.1/name");
//! store.insert(Triple::new(alice.clone(), name, Literal::new_simple("Alice")));
//!
//! assert_eq!(store.matching(Some(alice.into()), None, None).count(), 1);
//! ```

mod loader;
mod namespace;
mod store;
mod term;
pub mod vocab;

pub use loader::{load_directory, load_turtle_file, load_turtle_str, LoadError, LoadReport, LoadResult};
pub use namespace::{NamespaceManager, PrefixError, PrefixResult};
pub use store::{StoreStats, TripleStore};
pub use term::{BlankNode, Literal, NamedNode, RdfError, RdfResult, Subject, Term, Triple};
