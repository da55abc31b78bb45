//! SPARQL query engine
//!
//! Parses and evaluates a SPARQL subset (SELECT / ASK / CONSTRUCT over basic
//! graph patterns with FILTER, OPTIONAL, UNION, ORDER BY, LIMIT/OFFSET)
//! against a frozen [`TripleStore`] snapshot:
//!
//! - `parser`: pest grammar and lowering to the query algebra
//! - `algebra`: the operator tree evaluated by the engine
//! - `eval`: pull-based evaluation
//! - `results`: SPARQL JSON and N-Triples serialization
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ontoserve::rdf::{load_turtle_str, TripleStore};
//! use ontoserve::sparql::{SparqlEngine, SparqlResults};
//!
//! let mut store = TripleStore::new();
//! load_turtle_str(
//!     &mut store,
//!     r#"@prefix foaf: <http://xmlns.com/foaf/0.1/> .
//!        <http://example.org/alice> foaf:name "Alice" ."#,
//! )?;
//!
//! let engine = SparqlEngine::new(Arc::new(store));
//! let results = engine.run("SELECT ?name WHERE { ?s foaf:name ?name }")?;
//! let SparqlResults::Bindings { solutions, .. } = results else { unreachable!() };
//! assert_eq!(solutions.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod algebra;
mod eval;
mod parser;
mod results;

pub use algebra::{
    Algebra, BinaryOp, Builtin, Expression, OrderKey, Query, QueryForm, TermPattern, TriplePattern,
};
pub use parser::{parse_query, ParseError, ParseResult};
pub use results::{QuerySolution, SparqlResults};

use std::sync::Arc;

use thiserror::Error;

use crate::rdf::TripleStore;

/// Errors surfaced by [`SparqlEngine::run`].
///
/// Evaluation itself cannot fail: expression errors discard the affected
/// solution instead of aborting the query.
#[derive(Error, Debug)]
pub enum SparqlError {
    /// The query could not be parsed or uses an unsupported feature
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub type SparqlResult<T> = Result<T, SparqlError>;

/// Query engine over a shared, frozen store snapshot
pub struct SparqlEngine {
    store: Arc<TripleStore>,
}

impl SparqlEngine {
    pub fn new(store: Arc<TripleStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &TripleStore {
        &self.store
    }

    /// Parse and evaluate one query. Prefixed names fall back to the
    /// store's bound prefix table when the query prologue does not declare
    /// them.
    pub fn run(&self, query: &str) -> SparqlResult<SparqlResults> {
        let parsed = parse_query(query, self.store.namespaces())?;
        Ok(eval::evaluate_query(&self.store, &parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::load_turtle_str;

    fn engine() -> SparqlEngine {
        let mut store = TripleStore::new();
        load_turtle_str(
            &mut store,
            r#"@prefix foaf: <http://xmlns.com/foaf/0.1/> .
               <http://example.org/alice> foaf:name "Alice" ."#,
        )
        .unwrap();
        SparqlEngine::new(Arc::new(store))
    }

    #[test]
    fn test_run_select() {
        let results = engine().run("SELECT ?name WHERE { ?s foaf:name ?name }").unwrap();
        let SparqlResults::Bindings { variables, solutions } = results else {
            panic!("expected bindings");
        };
        assert_eq!(variables, vec!["name"]);
        assert_eq!(solutions.len(), 1);
    }

    #[test]
    fn test_run_reports_parse_errors() {
        let err = engine().run("SELECT ?x WHERE {").unwrap_err();
        assert!(matches!(err, SparqlError::Parse(ParseError::Syntax(_))));

        let err = engine().run("SELECT DISTINCT ?x WHERE { ?x ?p ?o }").unwrap_err();
        assert!(matches!(err, SparqlError::Parse(ParseError::Unsupported(_))));
    }
}
