//! # OntoServe
//!
//! An in-memory RDF triple store with a SPARQL query engine and a small
//! HTTP endpoint, built for serving read-only ontology snapshots:
//!
//! - **rdf**: term model, indexed triple store, namespaces, Turtle loading
//! - **sparql**: query parsing, algebra, pull-based evaluation, results
//!   serialization (SPARQL JSON, N-Triples)
//! - **http**: the `/sparql`, `/stats` and `/health` endpoints
//!
//! The store is populated once at startup and then frozen; every query runs
//! against the same immutable snapshot, so results are deterministic and
//! request handling needs no locks.

pub mod http;
pub mod rdf;
pub mod sparql;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the library
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::version().is_empty());
    }
}
