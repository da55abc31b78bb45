//! Namespace prefix management
//!
//! Maps short prefix labels to IRI namespaces for compact notation in
//! queries and display. Prefixes never affect term identity.

use indexmap::IndexMap;
use thiserror::Error;

/// Prefix errors
#[derive(Error, Debug)]
pub enum PrefixError {
    /// Unknown prefix
    #[error("Unknown prefix: {0}")]
    UnknownPrefix(String),

    /// Not a prefixed name
    #[error("Not a prefixed name: {0}")]
    NotPrefixed(String),
}

pub type PrefixResult<T> = Result<T, PrefixError>;

/// Prefix table with the common RDF prefixes bound by default.
///
/// Insertion-ordered so listings (query prologues, `/stats`) come out in a
/// stable order.
#[derive(Debug, Clone)]
pub struct NamespaceManager {
    prefixes: IndexMap<String, String>,
}

impl NamespaceManager {
    /// Create a namespace manager with the common prefixes bound
    pub fn new() -> Self {
        let mut mgr = Self {
            prefixes: IndexMap::new(),
        };

        mgr.bind("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        mgr.bind("rdfs", "http://www.w3.org/2000/01/rdf-schema#");
        mgr.bind("xsd", "http://www.w3.org/2001/XMLSchema#");
        mgr.bind("owl", "http://www.w3.org/2002/07/owl#");
        mgr.bind("foaf", "http://xmlns.com/foaf/0.1/");
        mgr.bind("dc", "http://purl.org/dc/elements/1.1/");
        mgr.bind("dcterms", "http://purl.org/dc/terms/");

        mgr
    }

    /// Create an empty namespace manager
    pub fn empty() -> Self {
        Self {
            prefixes: IndexMap::new(),
        }
    }

    /// Bind a prefix to a namespace IRI, replacing any previous binding
    pub fn bind(&mut self, prefix: impl Into<String>, iri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), iri.into());
    }

    /// Get the namespace IRI bound to a prefix
    pub fn get(&self, prefix: &str) -> PrefixResult<&str> {
        self.prefixes
            .get(prefix)
            .map(String::as_str)
            .ok_or_else(|| PrefixError::UnknownPrefix(prefix.to_string()))
    }

    /// Expand a prefixed name (`prefix:local`) to a full IRI
    pub fn expand(&self, prefixed: &str) -> PrefixResult<String> {
        let (prefix, local) = prefixed
            .split_once(':')
            .ok_or_else(|| PrefixError::NotPrefixed(prefixed.to_string()))?;
        let iri = self.get(prefix)?;
        Ok(format!("{}{}", iri, local))
    }

    /// Compact an IRI using the longest matching bound namespace
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.prefixes
            .iter()
            .filter(|(_, ns)| iri.starts_with(ns.as_str()))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| format!("{}:{}", prefix, &iri[ns.len()..]))
    }

    /// Iterate bound (prefix, namespace IRI) pairs in binding order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, i)| (p.as_str(), i.as_str()))
    }

    /// Number of bound prefixes
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Check if no prefixes are bound
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl Default for NamespaceManager {
    fn default() -> Self {
        Self::new()
    }
}
