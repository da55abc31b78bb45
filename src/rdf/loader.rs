//! Turtle seed loading
//!
//! Bulk-loads triples from Turtle sources into the store at startup using
//! the `rio_turtle` parser. Directory loading is partial-failure tolerant:
//! a malformed file is reported and skipped, the remaining sources still
//! load, and startup proceeds.

use std::fs;
use std::io::BufReader;
use std::path::Path;

use rio_api::model as rio;
use rio_api::parser::TriplesParser;
use rio_turtle::{TurtleError, TurtleParser};
use thiserror::Error;
use tracing::{info, warn};

use super::store::TripleStore;
use super::term::{BlankNode, Literal, NamedNode, Subject, Term, Triple};

/// Seed loading errors, reported per source
#[derive(Error, Debug)]
pub enum LoadError {
    /// Source unreadable
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed Turtle
    #[error("Turtle syntax error: {0}")]
    Syntax(#[from] TurtleError),

    /// A triple the store cannot represent
    #[error("Unsupported triple: {0}")]
    UnsupportedTriple(String),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Outcome of loading a directory of seed files
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Files successfully loaded
    pub files_loaded: usize,
    /// Files skipped due to errors
    pub files_failed: usize,
    /// Triples newly inserted (duplicates across files excluded)
    pub triples_added: usize,
}

fn convert_subject(subject: rio::Subject<'_>) -> LoadResult<Subject> {
    match subject {
        rio::Subject::NamedNode(n) => Ok(NamedNode::new(n.iri).into()),
        rio::Subject::BlankNode(b) => Ok(BlankNode::new(b.id).into()),
        #[allow(unreachable_patterns)]
        _ => Err(LoadError::UnsupportedTriple(
            "RDF-star quoted triple in subject position".to_string(),
        )),
    }
}

fn convert_literal(literal: rio::Literal<'_>) -> LoadResult<Literal> {
    match literal {
        rio::Literal::Simple { value } => Ok(Literal::new_simple(value)),
        rio::Literal::LanguageTaggedString { value, language } => {
            Literal::new_language_tagged(value, language)
                .map_err(|e| LoadError::UnsupportedTriple(e.to_string()))
        }
        rio::Literal::Typed { value, datatype } => {
            Ok(Literal::new_typed(value, NamedNode::new(datatype.iri)))
        }
    }
}

fn convert_object(term: rio::Term<'_>) -> LoadResult<Term> {
    match term {
        rio::Term::NamedNode(n) => Ok(NamedNode::new(n.iri).into()),
        rio::Term::BlankNode(b) => Ok(BlankNode::new(b.id).into()),
        rio::Term::Literal(l) => Ok(convert_literal(l)?.into()),
        #[allow(unreachable_patterns)]
        _ => Err(LoadError::UnsupportedTriple(
            "RDF-star quoted triple in object position".to_string(),
        )),
    }
}

/// Parse a Turtle document and insert its triples. Returns the number of
/// newly inserted triples (idempotent re-inserts are not counted).
pub fn load_turtle_str(store: &mut TripleStore, input: &str) -> LoadResult<usize> {
    let mut parser = TurtleParser::new(BufReader::new(input.as_bytes()), None);
    let mut added = 0usize;

    parser.parse_all(&mut |t| -> LoadResult<()> {
        let triple = Triple::new(
            convert_subject(t.subject)?,
            NamedNode::new(t.predicate.iri),
            convert_object(t.object)?,
        );
        if store.insert(triple) {
            added += 1;
        }
        Ok(())
    })?;

    Ok(added)
}

/// Load one Turtle file
pub fn load_turtle_file(store: &mut TripleStore, path: &Path) -> LoadResult<usize> {
    let input = fs::read_to_string(path)?;
    load_turtle_str(store, &input)
}

/// Load every `*.ttl` file in a directory, skipping files that fail.
///
/// Returns an error only if the directory itself cannot be read.
pub fn load_directory(store: &mut TripleStore, dir: &Path) -> LoadResult<LoadReport> {
    let mut report = LoadReport::default();

    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "ttl"))
        .collect();
    paths.sort();

    for path in paths {
        match load_turtle_file(store, &path) {
            Ok(added) => {
                info!(file = %path.display(), triples = added, "loaded seed file");
                report.files_loaded += 1;
                report.triples_added += added;
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping seed file");
                report.files_failed += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        @prefix ex: <http://example.org/> .
        @prefix foaf: <http://xmlns.com/foaf/0.1/> .

        ex:alice a foaf:Person ;
            foaf:name "Alice" ;
            foaf:age 30 .
        ex:bob foaf:name "Bob"@en .
    "#;

    #[test]
    fn test_load_turtle_str() {
        let mut store = TripleStore::new();
        let added = load_turtle_str(&mut store, SAMPLE).unwrap();
        assert_eq!(added, 4);
        assert_eq!(store.len(), 4);

        // numeric shorthand carries xsd:integer
        let age: Term = Literal::new_typed(
            "30",
            NamedNode::new("http://www.w3.org/2001/XMLSchema#integer"),
        )
        .into();
        assert_eq!(store.matching(None, None, Some(age)).count(), 1);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let mut store = TripleStore::new();
        load_turtle_str(&mut store, SAMPLE).unwrap();
        let added = load_turtle_str(&mut store, SAMPLE).unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_malformed_turtle() {
        let mut store = TripleStore::new();
        let result = load_turtle_str(&mut store, "ex:broken without prefix or dot");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_directory_tolerates_bad_file() {
        let dir = tempfile::tempdir().unwrap();

        let mut good = fs::File::create(dir.path().join("good.ttl")).unwrap();
        good.write_all(SAMPLE.as_bytes()).unwrap();

        let mut bad = fs::File::create(dir.path().join("bad.ttl")).unwrap();
        bad.write_all(b"this is { not turtle").unwrap();

        // non-ttl files are ignored
        fs::File::create(dir.path().join("notes.txt")).unwrap();

        let mut store = TripleStore::new();
        let report = load_directory(&mut store, dir.path()).unwrap();
        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.triples_added, 4);
        assert_eq!(store.len(), 4);
    }
}
