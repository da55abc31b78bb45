//! End-to-end query tests: Turtle in, SPARQL results out

use std::sync::Arc;

use serde_json::json;

use ontoserve::rdf::{load_turtle_str, TripleStore};
use ontoserve::sparql::{ParseError, SparqlEngine, SparqlError, SparqlResults};

const TEAM: &str = r#"
    @prefix ex: <http://example.org/> .
    @prefix foaf: <http://xmlns.com/foaf/0.1/> .

    ex:alice a foaf:Person ;
        foaf:name "Alice" ;
        foaf:age 30 ;
        foaf:mbox <mailto:alice@example.org> .
    ex:bob a foaf:Person ;
        foaf:name "Bob" ;
        foaf:age 24 .
    ex:carol a foaf:Person ;
        foaf:name "Carola"@de ;
        foaf:age 41 .
"#;

fn engine() -> SparqlEngine {
    let mut store = TripleStore::new();
    store.namespaces_mut().bind("ex", "http://example.org/");
    load_turtle_str(&mut store, TEAM).unwrap();
    SparqlEngine::new(Arc::new(store))
}

#[test]
fn test_select_json_document() {
    let results = engine()
        .run("SELECT ?name ?age WHERE { ex:alice foaf:name ?name . ex:alice foaf:age ?age }")
        .unwrap();
    assert_eq!(
        results.to_json().unwrap(),
        json!({
            "head": { "vars": ["name", "age"] },
            "results": { "bindings": [{
                "name": { "type": "literal", "value": "Alice" },
                "age": {
                    "type": "literal",
                    "value": "30",
                    "datatype": "http://www.w3.org/2001/XMLSchema#integer",
                },
            }]},
        })
    );
}

#[test]
fn test_language_tag_serialization() {
    let results = engine()
        .run("SELECT ?name WHERE { ex:carol foaf:name ?name }")
        .unwrap();
    let doc = results.to_json().unwrap();
    assert_eq!(
        doc["results"]["bindings"][0]["name"],
        json!({ "type": "literal", "value": "Carola", "xml:lang": "de" })
    );
}

#[test]
fn test_optional_leaves_variable_out_of_binding() {
    let results = engine()
        .run(
            "SELECT ?s ?mbox WHERE { ?s a foaf:Person . OPTIONAL { ?s foaf:mbox ?mbox } } ORDER BY ?s",
        )
        .unwrap();
    let doc = results.to_json().unwrap();
    let bindings = doc["results"]["bindings"].as_array().unwrap();
    assert_eq!(bindings.len(), 3);
    // head.vars always lists the projection, bound or not
    assert_eq!(doc["head"]["vars"], json!(["s", "mbox"]));
    let bound = bindings.iter().filter(|b| b.get("mbox").is_some()).count();
    assert_eq!(bound, 1);
}

#[test]
fn test_ask_documents() {
    let engine = engine();
    assert_eq!(
        engine.run("ASK { ex:alice foaf:age 30 }").unwrap().to_json().unwrap(),
        json!({ "head": {}, "boolean": true })
    );
    assert_eq!(
        engine.run("ASK { ex:alice foaf:age 99 }").unwrap().to_json().unwrap(),
        json!({ "head": {}, "boolean": false })
    );
}

#[test]
fn test_filter_and_order_pipeline() {
    let results = engine()
        .run(
            "SELECT ?name WHERE { ?s foaf:name ?name . ?s foaf:age ?age . FILTER(?age >= 25) } ORDER BY DESC(?age) LIMIT 1",
        )
        .unwrap();
    let doc = results.to_json().unwrap();
    let bindings = doc["results"]["bindings"].as_array().unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0]["name"]["value"], "Carola");
}

#[test]
fn test_union_branches_combine() {
    let results = engine()
        .run(
            "SELECT ?v WHERE { { ex:alice foaf:name ?v } UNION { ex:alice foaf:mbox ?v } }",
        )
        .unwrap();
    let doc = results.to_json().unwrap();
    let bindings = doc["results"]["bindings"].as_array().unwrap();
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[1]["v"]["type"], "uri");
}

#[test]
fn test_construct_emits_ntriples() {
    let results = engine()
        .run(
            "CONSTRUCT { ?s ex:years ?age } WHERE { ?s foaf:age ?age . FILTER(?age < 30) }",
        )
        .unwrap();
    assert!(matches!(results, SparqlResults::Graph(_)));
    assert_eq!(
        results.to_ntriples().unwrap(),
        "<http://example.org/bob> <http://example.org/years> \
         \"24\"^^<http://www.w3.org/2001/XMLSchema#integer> .\n"
    );
    assert!(results.to_json().is_none());
}

#[test]
fn test_results_stable_across_runs() {
    let engine = engine();
    let query = "SELECT ?s ?p ?o WHERE { ?s ?p ?o }";
    let first = engine.run(query).unwrap().to_json().unwrap();
    let second = engine.run(query).unwrap().to_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_syntax_error_reported() {
    let err = engine().run("SELECT ?s WHERE { ?s ?p ").unwrap_err();
    assert!(matches!(err, SparqlError::Parse(ParseError::Syntax(_))));
}

#[test]
fn test_unsupported_construct_named_in_error() {
    let err = engine()
        .run("SELECT ?s WHERE { ?s foaf:knows+ ?o }")
        .unwrap_err();
    let SparqlError::Parse(ParseError::Unsupported(msg)) = err else {
        panic!("expected unsupported feature error");
    };
    assert!(msg.contains("property paths"));
}

#[test]
fn test_store_snapshot_shared_between_engines() {
    let mut store = TripleStore::new();
    load_turtle_str(&mut store, TEAM).unwrap();
    let store = Arc::new(store);

    let a = SparqlEngine::new(Arc::clone(&store));
    let b = SparqlEngine::new(store);
    let query = "ASK { ?s ?p ?o }";
    assert_eq!(a.run(query).unwrap(), b.run(query).unwrap());
}
