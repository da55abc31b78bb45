//! HTTP handlers for the SPARQL endpoint

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::{json, Map};
use tracing::debug;

use crate::sparql::SparqlEngine;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const NTRIPLES: &str = "application/n-triples";

/// JSON request body for `POST /sparql`
#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

/// `POST /sparql`: run a query.
///
/// The query text is taken from the request body according to its content
/// type: a `query` form field, a raw `application/sparql-query` body, or a
/// JSON object with a `query` member. SELECT and ASK answer with SPARQL
/// JSON results, CONSTRUCT with N-Triples.
pub async fn sparql_handler(
    State(engine): State<Arc<SparqlEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let Some(query) = extract_query(content_type, &body) else {
        return error_response("missing SPARQL query in request body");
    };

    debug!(query = %query, "running query");

    match engine.run(&query) {
        Ok(results) => {
            if let Some(doc) = results.to_json() {
                ([(CONTENT_TYPE, SPARQL_RESULTS_JSON)], Json(doc)).into_response()
            } else {
                let triples = results.to_ntriples().unwrap_or_default();
                ([(CONTENT_TYPE, NTRIPLES)], triples).into_response()
            }
        }
        Err(e) => error_response(&e.to_string()),
    }
}

/// `GET /stats`: triple counts and bound prefixes
pub async fn stats_handler(State(engine): State<Arc<SparqlEngine>>) -> Response {
    let stats = engine.store().stats();
    let mut namespaces = Map::new();
    for (prefix, iri) in engine.store().namespaces().iter() {
        namespaces.insert(prefix.to_string(), json!(iri));
    }
    Json(json!({
        "total_triples": stats.total_triples,
        "distinct_subjects": stats.distinct_subjects,
        "distinct_predicates": stats.distinct_predicates,
        "distinct_objects": stats.distinct_objects,
        "namespaces": namespaces,
    }))
    .into_response()
}

/// `GET /health`: liveness check with the loaded triple count
pub async fn health_handler(State(engine): State<Arc<SparqlEngine>>) -> Response {
    Json(json!({
        "status": "healthy",
        "triples": engine.store().len(),
    }))
    .into_response()
}

fn error_response(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": { "message": message } })),
    )
        .into_response()
}

/// Pull the query text out of the request body based on its content type.
///
/// Supported shapes, mirroring common SPARQL clients:
/// - `application/x-www-form-urlencoded` (or no content type): `query` field
/// - `application/sparql-query`: the raw body
/// - `application/json`: `{"query": "..."}`
fn extract_query(content_type: &str, body: &[u8]) -> Option<String> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "" | "application/x-www-form-urlencoded" => {
            let body = std::str::from_utf8(body).ok()?;
            for pair in body.split('&') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                if key == "query" {
                    let spaced = value.replace('+', " ");
                    let decoded = percent_decode_str(&spaced).decode_utf8().ok()?;
                    return Some(decoded.into_owned());
                }
            }
            None
        }
        "application/sparql-query" => {
            let query = std::str::from_utf8(body).ok()?;
            (!query.trim().is_empty()).then(|| query.to_string())
        }
        "application/json" => {
            let request: QueryRequest = serde_json::from_slice(body).ok()?;
            Some(request.query)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_form() {
        let body = b"query=SELECT%20%3Fs%20WHERE%20%7B%20%3Fs%20%3Fp%20%3Fo%20%7D";
        assert_eq!(
            extract_query("application/x-www-form-urlencoded", body),
            Some("SELECT ?s WHERE { ?s ?p ?o }".to_string())
        );
        // '+' decodes to space
        assert_eq!(
            extract_query("application/x-www-form-urlencoded", b"query=ASK+%7B%7D"),
            Some("ASK {}".to_string())
        );
        // missing field
        assert_eq!(
            extract_query("application/x-www-form-urlencoded", b"q=SELECT"),
            None
        );
    }

    #[test]
    fn test_extract_raw_query() {
        assert_eq!(
            extract_query(
                "application/sparql-query; charset=utf-8",
                b"ASK { ?s ?p ?o }"
            ),
            Some("ASK { ?s ?p ?o }".to_string())
        );
        assert_eq!(extract_query("application/sparql-query", b"   "), None);
    }

    #[test]
    fn test_extract_from_json() {
        assert_eq!(
            extract_query("application/json", br#"{"query": "ASK { ?s ?p ?o }"}"#),
            Some("ASK { ?s ?p ?o }".to_string())
        );
        assert_eq!(extract_query("application/json", br#"{"q": "x"}"#), None);
        assert_eq!(extract_query("application/json", b"not json"), None);
    }

    #[test]
    fn test_missing_content_type_falls_back_to_form() {
        assert_eq!(
            extract_query("", b"query=ASK%20%7B%7D"),
            Some("ASK {}".to_string())
        );
    }

    #[test]
    fn test_unsupported_content_type() {
        assert_eq!(extract_query("text/turtle", b"query=x"), None);
    }
}
