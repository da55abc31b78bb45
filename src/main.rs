use std::sync::Arc;

use ontoserve::http::{HttpServer, ServerConfig};
use ontoserve::rdf::{load_directory, TripleStore};
use ontoserve::sparql::SparqlEngine;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("OntoServe v{}", ontoserve::version());

    let config = ServerConfig::from_env();

    let mut store = TripleStore::new();
    store
        .namespaces_mut()
        .bind("devops", "https://w3id.org/devops-infra/");
    store
        .namespaces_mut()
        .bind("ex", "https://example.org/devops/");
    store.namespaces_mut().bind("dct", "http://purl.org/dc/terms/");

    match load_directory(&mut store, &config.data_dir) {
        Ok(report) => info!(
            files = report.files_loaded,
            skipped = report.files_failed,
            triples = report.triples_added,
            "seed data loaded"
        ),
        Err(e) => warn!(
            dir = %config.data_dir.display(),
            error = %e,
            "seed directory unreadable, starting with an empty store"
        ),
    }

    // freeze the store: from here on it is shared immutably
    let engine = Arc::new(SparqlEngine::new(Arc::new(store)));

    let server = HttpServer::new(engine, &config);
    if let Err(e) = server.start().await {
        eprintln!("server error: {}", e);
        std::process::exit(1);
    }
}
