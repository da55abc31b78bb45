//! HTTP server for the SPARQL endpoint

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::sparql::SparqlEngine;

use super::handler::{health_handler, sparql_handler, stats_handler};

/// Server configuration, read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (`ONTOSERVE_HOST`, default `0.0.0.0`)
    pub host: String,
    /// Bind port (`ONTOSERVE_PORT`, default `8000`)
    pub port: u16,
    /// Directory of Turtle seed files (`ONTOSERVE_DATA_DIR`, default `data`)
    pub data_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let host = env::var("ONTOSERVE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("ONTOSERVE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);
        let data_dir = env::var("ONTOSERVE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        Self {
            host,
            port,
            data_dir,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// HTTP server exposing the query engine
pub struct HttpServer {
    engine: Arc<SparqlEngine>,
    host: String,
    port: u16,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(engine: Arc<SparqlEngine>, config: &ServerConfig) -> Self {
        Self {
            engine,
            host: config.host.clone(),
            port: config.port,
        }
    }

    /// The request router, exposed for in-process testing
    pub fn router(&self) -> Router {
        Router::new()
            .route("/sparql", post(sparql_handler))
            .route("/stats", get(stats_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.engine))
    }

    /// Start serving requests
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(
            triples = self.engine.store().len(),
            "SPARQL endpoint available at http://{}/sparql", addr
        );

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
