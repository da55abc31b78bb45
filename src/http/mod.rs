//! HTTP boundary
//!
//! A thin axum layer over the query engine: `POST /sparql` runs queries,
//! `GET /stats` reports store statistics, `GET /health` is a liveness probe.
//! The store is loaded before the server starts and shared immutably, so
//! handlers never lock.

mod handler;
mod server;

pub use server::{HttpServer, ServerConfig};
