#![deny(missing_docs)]

//! Core library for the Rusty RAG document indexer.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Indexing metrics helpers.
pub mod metrics;
/// Document indexing pipeline.
pub mod processing;
/// Vector store abstraction and backends.
pub mod store;
