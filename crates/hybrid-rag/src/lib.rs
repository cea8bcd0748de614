//! # Hybrid RAG
//!
//! **Multimodal retrieval and prompt assembly over a local SQLite index.**
//!
//! Text documents are chunked and embedded, product images are embedded
//! with a vision model, and both land in one index. A query combines BM25
//! over text with cosine similarity against the text and image vectors;
//! the hits become context for a prompt sent to an answer generator.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ docs/*.txt  │──▶│ BatchIndexer │──▶│  SQLite    │
//! │ images/*    │   │ chunk+encode │   │ FTS5+BLOB  │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │  (hrag)  │       │  /chat   │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! The pipeline itself (chunker, encoder adapter, schema manager, batch
//! indexer, hybrid query builder, prompt builder) lives in
//! `hybrid-rag-core`. This crate supplies the concrete collaborators and
//! the application surface.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Table creation |
//! | [`sqlite_store`] | `Store` implementation over SQLite |
//! | [`encoders`] | fastembed text and image encoders |
//! | [`generator`] | OpenAI-compatible answer generator |
//! | [`ingest`] | `hrag index`: directory walking and indexing runs |
//! | [`search`] | `hrag search` |
//! | [`chat`] | `hrag ask` and the shared answer flow |
//! | [`server`] | `hrag serve`: HTTP chat endpoint |

pub mod chat;
pub mod config;
pub mod db;
pub mod encoders;
pub mod generator;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
