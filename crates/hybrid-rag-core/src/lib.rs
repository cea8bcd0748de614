//! # Hybrid RAG Core
//!
//! The retrieval and prompt-assembly pipeline behind `hrag`: chunking,
//! the encoder adapter, index schema management, batch indexing, hybrid
//! query construction, and per-session prompt building.
//!
//! This crate has no database, HTTP, or CLI dependencies. Storage is
//! reached only through the [`store::Store`] trait; models are reached
//! only through the [`embedding::TextEncoder`] and
//! [`embedding::ImageEncoder`] traits. [`store::memory::InMemoryStore`]
//! implements `Store` for tests.
//!
//! # Pipeline
//!
//! ```text
//! sources ─▶ chunk ─▶ EncoderAdapter ─▶ BatchIndexer ─▶ Store
//!                                                        │
//! query (+ image) ─▶ HybridQueryBuilder ─▶ QuerySpec ────┘
//!                                                        ▼
//!                         PromptBuilder ◀── contexts ◀── hits
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod models;
pub mod prompt;
pub mod query;
pub mod retrieval;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
