//! # Lorekeeper Core
//!
//! Storage-agnostic logic for Lorekeeper: data models, progression tags,
//! chunking, the cache and vector-index traits, the embedding manager,
//! the content loader and the progression-aware retriever.
//!
//! This crate contains no sqlx, HTTP, or filesystem I/O. Concrete
//! backends (SQLite index, JSON cache file, walkdir corpus, network
//! embedding providers) live in the `lorekeeper` app crate; in-memory
//! implementations of every trait live in [`store::memory`].

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod intent;
pub mod loader;
pub mod models;
pub mod progression;
pub mod retrieval;
pub mod store;
pub mod tagging;

pub use error::LoreError;
