//! # Lorekeeper
//!
//! Retrieval over a tabletop campaign corpus that never spoils what the
//! party has not reached yet.
//!
//! Campaign files are tagged with the act, arc and location they belong
//! to, chunked, embedded, and stored in SQLite. Queries are answered
//! relative to a progression state: later-act content is dropped, and
//! current-act, local, and on-branch content is boosted.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  FsCorpus    │──▶│  ContentLoader   │──▶│ SqliteIndex  │
//! │ walk + globs │   │ tag/chunk/embed  │   │  vectors     │
//! └──────────────┘   └────────┬─────────┘   └──────┬───────┘
//!                             ▼                    ▼
//!                     ┌──────────────┐      ┌─────────────┐
//!                     │JsonCacheStore│      │  Retriever  │
//!                     └──────────────┘      └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lore init
//! lore sync
//! lore retrieve "who guards the harbour gate" --act 2 --location harbour
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | The [`Lorekeeper`] application handle |
//! | [`connector_fs`] | Filesystem corpus |
//! | [`cache_file`] | JSON cache store with atomic replace |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`embedding`] | Embedding providers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache_file;
pub mod config;
pub mod connector_fs;
pub mod context;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod retrieve;
pub mod sqlite_index;
pub mod stats;

pub use context::Lorekeeper;
