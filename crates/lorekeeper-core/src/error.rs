//! Fatal error conditions callers need to tell apart.
//!
//! Everything else flows through `anyhow::Error`; these variants are
//! wrapped into it and recovered with `err.downcast_ref::<LoreError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoreError {
    /// The embedding model produces vectors of a different size than
    /// the ones already stored in the index.
    #[error("embedding dimension mismatch: index holds {expected}-dim vectors, provider produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The corpus root could not be listed at all.
    #[error("corpus unreadable at {root}: {reason}")]
    CorpusUnreadable { root: String, reason: String },

    /// A lock guarding shared state was poisoned by a panicking writer.
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}
