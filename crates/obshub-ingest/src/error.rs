//! Error types for the ingestion pipeline.

use obshub_db::StoreError;

/// Errors returned by pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The store rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The producer's unique id matches none of the handled-system patterns.
    #[error("producer {0} is not handled by this pipeline")]
    NotHandled(String),

    /// A group lists one of its own ancestors as a member.
    #[error("member cycle detected at producer {0}")]
    MemberCycle(String),

    /// Group nesting exceeds the supported depth.
    #[error("producer {uid} is nested {depth} levels deep")]
    MemberDepth {
        uid: String,
        depth: usize,
    },

    /// The pipeline was created outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// A blocking worker panicked or was cancelled.
    #[error("ingest worker failed: {0}")]
    Worker(String),
}
