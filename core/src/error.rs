use thiserror::Error;

/// Reasons a candidate block or chain is rejected.
///
/// Kept as a distinct enum (rather than a bare string) so callers — in
/// particular the `/receive_block` handler — can match on *kind* when
/// deciding whether to additionally schedule a sync pass, instead of
/// string-matching a message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("block index {index} is not greater than local tip index {tip_index}")]
    Stale { index: u64, tip_index: u64 },

    #[error("block index {index} leaves a gap after local tip index {tip_index}")]
    Orphan { index: u64, tip_index: u64 },

    #[error("block prev_hash does not match local tip hash")]
    LinkageMismatch,

    #[error("stored hash does not match recomputed hash")]
    HashMismatch,

    #[error("hash does not satisfy required difficulty {difficulty}")]
    InsufficientWork { difficulty: usize },

    #[error("chain is empty")]
    EmptyChain,

    #[error("chain[0] is not the canonical genesis block")]
    BadGenesis,
}

/// Errors surfaced by the core's persistence and validation plumbing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("block rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error("storage I/O error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("failed to (de)serialize chain state: {0}")]
    Serde(#[from] serde_json::Error),
}
