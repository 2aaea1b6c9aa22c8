use std::time::Duration;

/// The three submitted fields of a share/block, carried through to the
/// backend row exactly as the miner sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareParams {
    pub nonce: String,
    pub header_hash: String,
    pub mix_digest: String,
}

/// A durable record that a miner was debited for an in-flight payment
/// (spec.md §3, "Pending payment"). Its presence is the at-most-once-
/// payment invariant: a transaction has been debited but may not yet be
/// broadcast or confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPayment {
    pub login: String,
    /// Amount in shannon.
    pub amount: i64,
    pub timestamp_unix: u64,
}

/// Arguments to [`Backend::write_share`](crate::Backend::write_share) and
/// [`Backend::write_block`](crate::Backend::write_block), bundled to keep
/// those signatures from growing an unmanageable number of positional
/// parameters as the teacher's `reth-storage-api` trait methods do for
/// their own multi-field writes.
#[derive(Debug, Clone)]
pub struct ShareRecord {
    pub login: String,
    pub worker: String,
    pub params: ShareParams,
    pub share_difficulty: i64,
    pub height: u64,
    pub hashrate_expiration: Duration,
}

#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub login: String,
    pub worker: String,
    pub params: ShareParams,
    pub share_difficulty: i64,
    pub block_difficulty: i64,
    pub height: u64,
    pub hashrate_expiration: Duration,
}
