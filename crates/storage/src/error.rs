use thiserror::Error;

/// Errors a `Backend` implementation can report. The backend itself is an
/// external collaborator (spec.md §1); this crate only pins down the
/// contract and a reference in-memory implementation for tests.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("payouts are already locked")]
    PayoutsLocked,
    #[error("no pending payment exists for {login}")]
    NoPendingPayment { login: String },
    #[error("insufficient balance for {login}: have {have}, need {need}")]
    InsufficientBalance { login: String, have: i64, need: i64 },
    #[error("backend I/O error: {0}")]
    Io(String),
}
