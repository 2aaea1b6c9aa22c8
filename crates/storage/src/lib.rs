//! Backend contract (spec.md §6) for balances, shares, blocks, node state
//! and the pending-payment log, plus an in-memory reference
//! implementation used by tests and standalone runs.

pub mod backend;
pub mod error;
pub mod memory;
pub mod types;

pub use backend::{Backend, SharedBackend};
pub use error::StorageError;
pub use memory::MemoryBackend;
pub use types::{BlockRecord, PendingPayment, ShareParams, ShareRecord};
