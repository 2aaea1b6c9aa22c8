//! The payout engine (C7), grounded in
//! `examples/original_source/server/payouts/payer.go`.

pub mod config;
pub mod engine;
pub mod error;

pub use config::PayoutsConfig;
pub use engine::PayoutEngine;
pub use error::PayoutError;
