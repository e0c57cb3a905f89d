//! Resource lifecycle primitives for the Lucent engine.
//!
//! This crate provides the foundational cleanup machinery used throughout
//! the engine:
//! - The [`ResourceLedger`] LIFO teardown stack
//! - Aggregated teardown error reporting

pub mod ledger;

pub use ledger::{ResourceLedger, TeardownError, TeardownFailure};
