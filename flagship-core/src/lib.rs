//! Core domain types for the Flagship feature-flag platform.
//!
//! This crate is runtime-free: it holds the domain model shared by the
//! evaluation service and its caching layer, the typed flag value
//! representation, the error taxonomy, and the deterministic bucketing
//! hash used for percentage rollouts.

pub mod domain;
pub mod duration;
pub mod error;
pub mod hash;

pub use domain::{
    BulkEvaluationResult, Environment, EvaluationResult, Flag, FlagType, FlagValue, FlagValueJson,
    InvalidationEvent, Variant,
};
pub use error::{FlagshipError, Result};
pub use hash::{compute_bucket, murmur3_32};
