//! Flagship evaluation service.
//!
//! Answers "what value does flag F have for user U in environment E?"
//! under heavy read load: a tiered cache in front of Postgres, a
//! deterministic percentage-rollout evaluator, and a thin axum surface.

pub mod api;
pub mod config;
pub mod repository;
pub mod service;

pub use config::Config;
pub use repository::{FlagStore, PgFlagStore};
pub use service::EvaluationService;
