//! HTTP surface of the evaluation service.

pub mod error;
pub mod middleware;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{router, AppState};
