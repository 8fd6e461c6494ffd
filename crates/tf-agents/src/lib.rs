//! Assignment and rebalancing policy engine.
//!
//! The pure planning steps live in [`workload`], [`assignment`],
//! [`rebalance`] and [`progress`]. [`dispatcher::Dispatcher`] runs them
//! against an [`EntityStore`](tf_core::store::EntityStore) one operation at a
//! time.

pub mod assignment;
pub mod audit;
pub mod directory;
pub mod dispatcher;
pub mod progress;
pub mod rebalance;
pub mod workload;

use thiserror::Error;
use tf_core::store::StoreError;
use uuid::Uuid;

/// Failures surfaced to whoever invoked an engine operation.
///
/// Oracle trouble never shows up here; it is absorbed by the fallbacks.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("persistence failed: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Persistence(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

pub use dispatcher::{CreateTaskRequest, CreatedTask, Dispatcher, HealthCheckReport};
