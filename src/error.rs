use crate::config::ConfigError;
use crate::date_safety::DateError;
use crate::persistence::PersistenceError;
use thiserror::Error;

pub use crate::distributor::DistributionError;
pub use crate::store::StoreError;

/// Everything the [`crate::StudyPlanner`] facade can fail with.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    InvalidDate(#[from] DateError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::Persistence(PersistenceError::Serialization(err))
    }
}

pub type PlannerResult<T> = Result<T, PlannerError>;
