use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing or unusable connection settings.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The remote database could not be reached.
    #[error("connectivity error: {0}")]
    Connectivity(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Db(String),
    #[error("model error: {0}")]
    Model(#[from] models::errors::ModelError),
}

impl StoreError {
    pub fn empty_id(kind: &str) -> Self {
        Self::Validation(format!("{kind} id must not be empty"))
    }
}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        match e {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => Self::Connectivity(e.to_string()),
            other => Self::Db(other.to_string()),
        }
    }
}
