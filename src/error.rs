use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use crate::store::InstitutionId;


#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound("record".into()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_owned())
            },
            err => StoreError::Query(err.to_string()),
        }
    }
}


/// Failure of an append that first reads the account's latest status.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("failed to read the latest status: {0}")]
    Lookup(#[source] StoreError),
    #[error("failed to store the status: {0}")]
    Append(#[source] StoreError),
}

impl From<StoreError> for AppendError {
    fn from(err: StoreError) -> Self {
        AppendError::Lookup(err)
    }
}

impl From<DieselError> for AppendError {
    fn from(err: DieselError) -> Self {
        AppendError::Append(err.into())
    }
}


#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Previous status or membership could not be read. Nothing was written.
    #[error("failed to look up current status: {0}")]
    Lookup(#[source] StoreError),
    /// The submission itself was not stored. Nothing was written.
    #[error("failed to store the status: {0}")]
    Append(#[source] StoreError),
    /// Counters of the one institution being joined were not updated.
    #[error("failed to update institution counters: {0}")]
    Write(#[source] StoreError),
    /// The submission is stored but some institutions kept stale counters.
    #[error("counters of institution(s) {failed:?} were not updated")]
    PartialWrite {
        applied: Vec<InstitutionId>,
        failed: Vec<InstitutionId>,
    },
}

impl From<AppendError> for ReconcileError {
    fn from(err: AppendError) -> Self {
        match err {
            AppendError::Lookup(err) => ReconcileError::Lookup(err),
            AppendError::Append(err) => ReconcileError::Append(err),
        }
    }
}
