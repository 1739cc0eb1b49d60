//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::session::SessionError;
use storage::repository::StorageError;

/// Errors emitted by `ExamLoopService` and the result history.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamServiceError {
    #[error("session has not been submitted yet")]
    NotSubmitted,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
