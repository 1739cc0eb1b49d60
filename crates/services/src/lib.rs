#![forbid(unsafe_code)]

pub mod error;
pub mod exam_loop;
pub mod ticker;
pub mod views;

pub use exam_core::{Clock, Session, SessionError, SessionProgress, SessionStatus};

pub use error::ExamServiceError;
pub use exam_loop::{ExamLoopService, SubmittedResult};
pub use ticker::{ExamSessionHandle, SessionTicker, SharedSession, TickerHandle};
pub use views::{
    OutcomeView, ResultHistoryService, ResultId, ResultListItem, ResultView, format_remaining,
};
