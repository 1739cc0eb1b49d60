#![forbid(unsafe_code)]

//! Core engine for timed multiple-choice assessment sessions: domain model,
//! session state machine, countdown handling, and deterministic scoring.
//! No I/O happens here; storage and tick delivery live in sibling crates.

pub mod model;
pub mod scorer;
pub mod session;
pub mod time;

pub use session::{Session, SessionError, SessionProgress, SessionStatus};
pub use time::Clock;
