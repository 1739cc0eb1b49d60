#![forbid(unsafe_code)]

//! Storage adapters for the assessment engine's external collaborators:
//! the question bank, the entitlement facts, and the results history.

pub mod repository;
pub mod sqlite;
