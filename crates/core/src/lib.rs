//! `rollcall-core`: shared foundation types.
//!
//! Pure building blocks used by every other crate (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{EventId, RetryRecordId};
