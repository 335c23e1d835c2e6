//! `rollcall-retry`
//!
//! **Responsibility:** the retry lifecycle as pure domain logic.
//!
//! - Decides the outcome of an attempt from a work-item key (placeholder rule).
//! - Maps an outcome to the next [`RetryState`] under an attempt budget.
//! - Produces new [`RetryRecord`] values on every transition (replace-on-write).
//!
//! No IO, no async, no clocks: callers pass `now` explicitly.

pub mod outcome;
pub mod policy;
pub mod record;
pub mod state;
pub mod task;

pub use outcome::{OutcomeCode, decide_by_last_digit};
pub use policy::RetryPolicy;
pub use record::RetryRecord;
pub use state::{RetryState, next_state};
pub use task::TaskType;
