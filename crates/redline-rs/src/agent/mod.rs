//! The reasoning loop around a [`BudgetRun`](crate::budget::BudgetRun).
//!
//! - [`harness`]: [`Harness`] and the per-round [`ReasoningContext`]
//! - [`config`]: [`HarnessConfig`]
//! - [`events`]: [`HarnessEvent`], handlers and [`HarnessResult`]
//! - [`summary`]: the structured-output call that follows a run

pub mod config;
pub mod events;
mod execution;
pub mod harness;
pub mod summary;

pub use config::HarnessConfig;
pub use events::{
    CompositeEventHandler, EventHandler, EventResponse, FnEventHandler, HarnessEvent,
    HarnessResult, LoggingHandler, NoopHandler, Termination,
};
pub use harness::{DEFAULT_CONTEXT_TEMPLATE, Harness, ReasoningContext};
pub use summary::{Summary, summarize};
