//! The lead-qualification funnel that consumes the progress store.
//!
//! [`steps`] describes the pages and what each reads and records,
//! [`backend`] abstracts the hosted persistence service, and [`flow`]
//! wires both to a [`crate::FunnelStore`].

pub mod backend;
pub mod flow;
pub mod steps;

pub use backend::{BackendError, FunnelBackend};
pub use flow::{FunnelFlow, StepOutcome};
pub use steps::{FunnelStep, QuestionKey};
