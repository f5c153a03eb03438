//! Workflow-level runtime: scheduling many chain runs at once.

mod runner;

pub use runner::{RunHandle, RunScheduler};
