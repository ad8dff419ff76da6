//! Service layer for Linkwatch business logic.
//!
//! This module contains domain logic separated from UI concerns.
//! Services can be used by the CLI or embedded in other interfaces.

pub mod alerts;
pub mod monitor;
pub mod runner;
pub mod transition;

pub use alerts::{AlertDispatcher, DispatchReport};
pub use monitor::{BacklinkMonitor, MonitorError, MonitorOutcome};
pub use runner::{CheckEvent, CheckRunner, RunSummary};
pub use transition::{AttributeDiff, FieldChange, Transition};
