//! Linkwatch - backlink monitoring.
//!
//! Tracks third-party pages that should link to a monitored site, re-fetches
//! them safely, and drives each backlink through `active`, `changed` and
//! `lost` states, raising alerts on transitions.

#![allow(clippy::should_implement_trait)]

pub mod checker;
pub mod cli;
pub mod config;
pub mod http_client;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod schema;
pub mod services;
