//! karma-operator: reconciliation core for the Karma alert dashboard
//!
//! Collects the Alertmanager endpoints advertised by related applications,
//! renders Karma's configuration from them and keeps the supervised Karma
//! process running that configuration.

pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod relation;
pub mod workload;

pub use crate::error::{Error, Result};
