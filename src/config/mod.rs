//! Operator settings and the rendered workload configuration

pub mod renderer;
pub mod settings;

pub use renderer::{config_hash, render, RenderedConfig};
pub use settings::{LogOptions, ProbeSettings, Settings, TlsPaths};
