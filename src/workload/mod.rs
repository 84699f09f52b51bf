//! Everything that talks to the dashboard workload

pub mod client;
pub mod container;
pub mod tls;

pub use client::{parse_version_output, HealthProbe, KarmaClient};
pub use container::{
    Container, ExecOutput, Layer, Override, Plan, ServiceInfo, ServiceSpec, ServiceStatus, Startup,
};
pub use tls::{refresh_tls, StaticTls, TlsMaterial, TlsSource};
