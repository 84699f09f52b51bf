//! Error types for the Karma operator

use thiserror::Error;

use crate::endpoint::InvalidEndpoint;

#[derive(Error, Debug)]
pub enum Error {
    /// Relation data failed schema validation
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] InvalidEndpoint),

    /// The container supervisor cannot be reached
    #[error("Cannot connect to workload container: {0}")]
    Connectivity(String),

    /// The supervisor rejected or failed an operation (layer, file, process)
    #[error("Pebble error: {0}")]
    Pebble(String),

    /// The named service is not (yet) part of the container plan
    #[error("Service {0} does not exist in the plan")]
    ServiceMissing(String),

    /// The workload did not pass its health check after a restart
    #[error("Service restarted but did not respond after {attempts} health check(s)")]
    Unhealthy { attempts: u32 },

    /// Health or version endpoint was unreachable or returned something unexpected
    #[error("Bad workload response: {0}")]
    BadWorkloadResponse(String),

    /// Operator state could not be loaded or saved
    #[error("State storage error: {0}")]
    State(String),

    /// Settings are inconsistent
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Whether a later pass can be expected to succeed without operator action
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::Connectivity(_)
                | Error::ServiceMissing(_)
                | Error::Unhealthy { .. }
                | Error::BadWorkloadResponse(_)
                | Error::HttpError(_)
                | Error::KubeError(_)
                | Error::IoError(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(Error::ServiceMissing("karma".to_string()).is_retriable());
        assert!(Error::Unhealthy { attempts: 3 }.is_retriable());
        assert!(!Error::Pebble("layer rejected".to_string()).is_retriable());
        assert!(!Error::ConfigError("bad port".to_string()).is_retriable());
    }

    #[test]
    fn test_unhealthy_message() {
        let err = Error::Unhealthy { attempts: 3 };
        assert_eq!(
            err.to_string(),
            "Service restarted but did not respond after 3 health check(s)"
        );
    }
}
