//! Cluster error taxonomy
//!
//! Errors raised by resource handles and the cluster API they drive.

use thiserror::Error;

use super::document::ResourceKey;

/// Errors surfaced by resource handles
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("{0} not found")]
    NotFound(ResourceKey),

    #[error("Cluster rejected {key}: {message}")]
    Submission { key: ResourceKey, message: String },

    #[error("Conflicting update of {0}")]
    Conflict(ResourceKey),

    #[error("{key} was modified concurrently, gave up after {attempts} attempts")]
    ConcurrentModification { key: ResourceKey, attempts: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{key} didn't reach required state, instead it was: {state}")]
    NotReady { key: ResourceKey, state: String },

    #[error("TLS secret {secret} for hostname {hostname} was not created")]
    CertificateNotReady { hostname: String, secret: String },

    #[error("Failed to convert {kind} document: {source}")]
    Serialization {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

impl ClusterError {
    /// Whether the error means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// Whether the error is a resourceVersion conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }

    /// Map a kube error for `key` onto the taxonomy
    pub(crate) fn from_kube(key: ResourceKey, err: kube::Error, on_write: bool) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => ClusterError::NotFound(key),
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "Conflict" && on_write => {
                ClusterError::Conflict(key)
            }
            kube::Error::Api(resp) if (400..500).contains(&resp.code) => ClusterError::Submission {
                key,
                message: resp.message,
            },
            other => ClusterError::Api(other),
        }
    }
}

/// Result alias for cluster operations
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
