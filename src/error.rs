//! Error types for the certificate shim

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a reconciliation pass or by process bootstrap
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("connected to the Kubernetes API, but the {api_version} {kind} CRD does not appear to be installed")]
    CrdNotInstalled { api_version: String, kind: String },

    #[error("leadership lost")]
    LeadershipLost,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether the dispatch layer should retry soon rather than back off
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => {
                resp.code >= 500 || resp.code == 429 || resp.code == 409
            }
            Error::KubeError(_) => true,
            Error::Timeout { .. } | Error::Cancelled { .. } => true,
            _ => false,
        }
    }

    /// Short label used for error metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled { .. } => "cancelled",
            Error::MissingObjectKey(_) => "invalid_object",
            Error::Bind { .. } | Error::Server(_) => "server",
            Error::CrdNotInstalled { .. } => "config",
            Error::LeadershipLost => "leadership",
        }
    }
}
