//! Command-line and environment configuration
//!
//! Everything here is read once at startup and immutable afterwards.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::controller::IssuerDefaults;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Name of the default cert issuer to use
    #[arg(long, env = "DEFAULT_ISSUER_NAME", default_value = "")]
    pub default_issuer_name: String,

    /// Default cert issuer kind to use
    #[arg(long, env = "DEFAULT_ISSUER_KIND", default_value = "Issuer")]
    pub default_issuer_kind: String,

    /// Default cert issuer group to use
    #[arg(long, env = "DEFAULT_ISSUER_GROUP", default_value = "cert-manager.io")]
    pub default_issuer_group: String,

    /// Log filter directive, e.g. "info" or "contour_cert_shim=debug"
    #[arg(long, short = 'v', env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Port to expose the readiness probe
    #[arg(long, env = "READINESS_PROBE_PORT", default_value_t = 6060)]
    pub readiness_probe_port: u16,

    /// HTTP path to expose the readiness probe
    #[arg(long, env = "READINESS_PROBE_PATH", default_value = "/readyz")]
    pub readiness_probe_path: String,

    /// Port to expose Prometheus metrics on 0.0.0.0 on path '/metrics'
    #[arg(long, env = "METRICS_PORT", default_value_t = 9402)]
    pub metrics_port: u16,

    /// Enable leader election on the controller
    #[arg(
        long,
        env = "ENABLE_LEADER_ELECTION",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_leader_election: bool,

    /// Namespace to create leader election resources in
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE", default_value = "cert-manager")]
    pub leader_election_namespace: String,

    /// Only watch HTTPProxies in this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Timeout in seconds for each call to the Kubernetes API during a reconcile
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 30)]
    pub api_timeout_secs: u64,

    /// Maximum number of concurrent reconciles (0 for unlimited)
    #[arg(long, env = "CONCURRENCY", default_value_t = 0)]
    pub concurrency: u16,

    /// Send every apply as a server-side dry run
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,
}

/// Settings for the kube-rs controller runtime
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControllerSettings {
    pub namespace: Option<String>,
    pub concurrency: u16,
}

impl RunArgs {
    pub fn issuer_defaults(&self) -> IssuerDefaults {
        IssuerDefaults {
            name: self.default_issuer_name.clone(),
            kind: self.default_issuer_kind.clone(),
            group: self.default_issuer_group.clone(),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            namespace: self.namespace.clone().filter(|ns| !ns.is_empty()),
            concurrency: self.concurrency,
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Readiness path, always rooted
    pub fn readiness_path(&self) -> String {
        if self.readiness_probe_path.starts_with('/') {
            self.readiness_probe_path.clone()
        } else {
            format!("/{}", self.readiness_probe_path)
        }
    }
}
