//! Lease-based leader election
//!
//! Only the replica holding the `coordination.k8s.io/v1` Lease runs the
//! controller. The lease is renewed in the background; once it is lost the
//! shared shutdown token is cancelled so the controller stops before another
//! replica can take over.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Name of the Lease object shared by all replicas
pub const LEASE_NAME: &str = "cert-manager-contour-httpproxy";
pub const LEASE_DURATION_SECS: i32 = 15;
pub const RENEW_INTERVAL: Duration = Duration::from_secs(10);
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// Upper bound for the release call made while shutting down
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity written into the Lease, the pod name when running in-cluster
pub fn holder_identity() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string())
    })
}

/// A lease without a renew time counts as expired
pub fn lease_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    spec.and_then(|s| s.renew_time.as_ref())
        .map(|renew| {
            let duration = spec
                .and_then(|s| s.lease_duration_seconds)
                .unwrap_or(LEASE_DURATION_SECS);
            now > renew.0 + chrono::Duration::seconds(duration as i64)
        })
        .unwrap_or(true)
}

pub struct LeaderElector {
    leases: Api<Lease>,
    namespace: String,
    identity: String,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, identity: impl Into<String>) -> Self {
        Self {
            leases: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            identity: identity.into(),
        }
    }

    /// Keep acquiring or renewing the lease until shutdown.
    ///
    /// `leading` flips to `true` once the lease is held. Losing it afterwards
    /// cancels `shutdown` and returns [`Error::LeadershipLost`]. A held lease
    /// is released on shutdown so a standby replica can take over at once.
    pub async fn run(self, leading: watch::Sender<bool>, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Leader election using lease {}/{} with holder ID: {}",
            self.namespace, LEASE_NAME, self.identity
        );

        let lease_duration = Duration::from_secs(LEASE_DURATION_SECS as u64);
        let mut last_renew: Option<Instant> = None;

        loop {
            let wait = match self.try_acquire_or_renew().await {
                Ok(true) => {
                    if last_renew.is_none() {
                        info!("Acquired leadership for lease {}", LEASE_NAME);
                        let _ = leading.send(true);
                    }
                    last_renew = Some(Instant::now());
                    RENEW_INTERVAL
                }
                Ok(false) => {
                    if last_renew.is_some() {
                        return Err(self.lose(&leading, &shutdown, "lease taken by another holder"));
                    }
                    debug!("Lease {} is held by another replica", LEASE_NAME);
                    RETRY_INTERVAL
                }
                Err(e) => {
                    warn!("Leader election error: {}", e);
                    if let Some(renewed) = last_renew {
                        if renewed.elapsed() >= lease_duration {
                            return Err(self.lose(&leading, &shutdown, "renew deadline exceeded"));
                        }
                    }
                    RETRY_INTERVAL
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if last_renew.is_some() {
            match tokio::time::timeout(RELEASE_TIMEOUT, self.release()).await {
                Ok(Ok(())) => info!("Released lease {}", LEASE_NAME),
                Ok(Err(e)) => warn!("Failed to release lease {}: {}", LEASE_NAME, e),
                Err(_) => warn!("Timed out releasing lease {}", LEASE_NAME),
            }
        }
        Ok(())
    }

    /// Clear the holder and shorten the lease to one second
    pub async fn release(&self) -> Result<()> {
        let patch = serde_json::json!({
            "spec": {
                "holderIdentity": null,
                "renewTime": MicroTime(Utc::now()),
                "leaseDurationSeconds": 1,
            }
        });
        self.leases
            .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    fn lose(&self, leading: &watch::Sender<bool>, shutdown: &CancellationToken, why: &str) -> Error {
        warn!("Lost leadership for lease {}: {}", LEASE_NAME, why);
        let _ = leading.send(false);
        shutdown.cancel();
        Error::LeadershipLost
    }

    /// One election round, `Ok(true)` when this replica holds the lease afterwards
    pub async fn try_acquire_or_renew(&self) -> Result<bool> {
        let now = Utc::now();

        let existing = match self.leases.get_opt(LEASE_NAME).await? {
            Some(existing) => existing,
            None => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(LEASE_NAME.to_string()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(self.identity.clone()),
                        acquire_time: Some(MicroTime(now)),
                        renew_time: Some(MicroTime(now)),
                        lease_duration_seconds: Some(LEASE_DURATION_SECS),
                        ..Default::default()
                    }),
                };
                return match self.leases.create(&PostParams::default(), &lease).await {
                    Ok(_) => {
                        info!("Created lease {} with holder {}", LEASE_NAME, self.identity);
                        Ok(true)
                    }
                    // Another replica created it first
                    Err(kube::Error::Api(err)) if err.code == 409 => Ok(false),
                    Err(e) => Err(Error::KubeError(e)),
                };
            }
        };

        let spec = existing.spec.as_ref();
        let current_holder = spec.and_then(|s| s.holder_identity.as_deref());

        if current_holder == Some(self.identity.as_str()) {
            let patch = serde_json::json!({
                "spec": {
                    "renewTime": MicroTime(now),
                    "leaseDurationSeconds": LEASE_DURATION_SECS,
                }
            });
            self.leases
                .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            return Ok(true);
        }

        let vacant = current_holder.map_or(true, str::is_empty);
        if !vacant && !lease_expired(spec, now) {
            return Ok(false);
        }

        info!("Lease held by {:?} is free, taking over", current_holder);
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": existing.metadata.resource_version,
            },
            "spec": {
                "holderIdentity": self.identity,
                "acquireTime": MicroTime(now),
                "renewTime": MicroTime(now),
                "leaseDurationSeconds": LEASE_DURATION_SECS,
            }
        });
        match self
            .leases
            .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(true),
            // Lost the takeover race
            Err(kube::Error::Api(err)) if err.code == 409 => Ok(false),
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}
