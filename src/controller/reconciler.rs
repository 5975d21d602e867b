//! Main reconciler for HTTPProxy resources
//!
//! Implements the controller pattern using kube-rs runtime. Every pass
//! re-derives the desired Certificate from the proxy's current state, so
//! replaying a trigger is always safe.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Config as ControllerConfig, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::certificate::build_certificate;
use super::issuer::{resolve_issuer, IssuerDefaults};
use super::store::{ObjectKey, ObjectStore, ProxyEvent};
use crate::config::ControllerSettings;
use crate::crd::{Certificate, HttpProxy};
use crate::error::{Error, Result};

/// Why a pass left the Certificate alone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Deleting,
    NoVirtualHost,
    EmptyFqdn,
    NoTls,
    EmptySecretName,
    NoIssuer,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotFound => "not_found",
            SkipReason::Deleting => "deleting",
            SkipReason::NoVirtualHost => "no_virtualhost",
            SkipReason::EmptyFqdn => "empty_fqdn",
            SkipReason::NoTls => "no_tls",
            SkipReason::EmptySecretName => "empty_secret_name",
            SkipReason::NoIssuer => "no_issuer",
        }
    }
}

/// Result of a successful reconciliation pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Skipped(reason) => reason.as_str(),
        }
    }
}

/// Shared, immutable state handed to every reconciliation pass
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub issuer_defaults: IssuerDefaults,
    /// Upper bound for each call to the store
    pub api_timeout: Duration,
    /// Cancelled when the process is shutting down or lost leadership
    pub shutdown: CancellationToken,
}

/// Main entry point to start the controller
pub async fn run_controller(
    client: Client,
    ctx: Arc<Context>,
    settings: &ControllerSettings,
) -> Result<()> {
    let (proxies, certificates): (Api<HttpProxy>, Api<Certificate>) = match &settings.namespace {
        Some(namespace) => (
            Api::namespaced(client.clone(), namespace),
            Api::namespaced(client.clone(), namespace),
        ),
        None => (Api::all(client.clone()), Api::all(client)),
    };

    info!(
        namespace = settings.namespace.as_deref().unwrap_or("*"),
        concurrency = settings.concurrency,
        "Starting HTTPProxy controller"
    );

    let shutdown = ctx.shutdown.clone();
    let controller = Controller::new(proxies, Config::default())
        // Certificate events are mapped back to the owning proxy
        .owns(certificates, Config::default())
        .with_config(ControllerConfig::default().concurrency(settings.concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled: {}", obj),
                Err(e) => warn!("Reconcile error: {:?}", e),
            }
        });

    tokio::select! {
        _ = controller => info!("HTTPProxy controller stopped"),
        _ = shutdown.cancelled() => info!("HTTPProxy controller cancelled"),
    }

    Ok(())
}

/// Reconcile entry point for the kube-rs runtime
///
/// Called whenever an HTTPProxy changes or a Certificate it owns changes.
#[instrument(skip(proxy, ctx), fields(name = %proxy.name_any(), namespace = proxy.namespace()))]
pub(crate) async fn reconcile(proxy: Arc<HttpProxy>, ctx: Arc<Context>) -> Result<Action> {
    let started = Instant::now();
    let key = ObjectKey::from_resource(proxy.as_ref())?;

    let result = reconcile_key(&ctx, &key).await;

    #[cfg(feature = "metrics")]
    {
        super::metrics::observe_reconcile_duration_seconds(started.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => super::metrics::inc_reconcile_outcome(outcome.as_str()),
            Err(e) => super::metrics::inc_reconcile_error(e.metric_label()),
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = started;

    result.map(|outcome| {
        debug!(outcome = outcome.as_str(), "Reconcile pass finished");
        Action::await_change()
    })
}

/// One level-triggered reconciliation pass for the proxy at `key`
pub async fn reconcile_key(ctx: &Context, key: &ObjectKey) -> Result<Outcome> {
    let proxy = match bounded(ctx, "get HTTPProxy", ctx.store.get_proxy(key)).await {
        Ok(Some(proxy)) => proxy,
        Ok(None) => {
            debug!("HTTPProxy {} not found, nothing to reconcile", key);
            return Ok(Outcome::Skipped(SkipReason::NotFound));
        }
        Err(e) => {
            error!("unable to get HTTPProxy {}: {}", key, e);
            return Err(e);
        }
    };

    // Cleanup is left to owner-reference garbage collection
    if proxy.meta().deletion_timestamp.is_some() {
        debug!("HTTPProxy {} is being deleted, skipping", key);
        return Ok(Outcome::Skipped(SkipReason::Deleting));
    }

    let tls = match proxy.spec.tls_intent() {
        Ok(tls) => tls,
        Err(reason) => {
            debug!("HTTPProxy {} has not opted into TLS ({})", key, reason.as_str());
            return Ok(Outcome::Skipped(reason));
        }
    };

    let issuer = resolve_issuer(proxy.annotations(), &ctx.issuer_defaults);
    if issuer.name.is_empty() {
        info!("no issuer found for HTTPProxy {}, skipping", key);
        return Ok(Outcome::Skipped(SkipReason::NoIssuer));
    }

    let certificate = build_certificate(&proxy, &tls, issuer)?;

    if let Err(e) = bounded(
        ctx,
        "apply Certificate",
        ctx.store.apply_certificate(&certificate),
    )
    .await
    {
        error!("unable to reconcile Certificate {}: {}", key, e);
        record_apply_failure(ctx, &proxy, &e).await;
        return Err(e);
    }

    info!("Certificate {} successfully reconciled", key);
    Ok(Outcome::Applied)
}

/// Run a store call bounded by the API timeout and the shutdown token
async fn bounded<T, F>(ctx: &Context, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = ctx.shutdown.cancelled() => Err(Error::Cancelled { operation }),
        res = tokio::time::timeout(ctx.api_timeout, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(Error::Timeout {
                operation,
                timeout: ctx.api_timeout,
            }),
        },
    }
}

/// Best-effort Warning event on the proxy after a failed apply
async fn record_apply_failure(ctx: &Context, proxy: &HttpProxy, err: &Error) {
    if matches!(err, Error::Cancelled { .. }) {
        return;
    }
    let event = ProxyEvent::warning(
        "CertificateApplyFailed",
        format!("unable to apply Certificate: {}", err),
    );
    if let Err(e) = bounded(ctx, "record Event", ctx.store.record_event(proxy, &event)).await {
        warn!("Failed to record event for {}: {}", proxy.name_any(), e);
    }
}

/// Error policy determines how to handle reconciliation errors
pub(crate) fn error_policy(proxy: Arc<HttpProxy>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!("Reconciliation error for {}: {:?}", proxy.name_any(), error);

    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
