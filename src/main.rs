use std::sync::Arc;

use clap::{Parser, Subcommand};
use contour_cert_shim::config::{LogFormat, RunArgs};
use contour_cert_shim::controller::{self, Context, KubeStore};
use contour_cert_shim::leader_election::{holder_identity, LeaderElector};
use contour_cert_shim::probes::{self, Readiness};
use contour_cert_shim::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller
    Run(RunArgs),
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("contour-cert-shim v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run(run_args).await,
    }
}

fn init_tracing(args: &RunArgs) {
    // RUST_LOG takes precedence over --log-level
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match args.log_format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
    }
}

async fn run(args: RunArgs) -> Result<(), Error> {
    init_tracing(&args);

    info!("Starting contour-cert-shim v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let shutdown = CancellationToken::new();
    let readiness = Readiness::default();

    let probe_listener = probes::bind(args.readiness_probe_port).await?;
    let probe_router = probes::probe_router(&args.readiness_path(), readiness.clone());
    spawn_server("probe", probe_listener, probe_router, shutdown.clone());

    #[cfg(feature = "metrics")]
    {
        let metrics_listener = probes::bind(args.metrics_port).await?;
        spawn_server(
            "metrics",
            metrics_listener,
            probes::metrics_router(),
            shutdown.clone(),
        );
    }

    // Standby replicas report ready as well
    controller::preflight(&client, &readiness).await?;

    let election = if args.enable_leader_election {
        match wait_for_leadership(&client, &args, &shutdown).await? {
            Some(handle) => Some(handle),
            // Interrupted before becoming leader
            None => return Ok(()),
        }
    } else {
        info!("Leader election disabled");
        None
    };

    let ctx = Arc::new(Context {
        store: Arc::new(KubeStore::new(client.clone(), args.dry_run)),
        issuer_defaults: args.issuer_defaults(),
        api_timeout: args.api_timeout(),
        shutdown: shutdown.clone(),
    });

    if args.dry_run {
        warn!("Dry-run mode: Certificates are applied with dryRun=All");
    }

    let result = controller::run_controller(client, ctx, &args.controller_settings()).await;
    readiness.set_ready(false);
    shutdown.cancel();

    if let Some(handle) = election {
        match handle.await {
            Ok(Err(e)) => return Err(e),
            Ok(Ok(())) => {}
            Err(e) => warn!("Leader election task failed: {}", e),
        }
    }

    info!("Shutdown complete");
    result
}

/// Start the elector and block until this replica leads.
///
/// Returns `None` when interrupted by a signal first.
async fn wait_for_leadership(
    client: &kube::Client,
    args: &RunArgs,
    shutdown: &CancellationToken,
) -> Result<Option<JoinHandle<Result<(), Error>>>, Error> {
    let (leading_tx, mut leading_rx) = watch::channel(false);
    let elector = LeaderElector::new(
        client.clone(),
        &args.leader_election_namespace,
        holder_identity(),
    );
    let handle = tokio::spawn(elector.run(leading_tx, shutdown.clone()));

    info!("Waiting to acquire leadership");
    let acquired = tokio::select! {
        res = leading_rx.wait_for(|leading| *leading) => res.is_ok(),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted while waiting for leadership");
            shutdown.cancel();
            return Ok(None);
        }
    };

    if acquired {
        Ok(Some(handle))
    } else {
        // The elector exited without ever leading
        match handle.await {
            Ok(Err(e)) => Err(e),
            _ => Err(Error::LeadershipLost),
        }
    }
}

fn spawn_server(
    name: &'static str,
    listener: tokio::net::TcpListener,
    router: axum::Router,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        if let Err(e) = probes::serve(listener, router, shutdown).await {
            error!("{} server error: {:?}", name, e);
        }
    });
}
