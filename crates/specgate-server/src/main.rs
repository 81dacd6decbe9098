//! SpecGate Server - API registry and dynamic dispatch gateway
//!
//! Loads `gateway.toml` from the config directory, bootstraps the spec cache
//! from the conf directory and serves the registry and call endpoints.

use clap::Parser;
use std::sync::Arc;
use std::thread;
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use specgate_server::{GatewayServer, api, config, router};

/// SpecGate Server CLI arguments
#[derive(Parser, Debug)]
#[command(name = "specgate-server")]
#[command(about = "API specification registry and dispatch gateway", long_about = None)]
struct Args {
    /// Enable verbose logging (prints debug information to stdout/stderr)
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Directory holding gateway.toml
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Directory holding the registry documents; overrides the config file
    #[arg(long)]
    conf_dir: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // CPU count * 2 worker threads, clamped to [4, 16]
    let worker_threads = (thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        * 2)
    .clamp(4, 16);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .thread_name("specgate-worker")
        .enable_all()
        .build()?;

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "specgate_server=debug,specgate_core=debug,tower_http=debug".into()
        })
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "specgate_server=info,specgate_core=info,tower_http=warn".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.verbose {
        info!("Configured Tokio runtime: {} worker threads", worker_threads);
    }

    rt.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let mut config = config::Config::from_env(&args.config_dir)?;
    if let Some(conf_dir) = args.conf_dir {
        config = config.with_conf_dir(conf_dir);
    }

    api::health::init();

    let server = GatewayServer::build(config.conf_dir(), &config.gateway)
        .map_err(|e| anyhow::anyhow!("Failed to build gateway: {}", e))?;
    info!("Using registry directory: {}", config.conf_dir());

    server.registry.bootstrap().await;
    let stats = server.registry.stats();
    if stats.initialized {
        info!(
            "Registry ready: {} frameworks, {} services, {} operations",
            stats.frameworks, stats.services, stats.operations
        );
    } else {
        warn!("Spec cache not initialized; serving in degraded mode");
    }

    let app = router(Arc::new(server))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.addr()).await?;
    info!("SpecGate Server listening on {}", config.addr());

    axum::serve(listener, app).await?;

    Ok(())
}
