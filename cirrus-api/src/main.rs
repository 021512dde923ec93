use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cirrus_api::config::Config;
use cirrus_api::registry::catalog::{self, CloudCatalog};
use cirrus_api::resource;
use cirrus_api::rest::create_router;
use cirrus_api::AppState;
use cirrus_kv::KvStore;

#[derive(Parser)]
#[command(name = "cirrus-api")]
#[command(about = "cirrus control plane - uniform API over multi-cloud infrastructure")]
struct Args {
    /// Listen address for the REST API
    #[arg(short, long, default_value = "[::]:1323")]
    listen: String,

    /// Data directory (overrides TB_ROOT_PATH)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Cloud catalog file (defaults to the embedded catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("cirrus_api=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // A missing required variable is a startup misconfiguration: exit
    // non-zero before binding anything.
    let config = Config::from_env()?;

    let data_dir = args
        .data_dir
        .unwrap_or_else(|| PathBuf::from(&config.root_path));
    tokio::fs::create_dir_all(&data_dir).await?;

    let store = KvStore::open(&data_dir).await?;

    let cloud_catalog = match &args.catalog {
        Some(path) => CloudCatalog::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => CloudCatalog::load_default()?,
    };

    let state = AppState::build(config, store, cloud_catalog).await?;

    // Push drivers and regions to the broker. An unreachable broker is not
    // fatal; registration retries implicitly on the next credential call.
    if let Err(e) = catalog::bootstrap(&state.catalog, &state.broker).await {
        warn!("catalog bootstrap skipped: {}", e);
    }

    // Make sure the conventional namespace exists.
    match resource::create_ns(
        &state,
        resource::CreateNsRequest {
            name: "default".to_string(),
            description: "default namespace".to_string(),
        },
    )
    .await
    {
        Ok(_) => info!("created namespace 'default'"),
        Err(cirrus_api::CoreError::Conflict(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let router = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    state.system_ready.store(true, Ordering::SeqCst);
    info!(
        "cirrus-api listening on {} (self endpoint: {}, broker: {})",
        args.listen,
        state.config.self_endpoint,
        state.broker.base_url()
    );

    let shutdown = async {
        let ctrl_c = signal::ctrl_c();
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("shutdown complete");
    Ok(())
}
