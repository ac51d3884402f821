mod config;
mod logging;

use std::sync::Arc;

use clap::Parser as _;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crucible_engine::orchestrator::Orchestrator;
use crucible_engine::rate_limiter::{RateLimiter, RateSpec};
use crucible_engine::sandbox::{ContainerRunner, SandboxRunner};
use crucible_engine::stream_hub::StreamHub;
use crucible_http::http::{AppState, router};
use crucible_storage::artifact_store::ArtifactStore;
use crucible_storage::run_store::RunStore;
use crucible_storage::signed_url::UrlSigner;

use crate::config::Cli;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let Cli {
        logging: logging_args,
        server,
    } = Cli::parse();

    let _logging_guard = logging::init(&logging_args)?;

    let config = Arc::new(server.into_config()?);
    tokio::fs::create_dir_all(&config.work_root).await?;

    let signer = UrlSigner::new(config.signing_key.clone(), config.public_base_url.clone());
    let store = Arc::new(ArtifactStore::open(
        &config.storage_root,
        signer,
        config.signed_url_ttl_seconds,
    )?);
    let runs = Arc::new(RunStore::new());
    let hub = Arc::new(StreamHub::new());
    let limiter = Arc::new(RateLimiter::new(RateSpec {
        rps: config.default_rps,
        burst: config.default_burst,
    }));

    let shutdown = CancellationToken::new();
    let runner = Arc::new(SandboxRunner::Container(ContainerRunner::new(
        config.sandbox.clone(),
        shutdown.clone(),
    )));
    let orchestrator = Arc::new(Orchestrator::new(
        &config.work_root,
        config.limits,
        store.clone(),
        runs.clone(),
        runner,
        hub.clone(),
    ));

    let app = router(AppState {
        config: config.clone(),
        orchestrator,
        store,
        runs,
        limiter,
        hub,
    });

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;

    info!(
        bind = %addr,
        work_root = %config.work_root.display(),
        storage_root = %config.storage_root.display(),
        languages = config.sandbox.images.len(),
        sandbox_security_disabled = config.sandbox.disable_security,
        "crucible started"
    );

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
