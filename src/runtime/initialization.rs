//! # Initialization
//!
//! Controller startup: rustls setup, tracing, configuration, metrics, probe
//! server, Kubernetes client and reconciler.

use crate::command::CommandRunner;
use crate::config::{self, ServerConfig};
use crate::controller::reconciler::KubeStatusReporter;
use crate::controller::Reconciler;
use crate::crd::KeychainSecret;
use crate::observability;
use crate::runtime::server::{start_server, ServerState};
use crate::store::KubeStore;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
///
/// Configuration is validated before anything connects to the cluster, so a
/// malformed command template stops the process here.
///
/// # Errors
///
/// Returns an error if configuration is invalid, metrics cannot be
/// registered, the server does not come up, or no Kubernetes client can be
/// built.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything touches rustls
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keychain_secret_controller=info".into()),
        )
        .init();

    info!("Starting Keychain Secret Controller v{}", env!("CARGO_PKG_VERSION"));

    let (controller_config, server_config) =
        config::load_config().context("Invalid controller configuration")?;
    info!(
        namespace = %controller_config.controller_namespace,
        command_timeout_secs = controller_config.command_timeout_secs,
        "Configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let port = server_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!("HTTP server error: {:#}", e);
            }
        })
    };
    wait_for_server_ready(&server_config, &server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = Reconciler::new(
        &controller_config,
        Arc::new(KubeStore::<Secret>::new(client.clone())),
        Arc::new(KubeStore::<KeychainSecret>::new(client.clone())),
        CommandRunner::default(),
    )
    .with_status_reporter(Arc::new(KubeStatusReporter::new(client.clone())));

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        reconciler: Arc::new(reconciler),
        server_state,
    })
}

/// Wait for the HTTP server to bind
async fn wait_for_server_ready(
    config: &ServerConfig,
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > config.startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                config.startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}
