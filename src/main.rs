//! blockpulse - headless dashboard client for facility-hygiene monitoring

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blockpulse::{
    config::Args,
    session::{FileTokenStore, MemoryTokenStore, TokenStore},
    telemetry::{SimulatedTelemetry, TelemetryFeed},
    types::LoginCredentials,
    SyncClient, TaskFilter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("blockpulse={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  blockpulse - hygiene dashboard sync");
    info!("======================================");
    info!(
        "Build: {} ({})",
        env!("GIT_COMMIT_SHORT"),
        env!("BUILD_TIMESTAMP")
    );
    info!("API: {}", args.api_url);
    info!("Event stream: {}", args.socket_url);
    info!("Request timeout: {}ms", args.request_timeout_ms);
    info!(
        "Reconnect: base {}ms, max {} attempts",
        args.reconnect_base_delay_ms, args.max_reconnect_attempts
    );
    info!(
        "Mode: {}",
        if args.simulate { "SIMULATED TELEMETRY" } else { "LIVE" }
    );
    info!("======================================");

    let tokens: Arc<dyn TokenStore> = match args.token_file.clone() {
        Some(path) => Arc::new(FileTokenStore::new(path)),
        None => Arc::new(MemoryTokenStore::default()),
    };

    let client = SyncClient::new(&args.sync_config(), tokens)?;

    // Authenticate: restore a persisted session, or log in with configured
    // credentials
    let identity = match client.restore().await {
        Some(identity) => identity,
        None => match (&args.login_email, &args.login_password) {
            (Some(email), Some(password)) => {
                match client
                    .login(LoginCredentials {
                        email: email.clone(),
                        password: password.clone(),
                    })
                    .await
                {
                    Ok(identity) => identity,
                    Err(e) => {
                        error!("Login failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            _ => {
                error!("No persisted session and no LOGIN_EMAIL/LOGIN_PASSWORD configured");
                std::process::exit(1);
            }
        },
    };
    info!(
        user = %identity.user.id,
        role = ?identity.user.role,
        block = ?identity.user.block_id,
        "Authenticated"
    );

    // Start the sync loop
    let sync_handle = tokio::spawn(Arc::clone(&client).run());

    // Initial task load
    match client.fetch_tasks(TaskFilter::Mine).await {
        Ok(tasks) => info!("Loaded {} task(s)", tasks.len()),
        Err(e) => warn!("Initial task fetch failed: {}", e),
    }

    // Demo mode: feed simulated sensor samples through the same ingestion
    // paths real push events use
    let _sim_handle = if args.simulate {
        let client = Arc::clone(&client);
        let block = args.simulate_block.clone();
        Some(tokio::spawn(async move {
            let mut feed = SimulatedTelemetry::new(block.clone());
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                let sample = feed.next_sample();
                info!(block = %sample.block_id, score = sample.score, "Simulated sample");
                client.metrics().ingest(sample);
                if let Some(alert) = feed.maybe_alert() {
                    info!(alert = %alert.id, "Simulated alert");
                    client.alerts().ingest(alert);
                }
            }
        }))
    } else {
        None
    };

    // Periodic connectivity indicator
    let state_handle = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut state_rx = client.transport().state();
            loop {
                if state_rx.changed().await.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                info!(phase = ?state.phase, attempt = state.attempt, "Connection state");
            }
        })
    };

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    client.logout().await;
    sync_handle.abort();
    state_handle.abort();

    Ok(())
}
