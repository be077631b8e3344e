//! Configuration for blockpulse
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::time::Duration;

/// blockpulse - real-time sync client for facility-hygiene dashboards
#[derive(Parser, Debug, Clone)]
#[command(name = "blockpulse")]
#[command(about = "Headless dashboard client for facility-hygiene monitoring")]
pub struct Args {
    /// REST API origin
    #[arg(long, env = "API_URL", default_value = "http://localhost:4000")]
    pub api_url: String,

    /// Event-stream origin (WebSocket)
    #[arg(long, env = "SOCKET_URL", default_value = "ws://localhost:4000/ws")]
    pub socket_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// REST request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Base reconnect delay in milliseconds (actual delay = base * attempt)
    #[arg(long, env = "RECONNECT_BASE_DELAY_MS", default_value = "5000")]
    pub reconnect_base_delay_ms: u64,

    /// Maximum automatic reconnect attempts before staying offline
    #[arg(long, env = "MAX_RECONNECT_ATTEMPTS", default_value = "5")]
    pub max_reconnect_attempts: u32,

    /// Path for the persisted auth token (session restore across runs)
    #[arg(long, env = "TOKEN_FILE")]
    pub token_file: Option<std::path::PathBuf>,

    /// Email used by the binary for the initial login
    #[arg(long, env = "LOGIN_EMAIL")]
    pub login_email: Option<String>,

    /// Password used by the binary for the initial login
    #[arg(long, env = "LOGIN_PASSWORD")]
    pub login_password: Option<String>,

    /// Drive a simulated telemetry feed through the local stores (demo mode,
    /// for running without a live sensor backend)
    #[arg(long, env = "SIMULATE", default_value = "false")]
    pub simulate: bool,

    /// Block id used by the simulated telemetry feed
    #[arg(long, env = "SIMULATE_BLOCK", default_value = "block-1")]
    pub simulate_block: String,
}

/// The subset of configuration the sync layer itself needs
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_url: String,
    pub socket_url: String,
    pub request_timeout: Duration,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:4000".to_string(),
            socket_url: "ws://localhost:4000/ws".to_string(),
            request_timeout: Duration::from_millis(10_000),
            reconnect_base_delay: Duration::from_millis(5_000),
            max_reconnect_attempts: 5,
        }
    }
}

impl Args {
    /// Build the sync-layer configuration from the parsed arguments
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            api_url: self.api_url.trim_end_matches('/').to_string(),
            socket_url: self.socket_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            reconnect_base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(format!("API_URL must be http(s), got '{}'", self.api_url));
        }

        if !self.socket_url.starts_with("ws://") && !self.socket_url.starts_with("wss://") {
            return Err(format!("SOCKET_URL must be ws(s), got '{}'", self.socket_url));
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.reconnect_base_delay_ms == 0 {
            return Err("RECONNECT_BASE_DELAY_MS must be greater than zero".to_string());
        }

        if self.login_email.is_some() != self.login_password.is_some() {
            return Err("LOGIN_EMAIL and LOGIN_PASSWORD must be set together".to_string());
        }

        Ok(())
    }
}
