//! relay-gateway: SMS/CRM relay main binary
//!
//! Usage:
//!   relay-gateway                     - Start the HTTP server
//!   relay-gateway --register-webhook  - Register the provider webhook and exit
//!   relay-gateway --help              - Show help

use std::sync::Arc;

use relay_api::AppState;
use relay_core::{Config, mask_secret};
use relay_ghl::GhlClient;
use relay_sync::SyncEngine;
use relay_tallbob::TallBobClient;
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    /// HTTP server
    Server,
    /// Register the provider webhook, then exit
    RegisterWebhook,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args();

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("relay-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting relay-gateway...");
    tracing::info!(
        "Tall Bob: {} (user: {}, key: {})",
        config.tallbob.base_url,
        config.tallbob.api_username,
        mask_secret(&config.tallbob.api_key)
    );
    tracing::info!(
        "HighLevel: {} (token: {})",
        config.ghl.base_url,
        mask_secret(&config.ghl.token)
    );

    let provider = TallBobClient::new(&config.tallbob)
        .map_err(|e| anyhow::anyhow!("Failed to create Tall Bob client: {}", e))?;
    let crm = GhlClient::new(&config.ghl)
        .map_err(|e| anyhow::anyhow!("Failed to create HighLevel client: {}", e))?;

    let engine = SyncEngine::new(
        Arc::new(provider),
        Arc::new(crm),
        config.normalizer(),
        config.ghl.location_ids.clone(),
    );

    match mode {
        RunMode::RegisterWebhook => register_webhook(&config, &engine).await,
        RunMode::Server => run_server(config, engine).await,
        _ => Ok(()),
    }
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    let args: Vec<String> = std::env::args().collect();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--register-webhook" => return RunMode::RegisterWebhook,
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("relay-gateway - Tall Bob / HighLevel message relay");
    println!();
    println!("Usage:");
    println!("  relay-gateway                    Start the HTTP server");
    println!("  relay-gateway --register-webhook Register the Tall Bob webhook and exit");
    println!("  relay-gateway --help             Show this help message");
    println!("  relay-gateway --version          Show version");
    println!();
    println!("Environment Variables:");
    println!("  TALLBOB_API_URL                 Tall Bob API base URL (required)");
    println!("  TALLBOB_API_USERNAME            Tall Bob API username");
    println!("  TALLBOB_API_KEY                 Tall Bob API key (required)");
    println!("  GHL_PRIVATE_INTEGRATION_TOKEN   HighLevel token (required)");
    println!("  GHL_LOCATION_IDS                Preferred locations, comma separated");
    println!("  DEFAULT_COUNTRY_CODE            Country code for local numbers (default: 61)");
    println!("  PORT                            HTTP port (default: 3000)");
    println!("  API_KEY                         Bearer key for send/status endpoints");
    println!("  WEBHOOK_CALLBACK_URL            Public webhook URL to register");
}

/// Register the provider webhook from configuration
async fn register_webhook(config: &Config, engine: &SyncEngine) -> anyhow::Result<()> {
    let Some(callback_url) = config.webhook.callback_url.as_deref() else {
        anyhow::bail!("WEBHOOK_CALLBACK_URL is not set");
    };

    engine
        .register_webhook(callback_url, &config.webhook.event_types)
        .await
        .map_err(|e| anyhow::anyhow!("Webhook registration failed: {}", e))
}

/// Run the HTTP server until Ctrl+C
async fn run_server(config: Config, engine: SyncEngine) -> anyhow::Result<()> {
    if config.webhook.callback_url.is_some() {
        if let Err(e) = register_webhook(&config, &engine).await {
            tracing::warn!("{}", e);
        }
    } else {
        tracing::info!("Webhook registration skipped (no callback URL configured)");
    }

    if config.api.key.is_none() {
        tracing::warn!("API_KEY not set, send and status endpoints are open");
    }

    let state = AppState::new(engine, config.api.key.clone());

    tracing::info!("relay-gateway initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    relay_api::start_server(&config.api, state).await?;

    tracing::info!("Shutting down...");
    Ok(())
}
