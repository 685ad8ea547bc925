use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use payment_orchestrator::circuit::registry::{BreakerSettings, HealthRegistry};
use payment_orchestrator::config::AppConfig;
use payment_orchestrator::crypto::tracker::ConfirmationTracker;
use payment_orchestrator::domain::crypto::CryptoAsset;
use payment_orchestrator::fallback::coordinator::FallbackCoordinator;
use payment_orchestrator::fallback::retry::RetryPolicy;
use payment_orchestrator::http::handlers::{checkout, crypto_status, ops, webhooks};
use payment_orchestrator::ledger::pg::PgLedger;
use payment_orchestrator::ledger::PaymentLedger;
use payment_orchestrator::notify::http::{HttpAlerts, HttpFulfillment};
use payment_orchestrator::providers::card::CardGateway;
use payment_orchestrator::providers::crypto_ledger::CryptoLedger;
use payment_orchestrator::providers::registry::ProviderRegistry;
use payment_orchestrator::providers::wallet::WalletGateway;
use payment_orchestrator::providers::ProviderAdapter;
use payment_orchestrator::webhook::gateway::WebhookGateway;
use payment_orchestrator::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,payment_orchestrator=debug")),
        )
        .init();

    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.session_timeout_ms))
        .build()?;

    let card = Arc::new(CardGateway {
        base_url: config.card_base_url.clone(),
        api_key: config.card_api_key.clone(),
        webhook_secret: config.card_webhook_secret.clone(),
        timeout_ms: config.session_timeout_ms,
        tolerance_secs: config.webhook_tolerance_secs,
        client: http_client.clone(),
    });
    let wallet = Arc::new(WalletGateway {
        base_url: config.wallet_base_url.clone(),
        client_id: config.wallet_client_id.clone(),
        client_secret: config.wallet_client_secret.clone(),
        webhook_secret: config.wallet_webhook_secret.clone(),
        timeout_ms: config.session_timeout_ms,
        tolerance_secs: config.webhook_tolerance_secs,
        client: http_client.clone(),
    });
    let asset = CryptoAsset::parse(&config.crypto_asset)
        .ok_or_else(|| anyhow::anyhow!("unsupported crypto asset: {}", config.crypto_asset))?;
    let crypto = Arc::new(CryptoLedger::new(
        config.crypto_rate_api_url.clone(),
        config.crypto_explorer_api_url.clone(),
        config.crypto_wallet_seed.clone(),
        config.crypto_webhook_secret.clone(),
        asset,
        config.crypto_expiry_minutes,
        config.ledger_timeout_ms,
        config.webhook_tolerance_secs,
        http_client.clone(),
    ));

    let registry = ProviderRegistry::new(vec![
        card.clone() as Arc<dyn ProviderAdapter>,
        wallet.clone(),
        crypto.clone(),
    ]);

    let ledger: Arc<dyn PaymentLedger> = Arc::new(PgLedger { pool });
    let health = Arc::new(HealthRegistry::new(BreakerSettings {
        failure_threshold: config.circuit_failure_threshold,
        cooldown: chrono::Duration::seconds(config.circuit_cooldown_secs),
    }));
    let fulfillment = Arc::new(HttpFulfillment {
        base_url: config.fulfillment_base_url.clone(),
        client: http_client.clone(),
    });
    let alerts = Arc::new(HttpAlerts {
        alert_url: config.alert_url.clone(),
        client: http_client.clone(),
    });

    let retry = RetryPolicy {
        max_retries: config.max_retries,
        base_delay: Duration::from_millis(config.base_delay_ms),
        max_delay: Duration::from_millis(config.max_delay_ms),
    };

    let coordinator = Arc::new(FallbackCoordinator {
        registry: registry.clone(),
        ledger: ledger.clone(),
        health: health.clone(),
        alerts,
        retry: retry.clone(),
    });
    let webhook_gateway = Arc::new(WebhookGateway {
        registry,
        ledger: ledger.clone(),
        fulfillment: fulfillment.clone(),
        handler_retry: retry,
    });

    let tracker = ConfirmationTracker {
        ledger: ledger.clone(),
        adapter: crypto,
        fulfillment,
        poll_interval: Duration::from_secs(config.crypto_poll_interval_secs),
    };
    tokio::spawn(tracker.run());

    let state = AppState {
        coordinator,
        webhook_gateway,
        ledger,
        health,
    };

    let app = Router::new()
        .route("/health", get(ops::health))
        .route("/providers/health", get(ops::providers_health))
        .route("/checkout", post(checkout::checkout))
        .route("/webhooks/:provider", post(webhooks::ingest))
        .route("/crypto-payments/:payment_id", get(crypto_status::get_status))
        .route("/orders/:order_id/attempts", get(ops::list_attempts))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "payment orchestrator listening");
    axum::serve(listener, app).await?;
    Ok(())
}
