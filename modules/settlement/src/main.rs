use event_bus::{EventBus, InMemoryBus, NatsBus};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use settlement_rs::{
    config::Config,
    db,
    start_order_delivered_consumer,
    store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore},
    FeePolicy, SettlementEngine, SettlementNotifier,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting settlement service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        "Configuration loaded: store_type={}, bus_type={}, platform_fee_rate={}, driver_commission_rate={}",
        config.store_type,
        config.bus_type,
        config.platform_fee_rate,
        config.driver_commission_rate
    );

    // Ledger store
    let store: Arc<dyn LedgerStore> = match config.store_type.to_lowercase().as_str() {
        "postgres" => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set for the postgres store");

            tracing::info!("Connecting to database...");
            let pool = db::init_pool(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running migrations...");
            sqlx::migrate!("./db/migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            Arc::new(PgLedgerStore::new(pool))
        }
        "inmemory" => {
            tracing::info!("Using in-memory ledger store");
            Arc::new(InMemoryLedgerStore::new())
        }
        other => panic!(
            "Invalid STORE_TYPE: {}. Must be 'postgres' or 'inmemory'",
            other
        ),
    };

    // Event bus
    let bus: Arc<dyn EventBus> = match config.bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("Using in-memory event bus");
            Arc::new(InMemoryBus::new())
        }
        "nats" => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            let client = async_nats::connect(&config.nats_url)
                .await
                .expect("Failed to connect to NATS");
            Arc::new(NatsBus::new(client))
        }
        other => panic!("Invalid BUS_TYPE: {}. Must be 'inmemory' or 'nats'", other),
    };

    // Settlement engine
    let policy = FeePolicy::new(config.fee_policy()).expect("Invalid fee policy configuration");
    let notifier = SettlementNotifier::new(bus.clone());
    let engine = Arc::new(SettlementEngine::new(store.clone(), policy, notifier));

    // Start the order-delivered consumer
    start_order_delivered_consumer(bus.clone(), store.clone(), engine.clone()).await;

    tracing::info!("Settlement service running; waiting for delivered orders");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");

    tracing::info!("Shutdown signal received, stopping settlement service");
}
