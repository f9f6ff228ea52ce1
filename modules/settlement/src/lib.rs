pub mod config;
pub mod consumer;
pub mod db;
pub mod dlq;
pub mod events;
pub mod fee_policy;
pub mod models;
pub mod repos;
pub mod services;
pub mod store;
pub mod validation;

pub use consumer::order_delivered_consumer::start_order_delivered_consumer;
pub use events::SettlementNotifier;
pub use fee_policy::{FeePolicy, FeePolicyConfig};
pub use models::OrderSnapshot;
pub use services::settlement_service::{SettlementEngine, SettlementError, SettlementOutcome};
pub use store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};
