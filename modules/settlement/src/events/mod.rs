pub mod notifications;

pub use notifications::SettlementNotifier;
