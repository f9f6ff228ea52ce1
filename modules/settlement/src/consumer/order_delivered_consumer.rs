//! Order-delivered consumer
//!
//! Subscribes to `orders.events.delivered` and drives the settlement
//! engine. Duplicate deliveries are expected (the trigger is at-least-once)
//! and absorbed by the engine's idempotency gate; transient failures are
//! retried with backoff; everything else is dead-lettered.

use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{validate_envelope_fields, BusMessage, EventBus, EventEnvelope};
use futures::StreamExt;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::models::OrderSnapshot;
use crate::services::settlement_service::{SettlementEngine, SettlementOutcome};
use crate::store::LedgerStore;

/// Subject carrying delivered-order events
pub const ORDER_DELIVERED_SUBJECT: &str = "orders.events.delivered";

/// Start the order-delivered consumer task
///
/// Spawns a background task that:
/// 1. Subscribes to `orders.events.delivered`
/// 2. Settles each order through the engine (idempotent)
/// 3. Retries transient failures with exponential backoff
/// 4. Dead-letters poisoned events and exhausted retries
pub async fn start_order_delivered_consumer(
    bus: Arc<dyn EventBus>,
    store: Arc<dyn LedgerStore>,
    engine: Arc<SettlementEngine>,
) {
    tokio::spawn(async move {
        tracing::info!("Starting order-delivered consumer");

        let mut stream = match bus.subscribe(ORDER_DELIVERED_SUBJECT).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(
                    "Failed to subscribe to {}: {}",
                    ORDER_DELIVERED_SUBJECT,
                    e
                );
                return;
            }
        };

        tracing::info!("Subscribed to {}", ORDER_DELIVERED_SUBJECT);

        let retry_config = RetryConfig::default();

        while let Some(msg) = stream.next().await {
            let (event_id, correlation_id, source_module) = match extract_correlation_fields(&msg) {
                Ok(fields) => fields,
                Err(e) => {
                    let reason = format!("Failed to extract correlation fields: {}", e);
                    tracing::error!(
                        subject = %msg.subject,
                        error = %reason,
                        "Unparseable event envelope"
                    );
                    crate::dlq::record_failure(&store, &msg, &reason, 0).await;
                    continue;
                }
            };

            let span = tracing::info_span!(
                "process_order_delivered",
                event_id = %event_id,
                subject = %msg.subject,
                correlation_id = %correlation_id.as_deref().unwrap_or("none"),
                source_module = %source_module.as_deref().unwrap_or("unknown")
            );

            async {
                match process_order_delivered(&engine, &msg).await {
                    Ok(()) => {}
                    Err(ProcessingError::Poisoned(reason)) => {
                        // Permanently bad event; retrying cannot help
                        tracing::error!(
                            error = %reason,
                            "Event cannot be processed, sending to dead letters"
                        );
                        crate::dlq::record_failure(&store, &msg, &reason, 0).await;
                    }
                    Err(ProcessingError::Retriable(first_error)) => {
                        tracing::warn!(
                            error = %first_error,
                            "Transient failure, retrying with backoff"
                        );

                        let engine_clone = engine.clone();
                        let msg_clone = msg.clone();
                        let result = retry_with_backoff(
                            || {
                                let engine = engine_clone.clone();
                                let msg = msg_clone.clone();
                                async move {
                                    process_order_delivered(&engine, &msg)
                                        .await
                                        .map_err(|e| e.to_string())
                                }
                            },
                            &retry_config,
                            "order_delivered_consumer",
                        )
                        .await;

                        if let Err(error_msg) = result {
                            tracing::error!(
                                error = %error_msg,
                                retry_count = retry_config.max_attempts,
                                "Event processing failed after retries, sending to dead letters"
                            );
                            crate::dlq::record_failure(
                                &store,
                                &msg,
                                &error_msg,
                                retry_config.max_attempts as i32,
                            )
                            .await;
                        }
                    }
                }
            }
            .instrument(span)
            .await;
        }

        tracing::warn!("Order-delivered consumer stopped");
    });
}

/// Process one delivered-order message
async fn process_order_delivered(
    engine: &SettlementEngine,
    msg: &BusMessage,
) -> Result<(), ProcessingError> {
    let raw: serde_json::Value = serde_json::from_slice(&msg.payload)
        .map_err(|e| ProcessingError::Poisoned(format!("Failed to parse envelope: {}", e)))?;
    validate_envelope_fields(&raw)
        .map_err(|e| ProcessingError::Poisoned(format!("Envelope validation failed: {}", e)))?;

    let envelope: EventEnvelope<OrderSnapshot> = serde_json::from_value(raw)
        .map_err(|e| ProcessingError::Poisoned(format!("Failed to parse envelope: {}", e)))?;

    tracing::info!(
        event_id = %envelope.event_id,
        order_id = %envelope.payload.order_id,
        "Processing delivered order"
    );

    match engine.settle_order(&envelope.payload).await {
        Ok(SettlementOutcome::Settled { transaction_ids }) => {
            tracing::info!(
                event_id = %envelope.event_id,
                order_id = %envelope.payload.order_id,
                transactions = transaction_ids.len(),
                "Order settled from delivered event"
            );
            Ok(())
        }
        Ok(SettlementOutcome::AlreadySettled) => {
            // Duplicate delivery; expected under at-least-once triggers
            tracing::info!(
                event_id = %envelope.event_id,
                order_id = %envelope.payload.order_id,
                "Duplicate delivered event ignored (already settled)"
            );
            Ok(())
        }
        Err(e) if e.is_retriable() => Err(ProcessingError::Retriable(e.to_string())),
        Err(e) => Err(ProcessingError::Poisoned(e.to_string())),
    }
}

/// Extract correlation fields from the raw envelope for observability
///
/// Returns: (event_id, correlation_id, source_module)
fn extract_correlation_fields(
    msg: &BusMessage,
) -> Result<(Uuid, Option<String>, Option<String>), Box<dyn std::error::Error + Send + Sync>> {
    let envelope: serde_json::Value = serde_json::from_slice(&msg.payload)?;

    let event_id_str = envelope
        .get("event_id")
        .and_then(|v| v.as_str())
        .ok_or("Missing event_id")?;
    let event_id = Uuid::parse_str(event_id_str)?;

    let correlation_id = envelope
        .get("correlation_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let source_module = envelope
        .get("source_module")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Ok((event_id, correlation_id, source_module))
}

/// Classification of processing failures
#[derive(Debug)]
enum ProcessingError {
    /// Permanently bad input; goes straight to dead letters
    Poisoned(String),
    /// Transient failure (store error, in-flight settlement conflict);
    /// worth retrying with backoff
    Retriable(String),
}

impl std::fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingError::Poisoned(msg) => write!(f, "Poisoned event: {}", msg),
            ProcessingError::Retriable(msg) => write!(f, "Retriable error: {}", msg),
        }
    }
}
