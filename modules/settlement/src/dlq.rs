//! Dead letter handling
//!
//! Records events the consumer gave up on so operators can inspect and
//! replay them. This is a last-resort path: every failure to record is
//! loudly logged, and nothing here ever panics the consumer loop.

use std::sync::Arc;

use event_bus::BusMessage;
use uuid::Uuid;

use crate::models::DeadLetter;
use crate::store::LedgerStore;

/// Record a failed event as a dead letter
///
/// The payload is kept verbatim (as parsed JSON when possible, as a raw
/// string otherwise) so a replay tool can reconstruct the original event.
pub async fn record_failure(
    store: &Arc<dyn LedgerStore>,
    msg: &BusMessage,
    error: &str,
    retry_count: i32,
) {
    let payload = match serde_json::from_slice::<serde_json::Value>(&msg.payload) {
        Ok(value) => value,
        Err(_) => serde_json::Value::String(String::from_utf8_lossy(&msg.payload).into_owned()),
    };

    let event_id = payload
        .get("event_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());

    let letter = DeadLetter {
        event_id,
        subject: msg.subject.clone(),
        payload,
        error: error.to_string(),
        retry_count,
    };

    let event_label = event_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match store.record_dead_letter(letter).await {
        Ok(()) => {
            tracing::error!(
                subject = %msg.subject,
                event_id = %event_label,
                retry_count = retry_count,
                error = %error,
                "Event moved to dead letters"
            );
        }
        Err(store_err) => {
            tracing::error!(
                subject = %msg.subject,
                retry_count = retry_count,
                error = %error,
                store_error = %store_err,
                "Failed to record dead letter - event may be lost!"
            );
        }
    }
}
