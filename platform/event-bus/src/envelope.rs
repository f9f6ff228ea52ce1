//! # Event Envelope
//!
//! Wire envelope for every event crossing a service boundary. Provides the
//! metadata the settlement consumer needs for idempotency (`event_id`),
//! tracing (`correlation_id` / `causation_id`), and provenance
//! (`source_module` / `source_version`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard event envelope wrapping a typed payload
///
/// # Examples
///
/// ```rust
/// use event_bus::EventEnvelope;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct OrderDelivered {
///     order_id: String,
///     subtotal_minor: i64,
/// }
///
/// let envelope = EventEnvelope::new(
///     "orders".to_string(),
///     OrderDelivered {
///         order_id: "ord_1029".to_string(),
///         subtotal_minor: 100_000,
///     },
/// )
/// .with_correlation_id(Some("corr-456".to_string()));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique event identifier (idempotency key)
    pub event_id: Uuid,

    /// Timestamp when the event was generated
    pub occurred_at: DateTime<Utc>,

    /// Module that generated the event (e.g., "orders", "settlement")
    pub source_module: String,

    /// Semantic version of the source module
    pub source_version: String,

    /// Links related events in a business transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Links this event to the command/event that caused it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,

    /// Event-specific payload
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    /// Create a new envelope with auto-generated `event_id` and `occurred_at`
    pub fn new(source_module: String, payload: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            source_module,
            source_version: "1.0.0".to_string(),
            correlation_id: None,
            causation_id: None,
            payload,
        }
    }

    /// Create an envelope with an explicit `event_id` (useful for testing
    /// duplicate-delivery behavior)
    pub fn with_event_id(event_id: Uuid, source_module: String, payload: T) -> Self {
        Self {
            event_id,
            occurred_at: Utc::now(),
            source_module,
            source_version: "1.0.0".to_string(),
            correlation_id: None,
            causation_id: None,
            payload,
        }
    }

    pub fn with_source_version(mut self, version: String) -> Self {
        self.source_version = version;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_causation_id(mut self, causation_id: Option<String>) -> Self {
        self.causation_id = causation_id;
        self
    }
}

/// Validate the required envelope fields of a raw JSON event
///
/// # Validation Rules
///
/// - `event_id`: present, parseable as a UUID
/// - `occurred_at`: present
/// - `source_module`: present, non-empty
/// - `source_version`: present, non-empty
///
/// `correlation_id` and `causation_id` are optional.
pub fn validate_envelope_fields(envelope: &serde_json::Value) -> Result<(), String> {
    let event_id = envelope
        .get("event_id")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid event_id")?;

    Uuid::parse_str(event_id).map_err(|_| format!("event_id is not a UUID: {}", event_id))?;

    envelope
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid occurred_at")?;

    let source_module = envelope
        .get("source_module")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid source_module")?;

    if source_module.is_empty() {
        return Err("source_module cannot be empty".to_string());
    }

    let source_version = envelope
        .get("source_version")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid source_version")?;

    if source_version.is_empty() {
        return Err("source_version cannot be empty".to_string());
    }

    Ok(())
}
