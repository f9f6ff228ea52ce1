//! Validation of incoming order snapshots
//!
//! Rejects structurally bad `orders.events.delivered` payloads before any
//! settlement state is touched. Amount-range rules mirror the fee policy's
//! own checks so a bad event fails fast with a precise reason.

use crate::models::OrderSnapshot;
use thiserror::Error;

/// Validation errors for delivered-order payloads
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("order_id cannot be empty")]
    EmptyOrderId,

    #[error("restaurant_id cannot be empty (order {0})")]
    EmptyRestaurantId(String),

    #[error("driver_id, when present, cannot be empty (order {0})")]
    EmptyDriverId(String),

    #[error("order_code cannot be empty (order {0})")]
    EmptyOrderCode(String),

    #[error("subtotal must be non-negative, got {1} (order {0})")]
    NegativeSubtotal(String, i64),

    #[error("delivery fee must be non-negative, got {1} (order {0})")]
    NegativeDeliveryFee(String, i64),

    #[error("tip must be non-negative, got {1} (order {0})")]
    NegativeTip(String, i64),
}

/// Validate a delivered-order snapshot
///
/// # Validation Rules
///
/// - `order_id`, `restaurant_id`, `order_code`: non-empty
/// - `driver_id`: if present, non-empty
/// - `subtotal_minor`, `delivery_fee_minor`, `tip_minor`: >= 0
pub fn validate_order(order: &OrderSnapshot) -> Result<(), ValidationError> {
    if order.order_id.is_empty() {
        return Err(ValidationError::EmptyOrderId);
    }

    if order.restaurant_id.is_empty() {
        return Err(ValidationError::EmptyRestaurantId(order.order_id.clone()));
    }

    if let Some(driver_id) = &order.driver_id {
        if driver_id.is_empty() {
            return Err(ValidationError::EmptyDriverId(order.order_id.clone()));
        }
    }

    if order.order_code.is_empty() {
        return Err(ValidationError::EmptyOrderCode(order.order_id.clone()));
    }

    if order.subtotal_minor < 0 {
        return Err(ValidationError::NegativeSubtotal(
            order.order_id.clone(),
            order.subtotal_minor,
        ));
    }

    if order.delivery_fee_minor < 0 {
        return Err(ValidationError::NegativeDeliveryFee(
            order.order_id.clone(),
            order.delivery_fee_minor,
        ));
    }

    if order.tip_minor < 0 {
        return Err(ValidationError::NegativeTip(
            order.order_id.clone(),
            order.tip_minor,
        ));
    }

    Ok(())
}
