//! Fee split policy
//!
//! Pure computation of how a delivered order's collected payment divides
//! into restaurant revenue, driver payment, and the platform's retained
//! fees. All arithmetic is integer minor-currency units with floor
//! rounding, so the four outputs always sum exactly to the gross amount.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configured percentage rates, both in `[0, 100]`
///
/// `platform_fee_rate` applies to the order subtotal (the restaurant's
/// share); `driver_commission_rate` applies to the delivery fee (the
/// driver's share).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicyConfig {
    pub platform_fee_rate: u32,
    pub driver_commission_rate: u32,
}

/// Financial summary of one order, integer minor currency units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderAmounts {
    pub subtotal_minor: i64,
    pub delivery_fee_minor: i64,
    pub tip_minor: i64,
}

/// Result of splitting one order's gross amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub platform_fee_minor: i64,
    pub restaurant_revenue_minor: i64,
    pub driver_commission_minor: i64,
    pub driver_payment_minor: i64,
}

impl FeeSplit {
    /// Sum of all four shares; always equals the order's gross amount
    pub fn gross_minor(&self) -> i64 {
        self.platform_fee_minor
            + self.restaurant_revenue_minor
            + self.driver_commission_minor
            + self.driver_payment_minor
    }
}

/// Errors from fee policy construction or evaluation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeePolicyError {
    #[error("amount must be non-negative: {field} = {value}")]
    InvalidAmount { field: &'static str, value: i64 },

    #[error("rate must be within 0..=100: {field} = {value}")]
    InvalidConfiguration { field: &'static str, value: u32 },
}

/// Fee policy with validated rates
///
/// Rates are injected once at construction; nothing in here reads process
/// environment or global state.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    config: FeePolicyConfig,
}

impl FeePolicy {
    /// Create a policy, rejecting rates outside `[0, 100]`
    pub fn new(config: FeePolicyConfig) -> Result<Self, FeePolicyError> {
        if config.platform_fee_rate > 100 {
            return Err(FeePolicyError::InvalidConfiguration {
                field: "platform_fee_rate",
                value: config.platform_fee_rate,
            });
        }
        if config.driver_commission_rate > 100 {
            return Err(FeePolicyError::InvalidConfiguration {
                field: "driver_commission_rate",
                value: config.driver_commission_rate,
            });
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &FeePolicyConfig {
        &self.config
    }

    /// Split an order's gross amount into the four shares
    ///
    /// - `platform_fee = floor(subtotal * platform_fee_rate / 100)`
    /// - `restaurant_revenue = subtotal - platform_fee`
    /// - `driver_commission = floor(delivery_fee * driver_commission_rate / 100)`
    /// - `driver_payment = delivery_fee + tip - driver_commission`
    ///
    /// Floor rounding on the fee side means any remainder stays with the
    /// paid-out party, and the conservation invariant
    /// `split.gross_minor() == subtotal + delivery_fee + tip` holds for all
    /// valid inputs.
    pub fn split(&self, amounts: &OrderAmounts) -> Result<FeeSplit, FeePolicyError> {
        validate_amount("subtotal_minor", amounts.subtotal_minor)?;
        validate_amount("delivery_fee_minor", amounts.delivery_fee_minor)?;
        validate_amount("tip_minor", amounts.tip_minor)?;

        let platform_fee_minor =
            amounts.subtotal_minor * i64::from(self.config.platform_fee_rate) / 100;
        let restaurant_revenue_minor = amounts.subtotal_minor - platform_fee_minor;

        let driver_commission_minor =
            amounts.delivery_fee_minor * i64::from(self.config.driver_commission_rate) / 100;
        let driver_payment_minor =
            amounts.delivery_fee_minor + amounts.tip_minor - driver_commission_minor;

        Ok(FeeSplit {
            platform_fee_minor,
            restaurant_revenue_minor,
            driver_commission_minor,
            driver_payment_minor,
        })
    }
}

fn validate_amount(field: &'static str, value: i64) -> Result<(), FeePolicyError> {
    if value < 0 {
        return Err(FeePolicyError::InvalidAmount { field, value });
    }
    Ok(())
}
