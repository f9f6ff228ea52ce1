use std::env;

use crate::fee_policy::FeePolicyConfig;

/// Application configuration parsed from environment variables
///
/// Everything configurable enters the process here, once, at startup;
/// services receive their configuration through constructors.
#[derive(Debug, Clone)]
pub struct Config {
    /// Required when `store_type` is "postgres"
    pub database_url: Option<String>,
    pub store_type: String,
    pub bus_type: String,
    pub nats_url: String,
    pub platform_fee_rate: u32,
    pub driver_commission_rate: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let store_type = env::var("STORE_TYPE").unwrap_or_else(|_| "postgres".to_string());

        let database_url = env::var("DATABASE_URL").ok();
        if store_type == "postgres" && database_url.is_none() {
            return Err("DATABASE_URL must be set when STORE_TYPE is postgres".to_string());
        }

        let bus_type = env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string());

        let nats_url =
            env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let platform_fee_rate: u32 = env::var("PLATFORM_FEE_RATE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| "PLATFORM_FEE_RATE must be an integer percentage".to_string())?;

        let driver_commission_rate: u32 = env::var("DRIVER_COMMISSION_RATE")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| "DRIVER_COMMISSION_RATE must be an integer percentage".to_string())?;

        Ok(Config {
            database_url,
            store_type,
            bus_type,
            nats_url,
            platform_fee_rate,
            driver_commission_rate,
        })
    }

    pub fn fee_policy(&self) -> FeePolicyConfig {
        FeePolicyConfig {
            platform_fee_rate: self.platform_fee_rate,
            driver_commission_rate: self.driver_commission_rate,
        }
    }
}
