pub mod settlement_plan;
pub mod settlement_service;
