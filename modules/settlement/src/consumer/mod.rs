pub mod order_delivered_consumer;
