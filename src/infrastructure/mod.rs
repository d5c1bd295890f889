pub mod catalog_loader;
pub mod config;
pub mod database;
pub mod file_storage;
pub mod kafka_producer;
pub mod product_applier;
pub mod telemetry;
