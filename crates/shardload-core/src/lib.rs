pub mod bootstrap;
pub mod catalog;
pub mod coerce;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod memory_store;
pub mod orchestrator;
pub mod traits;
pub mod types;
pub mod verify;
