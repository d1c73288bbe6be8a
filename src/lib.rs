pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod orchestrator;
pub mod provider;

// Layered boundary between components and the network
pub mod infra;
pub mod ports;
