// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod capture;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod event_log;
pub mod protocol;
pub mod quiz;
pub mod runtime;
