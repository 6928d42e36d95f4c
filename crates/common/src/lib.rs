//! Common utilities, types, and configuration shared across Quarry crates.
//!
//! This crate contains the base building blocks for the Quarry system, including:
//! - **Configuration**: Strongly typed application configuration (`config`).
//! - **Models**: Parameter values and the result envelope (`models`).
//! - **Scrubbing**: Secret redaction for outbound messages (`scrubber`).
//! - **Telemetry**: Observability setup (`telemetry`).
pub mod config;
pub mod models;
pub mod scrubber;
pub mod telemetry;
