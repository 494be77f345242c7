//! Price feeder library
//!
//! Ingests live ticker streams from multiple venues and reconciles them into
//! a single USD price per asset: multi-hop conversion over the declared pair
//! graph, volatility-weighted deviation filtering, VWAP aggregation.

pub mod config;
pub mod decimal;
pub mod error;
pub mod history;
pub mod metrics;
pub mod oracle;
pub mod types;
