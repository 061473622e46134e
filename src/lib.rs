pub mod ai_gateway;
pub mod app;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod narrative;
pub mod output;
pub mod records;
