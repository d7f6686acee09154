pub mod calendar;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod storage;
pub mod types;

// Layered boundaries: ports the pipeline depends on, adapters that implement them
pub mod app;
pub mod infra;
