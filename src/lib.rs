//! BETLAB: rule-based football wagering strategy engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod backtest;
pub mod config;
pub mod engine;
pub mod history;
pub mod storage;
pub mod strategy;
pub mod types;
