//! DLT Tracker: lottery draw history reconciliation and prize backtesting.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod advisor;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod export;
pub mod prize;
pub mod sources;
pub mod stats;
pub mod storage;
pub mod types;
