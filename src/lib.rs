//! STEAMER: racing market intelligence pipeline
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod acquisition;
pub mod config;
pub mod data;
pub mod engine;
pub mod storage;
pub mod strategy;
pub mod types;
