//! LedgerLens Backend Library
//!
//! Portfolio valuation engine plus the thin HTTP adapter and stores it runs on.
//! Binaries and integration tests build on these modules.

pub mod api;
pub mod auth;
pub mod chains;
pub mod config;
pub mod models;
pub mod portfolio;
pub mod pricing;
pub mod store;
pub mod wallet;
