//! Sweepstake Draw Engine
//!
//! Weighted random selection of daily sweepstake winners and runner-ups from
//! point balances, with all-or-nothing persistence of each draw and runner-up
//! promotion when a winner forfeits.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod state;
pub mod types;
