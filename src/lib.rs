//! daytrader — multi-factor intraday trading engine.
//!
//! Hexagonal architecture: decision logic in [`domain`], collaborator
//! traits in [`ports`], concrete implementations in [`adapters`], and the
//! async runtime services (candle aggregation, tick queue, live evaluation,
//! the trading loop) in [`engine`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod ports;
