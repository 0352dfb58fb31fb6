//! Barkeep: the subscription cache behind the bar point-of-sale client.

pub mod config;
pub mod error;
pub mod infra;
pub mod replay;
pub mod subs;
