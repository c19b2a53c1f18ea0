//! trace-driven simulator of a set-associative cache with LRU replacement.

mod bits;
pub mod cache;
pub mod config;
pub mod sim;
pub mod trace;

#[cfg(feature = "stat")]
pub mod stat;
