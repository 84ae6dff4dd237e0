//! vidserve - signed-URL video streaming server
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod error;
pub mod server;
pub mod streaming;
