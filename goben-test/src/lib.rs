//! Test utilities for goben.
//!
//! This crate provides utilities to facilitate testing the load generator against a real HTTP
//! server. See the modules for all available utilities.

pub mod server;
pub mod tracing;
