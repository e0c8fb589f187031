//! # berth-engine
//!
//! Reference [`RuntimeClient`](berth_core::client::RuntimeClient) over the
//! Docker Engine HTTP API.
//!
//! Handles:
//! - **Host**: Parsing `DOCKER_HOST`-style endpoints (Unix socket or TCP).
//! - **Version**: API version negotiation against `/version`.
//! - **Wire**: Engine JSON request and response shapes.
//! - **Client**: The blocking HTTP client itself.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod client;
pub mod host;
pub mod version;
pub mod wire;

pub use client::HttpRuntimeClient;
pub use host::Endpoint;
