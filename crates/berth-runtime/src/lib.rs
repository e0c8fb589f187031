//! Container lifecycle management for Berth.
//!
//! - [`lifecycle`]: create, start, stop, and purge a single container.
//! - [`health`]: point-in-time healthcheck queries.
//! - [`exec`]: run a command in a running container and collect its output.
//! - [`demux`]: decoder for the engine's multiplexed stdout/stderr stream.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod demux;
pub mod exec;
pub mod health;
pub mod lifecycle;
