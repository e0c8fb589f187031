//! # berth-core
//!
//! The capability boundary between Berth and a container engine.
//!
//! Components never talk to an engine directly. They borrow a
//! [`RuntimeClient`](client::RuntimeClient) and pass a
//! [`CallContext`](client::CallContext) plus a typed option record from
//! [`options`] on every call. Responses come back as the engine-neutral
//! records in [`models`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod client;
pub mod models;
pub mod options;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
