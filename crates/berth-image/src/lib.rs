//! # berth-image
//!
//! Image management for Berth.
//!
//! Handles:
//! - **Context**: Archiving a build directory into an uncompressed tar.
//! - **Build**: Submitting builds and following the engine's JSON build log.
//! - **Log**: Typed build log records.
//! - **GC**: Idempotent image deletion and dangling-image pruning.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod build;
pub mod context;
pub mod gc;
pub mod log;
