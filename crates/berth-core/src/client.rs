//! Runtime client abstraction for engine-agnostic operation.

use std::io::Read;
use std::time::{Duration, Instant};

use berth_common::container::ContainerCreateConfig;
use berth_common::error::EngineError;
use berth_common::types::{ContainerId, ExecId, ImageId};

use crate::models::{
    ContainerInspect, ContainerSummary, CreatedContainer, ExecInspect, ImageDeleteItem,
    ImageInspect, PruneReport,
};
use crate::options::{
    BuildOptions, ExecCreateOptions, ImageRemoveOptions, ListOptions, PruneFilters,
    RemoveOptions, StopOptions,
};

/// A streamed response body. Dropping it releases the underlying
/// connection.
pub type ByteStream = Box<dyn Read + Send>;

/// Result of a single engine call.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Per-call context carrying the caller's deadline.
///
/// Nothing in Berth imposes its own timeout: a call without a deadline may
/// block for as long as the engine takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallContext {
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context without a deadline.
    #[must_use]
    pub const fn background() -> Self {
        Self { deadline: None }
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub const fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// Fails with `EngineError::DeadlineExceeded` if the deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` when the context is expired.
    pub fn check(&self) -> EngineResult<()> {
        if self.is_expired() {
            return Err(EngineError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Connection to a container engine.
///
/// Implementors own the transport (dial, version negotiation, teardown) and
/// expose one method per engine operation. A single client is shared by
/// every component for the life of the process, so implementations must be
/// safe to call from several threads at once.
pub trait RuntimeClient: Send + Sync {
    /// Returns the negotiated API version.
    fn api_version(&self) -> &str;

    /// Tears the connection down. Later calls fail with
    /// `EngineError::Unreachable`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection was already closed.
    fn close(&self) -> EngineResult<()>;

    /// Lists containers.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the request.
    fn list_containers(
        &self,
        ctx: &CallContext,
        opts: &ListOptions,
    ) -> EngineResult<Vec<ContainerSummary>>;

    /// Creates a container.
    ///
    /// # Errors
    ///
    /// Returns an error on name collision or invalid configuration.
    fn create_container(
        &self,
        ctx: &CallContext,
        config: &ContainerCreateConfig,
    ) -> EngineResult<CreatedContainer>;

    /// Starts a created or stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is missing or cannot start.
    fn start_container(&self, ctx: &CallContext, id: &ContainerId) -> EngineResult<()>;

    /// Stops a running container, blocking until it has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is missing.
    fn stop_container(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        opts: &StopOptions,
    ) -> EngineResult<()>;

    /// Removes a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is missing or still running
    /// without `force`.
    fn remove_container(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        opts: &RemoveOptions,
    ) -> EngineResult<()>;

    /// Returns low-level information about a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is missing.
    fn inspect_container(&self, ctx: &CallContext, id: &ContainerId)
    -> EngineResult<ContainerInspect>;

    /// Creates an exec instance inside a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is missing or not running.
    fn create_exec(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        opts: &ExecCreateOptions,
    ) -> EngineResult<ExecId>;

    /// Starts an exec instance and attaches to its multiplexed output.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec instance is missing or already started.
    fn start_exec(&self, ctx: &CallContext, exec_id: &ExecId) -> EngineResult<ByteStream>;

    /// Returns the state of an exec instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec instance is missing.
    fn inspect_exec(&self, ctx: &CallContext, exec_id: &ExecId) -> EngineResult<ExecInspect>;

    /// Submits a build and returns the streamed JSON build log.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the request before streaming.
    fn build_image(
        &self,
        ctx: &CallContext,
        context: Vec<u8>,
        opts: &BuildOptions,
    ) -> EngineResult<ByteStream>;

    /// Returns low-level information about an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is missing.
    fn inspect_image(&self, ctx: &CallContext, name: &str) -> EngineResult<ImageInspect>;

    /// Removes an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is missing or in use without `force`.
    fn remove_image(
        &self,
        ctx: &CallContext,
        id: &ImageId,
        opts: &ImageRemoveOptions,
    ) -> EngineResult<Vec<ImageDeleteItem>>;

    /// Removes unused images matching the filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the request.
    fn prune_images(&self, ctx: &CallContext, filters: &PruneFilters) -> EngineResult<PruneReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_never_expires() {
        let ctx = CallContext::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(!ctx.is_expired());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn past_deadline_is_expired() {
        let ctx = CallContext::with_deadline(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
        assert!(matches!(ctx.check(), Err(EngineError::DeadlineExceeded)));
    }

    #[test]
    fn future_deadline_has_time_left() {
        let ctx = CallContext::with_timeout(Duration::from_secs(60));
        assert!(!ctx.is_expired());
        assert!(ctx.remaining().is_some_and(|left| left > Duration::from_secs(50)));
    }
}
