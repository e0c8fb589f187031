//! Single-container lifecycle: create, start, stop, purge.
//!
//! A container moves `Created → Running → Stopped → Purged` once. This layer
//! keeps no state of its own and does not guard transitions: whatever the
//! engine rejects is surfaced as a [`BerthError::Lifecycle`], with no retry
//! and no compensating rollback.

use berth_common::container::ContainerCreateConfig;
use berth_common::error::{BerthError, EngineError, LifecycleOp, Result};
use berth_common::types::ContainerId;
use berth_core::client::{CallContext, RuntimeClient};
use berth_core::models::ContainerSummary;
use berth_core::options::{ListOptions, RemoveOptions, StopOptions};

/// Drives containers through their lifecycle via the shared engine client.
pub struct ContainerLifecycleManager<'a> {
    client: &'a dyn RuntimeClient,
}

impl<'a> ContainerLifecycleManager<'a> {
    /// Creates a manager borrowing the shared engine client.
    #[must_use]
    pub fn new(client: &'a dyn RuntimeClient) -> Self {
        Self { client }
    }

    /// Creates a container and returns its engine-assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` if the configuration is invalid, or
    /// `BerthError::Lifecycle` if the engine rejects it (for example on a
    /// name collision).
    pub fn create(&self, ctx: &CallContext, config: &ContainerCreateConfig) -> Result<ContainerId> {
        config.validate()?;
        let created = self
            .client
            .create_container(ctx, config)
            .map_err(|e| lifecycle_error(LifecycleOp::Create, config.name(), e))?;
        for warning in &created.warnings {
            tracing::warn!(name = %config.name(), warning = %warning, "engine warning on create");
        }
        tracing::info!(id = %created.id, name = %config.name(), image = %config.image().image, "container created");
        Ok(created.id)
    }

    /// Starts a created container.
    ///
    /// Starting an already running container is not made safe here: the
    /// engine's answer is returned as an error.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Lifecycle` if the engine rejects the start.
    pub fn start(&self, ctx: &CallContext, id: &ContainerId) -> Result<()> {
        self.client
            .start_container(ctx, id)
            .map_err(|e| lifecycle_error(LifecycleOp::Start, id.as_str(), e))?;
        tracing::info!(id = %id, "container started");
        Ok(())
    }

    /// Creates and starts a container. A failed start leaves the created
    /// container in place.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever step failed.
    pub fn run(&self, ctx: &CallContext, config: &ContainerCreateConfig) -> Result<ContainerId> {
        let id = self.create(ctx, config)?;
        self.start(ctx, &id)?;
        Ok(id)
    }

    /// Sends SIGTERM and waits until the engine reports the container has
    /// exited or its grace period has elapsed.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Lifecycle` if the engine rejects the stop.
    pub fn stop(&self, ctx: &CallContext, id: &ContainerId) -> Result<()> {
        self.stop_with(ctx, id, &StopOptions::default())
    }

    /// Stops a container with a caller-chosen signal and grace period.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Lifecycle` if the engine rejects the stop.
    pub fn stop_with(&self, ctx: &CallContext, id: &ContainerId, opts: &StopOptions) -> Result<()> {
        tracing::info!(id = %id, signal = %opts.signal, grace = ?opts.grace_period, "stopping container");
        self.client
            .stop_container(ctx, id, opts)
            .map_err(|e| lifecycle_error(LifecycleOp::Stop, id.as_str(), e))?;
        tracing::info!(id = %id, "container stopped");
        Ok(())
    }

    /// Force-removes a container together with its anonymous volumes,
    /// keeping links. Works on running containers too; call [`Self::stop`]
    /// first when a clean shutdown matters.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Lifecycle` if the engine rejects the removal.
    pub fn purge(&self, ctx: &CallContext, id: &ContainerId) -> Result<()> {
        self.client
            .remove_container(ctx, id, &RemoveOptions::default())
            .map_err(|e| lifecycle_error(LifecycleOp::Purge, id.as_str(), e))?;
        tracing::info!(id = %id, "container purged");
        Ok(())
    }

    /// Lists containers; stopped ones are included when `all` is set.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Lifecycle` if the engine rejects the listing.
    pub fn list(&self, ctx: &CallContext, all: bool) -> Result<Vec<ContainerSummary>> {
        let opts = ListOptions {
            all,
            ..ListOptions::default()
        };
        self.client
            .list_containers(ctx, &opts)
            .map_err(|e| lifecycle_error(LifecycleOp::List, "*", e))
    }
}

fn lifecycle_error(op: LifecycleOp, id: &str, source: EngineError) -> BerthError {
    BerthError::Lifecycle {
        op,
        id: id.to_string(),
        source,
    }
}
