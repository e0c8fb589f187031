//! Container healthcheck queries.

use std::thread;
use std::time::Duration;

use berth_common::error::{BerthError, ProbeFailure, Result};
use berth_common::types::{ContainerId, HealthStatus};
use berth_core::client::{CallContext, RuntimeClient};

/// Outcome of one health query.
///
/// When the status could not be observed, `status` is
/// [`HealthStatus::Unhealthy`] and `error` says why, so callers can tell a
/// failed probe from an observed unhealthy container.
#[derive(Debug)]
pub struct HealthReport {
    /// Reported or fallback status.
    pub status: HealthStatus,
    /// Why the status could not be observed, if it could not.
    pub error: Option<BerthError>,
}

impl HealthReport {
    const fn observed(status: HealthStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    fn degraded(id: &ContainerId, source: ProbeFailure) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error: Some(BerthError::HealthProbe {
                id: id.to_string(),
                source,
            }),
        }
    }

    /// Returns `true` if the engine reported the container healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.error.is_none() && self.status == HealthStatus::Healthy
    }

    /// Converts the report into the observed status, or the probe error.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::HealthProbe` if the status was not observed.
    pub fn into_result(self) -> Result<HealthStatus> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.status),
        }
    }
}

/// Polling budget for [`HealthMonitor::wait_until_healthy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Pause between queries.
    pub interval: Duration,
    /// Maximum number of queries.
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

/// Reads the healthcheck status the engine keeps for a container.
pub struct HealthMonitor<'a> {
    client: &'a dyn RuntimeClient,
}

impl<'a> HealthMonitor<'a> {
    /// Creates a monitor borrowing the shared engine client.
    #[must_use]
    pub fn new(client: &'a dyn RuntimeClient) -> Self {
        Self { client }
    }

    /// Returns the container's current health status, verbatim from its
    /// healthcheck. Point-in-time only; see [`Self::wait_until_healthy`].
    #[must_use]
    pub fn health_status(&self, ctx: &CallContext, id: &ContainerId) -> HealthReport {
        let inspect = match self.client.inspect_container(ctx, id) {
            Ok(inspect) => inspect,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "health inspection failed, reporting unhealthy");
                return HealthReport::degraded(id, ProbeFailure::Inspect(e));
            }
        };
        let Some(health) = inspect.state.health else {
            tracing::warn!(id = %id, "container has no healthcheck");
            return HealthReport::degraded(id, ProbeFailure::NotConfigured);
        };
        match HealthStatus::parse(&health.status) {
            Some(status) => {
                tracing::debug!(id = %id, status = %status, streak = health.failing_streak, "health observed");
                HealthReport::observed(status)
            }
            None => {
                tracing::warn!(id = %id, status = %health.status, "unrecognised health status");
                HealthReport::degraded(id, ProbeFailure::UnknownStatus(health.status))
            }
        }
    }

    /// Queries the status until it is healthy, the attempt budget runs out,
    /// or the context expires. Returns the last report.
    #[must_use]
    pub fn wait_until_healthy(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        opts: &PollOptions,
    ) -> HealthReport {
        let attempts = opts.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let report = self.health_status(ctx, id);
            if report.is_healthy() || attempt >= attempts || ctx.is_expired() {
                tracing::info!(id = %id, status = %report.status, attempt, "health wait finished");
                return report;
            }
            let pause = ctx
                .remaining()
                .map_or(opts.interval, |left| left.min(opts.interval));
            thread::sleep(pause);
            attempt += 1;
        }
    }
}
