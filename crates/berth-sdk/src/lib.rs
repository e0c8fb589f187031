//! # berth-sdk
//!
//! Public SDK for using Berth as a Rust library.
//!
//! Provides:
//! - [`Berth`]: owns the engine connection and hands out the lifecycle,
//!   health, exec, build, and image-GC components.
//! - [`ContainerBuilder`](builder::ContainerBuilder): Fluent API for
//!   container configuration.
//! - [`logging::init`]: `tracing` subscriber setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use berth_sdk::{Berth, CallContext, ContainerBuilder};
//!
//! # fn main() -> berth_sdk::Result<()> {
//! let berth = Berth::from_env()?;
//! let ctx = CallContext::background();
//! let config = ContainerBuilder::new("web").image("nginx").build()?;
//! let id = berth.lifecycle().run(&ctx, &config)?;
//! berth.lifecycle().stop(&ctx, &id)?;
//! berth.lifecycle().purge(&ctx, &id)?;
//! berth.close()
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod builder;
pub mod logging;

pub use berth_common::config::ConnectOptions;
pub use berth_common::error::{BerthError, Result};
pub use berth_common::types::{ContainerId, ContainerState, HealthStatus, ImageId};
pub use berth_core::client::{CallContext, RuntimeClient};
pub use berth_engine::HttpRuntimeClient;
pub use berth_image::build::{BuildSummary, ImageBuildPipeline};
pub use berth_image::gc::{ImageDeletion, ImageGc};
pub use berth_runtime::exec::{ExecOutput, ExecRunner};
pub use berth_runtime::health::{HealthMonitor, HealthReport, PollOptions};
pub use berth_runtime::lifecycle::ContainerLifecycleManager;
pub use builder::ContainerBuilder;

/// An engine connection plus the components that use it.
///
/// Components borrow the connection, so [`Berth::close`] cannot run while
/// any of them is still alive.
pub struct Berth {
    client: Box<dyn RuntimeClient>,
    endpoint: String,
}

impl Berth {
    /// Connects to the engine described by `opts`.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Connection` if the engine cannot be reached.
    pub fn connect(opts: &ConnectOptions) -> Result<Self> {
        let client = HttpRuntimeClient::connect(opts)?;
        Ok(Self {
            endpoint: client.endpoint().to_string(),
            client: Box::new(client),
        })
    }

    /// Connects using `DOCKER_HOST` and `DOCKER_API_VERSION`.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Connection` if the engine cannot be reached.
    pub fn from_env() -> Result<Self> {
        Self::connect(&ConnectOptions::from_env())
    }

    /// Wraps an existing client, e.g. an in-memory engine in tests.
    #[must_use]
    pub fn with_client(client: impl RuntimeClient + 'static, endpoint: impl Into<String>) -> Self {
        Self {
            client: Box::new(client),
            endpoint: endpoint.into(),
        }
    }

    /// The shared engine client.
    #[must_use]
    pub fn client(&self) -> &dyn RuntimeClient {
        self.client.as_ref()
    }

    /// Negotiated engine API version.
    #[must_use]
    pub fn api_version(&self) -> &str {
        self.client.api_version()
    }

    /// Container create, start, stop, and purge.
    #[must_use]
    pub fn lifecycle(&self) -> ContainerLifecycleManager<'_> {
        ContainerLifecycleManager::new(self.client())
    }

    /// Healthcheck queries.
    #[must_use]
    pub fn health(&self) -> HealthMonitor<'_> {
        HealthMonitor::new(self.client())
    }

    /// Command execution.
    #[must_use]
    pub fn exec(&self) -> ExecRunner<'_> {
        ExecRunner::new(self.client())
    }

    /// Image builds.
    #[must_use]
    pub fn builds(&self) -> ImageBuildPipeline<'_> {
        ImageBuildPipeline::new(self.client())
    }

    /// Image deletion and pruning.
    #[must_use]
    pub fn images(&self) -> ImageGc<'_> {
        ImageGc::new(self.client())
    }

    /// Tears the connection down.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Connection` if the client reports a failure.
    pub fn close(self) -> Result<()> {
        self.client
            .close()
            .map_err(|source| BerthError::Connection {
                endpoint: self.endpoint,
                source,
            })
    }
}

impl std::fmt::Debug for Berth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Berth")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.client.api_version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use berth_core::testing::FakeEngine;

    use super::*;

    #[test]
    fn facade_hands_out_components_over_one_client() {
        let berth = Berth::with_client(FakeEngine::new(), "fake://engine");
        let ctx = CallContext::background();
        let config = ContainerBuilder::new("web").image("nginx").build().expect("config");

        let id = berth.lifecycle().run(&ctx, &config).expect("run");
        assert_eq!(berth.lifecycle().list(&ctx, false).expect("list").len(), 1);
        berth.lifecycle().purge(&ctx, &id).expect("purge");
        assert!(berth.images().prune_dangling_images(&ctx).expect("prune").is_empty());
        berth.close().expect("close");
    }

    #[test]
    fn debug_shows_endpoint() {
        let berth = Berth::with_client(FakeEngine::new(), "fake://engine");
        let text = format!("{berth:?}");
        assert!(text.contains("fake://engine"));
    }
}
