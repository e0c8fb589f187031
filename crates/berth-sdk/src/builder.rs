//! Fluent API for configuring containers.

use std::time::Duration;

use berth_common::container::{
    ContainerCreateConfig, EndpointConfig, ExposedPort, HealthcheckConfig, HostResources,
    ImageConfig, NetworkConfig, Platform, PortBinding, RestartPolicy,
};
use berth_common::error::{BerthError, Result};

/// Builder for a [`ContainerCreateConfig`].
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    name: String,
    image: ImageConfig,
    host: HostResources,
    network: NetworkConfig,
    platform: Option<Platform>,
}

impl ContainerBuilder {
    /// Creates a new builder with the given container name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the image reference.
    #[must_use]
    pub fn image(mut self, reference: impl Into<String>) -> Self {
        self.image.image = reference.into();
        self
    }

    /// Sets the command to run inside the container.
    #[must_use]
    pub fn command<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the image entrypoint.
    #[must_use]
    pub fn entrypoint<I, S>(mut self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image.entrypoint = Some(entrypoint.into_iter().map(Into::into).collect());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.image.env.push((key.into(), value.into()));
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.image.labels.insert(key.into(), value.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.image.working_dir = Some(dir.into());
        self
    }

    /// Sets the user the process runs as.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.image.user = Some(user.into());
        self
    }

    /// Exposes a container port.
    #[must_use]
    pub fn expose(mut self, port: ExposedPort) -> Self {
        self.image.exposed_ports.push(port);
        self
    }

    /// Publishes a TCP container port on a host port.
    #[must_use]
    pub fn publish(mut self, container_port: u16, host_port: u16) -> Self {
        self.host.port_bindings.push(PortBinding {
            container_port: ExposedPort::tcp(container_port),
            host_ip: None,
            host_port,
        });
        self
    }

    /// Sets an exec-form healthcheck (`CMD ...`) probed every `interval`.
    #[must_use]
    pub fn healthcheck<I, S>(mut self, cmd: I, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut test = vec!["CMD".to_string()];
        test.extend(cmd.into_iter().map(Into::into));
        self.image.healthcheck = Some(HealthcheckConfig {
            test,
            interval: Some(interval),
            ..HealthcheckConfig::default()
        });
        self
    }

    /// Sets the memory limit in bytes.
    #[must_use]
    pub const fn memory_limit(mut self, bytes: u64) -> Self {
        self.host.memory_bytes = Some(bytes);
        self
    }

    /// Sets the CPU quota in units of 10^-9 CPUs.
    #[must_use]
    pub const fn nano_cpus(mut self, nano_cpus: u64) -> Self {
        self.host.nano_cpus = Some(nano_cpus);
        self
    }

    /// Sets CPU shares (relative weight).
    #[must_use]
    pub const fn cpu_shares(mut self, shares: u64) -> Self {
        self.host.cpu_shares = Some(shares);
        self
    }

    /// Adds a bind mount in `host:container[:opts]` form.
    #[must_use]
    pub fn bind(mut self, spec: impl Into<String>) -> Self {
        self.host.binds.push(spec.into());
        self
    }

    /// Sets the restart policy.
    #[must_use]
    pub const fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.host.restart_policy = policy;
        self
    }

    /// Removes the container automatically when it exits.
    #[must_use]
    pub const fn auto_remove(mut self, enabled: bool) -> Self {
        self.host.auto_remove = enabled;
        self
    }

    /// Sets the network mode, e.g. `bridge` or `host`.
    #[must_use]
    pub fn network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network.mode = Some(mode.into());
        self
    }

    /// Attaches to a named network under the given aliases.
    #[must_use]
    pub fn network<I, S>(mut self, name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _ = self.network.endpoints.insert(
            name.into(),
            EndpointConfig {
                aliases: aliases.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Constrains the image platform.
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Builds the validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` if the image is missing, the name is
    /// invalid, or a resource limit is out of range.
    pub fn build(self) -> Result<ContainerCreateConfig> {
        if self.image.image.is_empty() {
            return Err(BerthError::Config {
                message: format!("container {} needs an image", self.name),
            });
        }
        let mut config = ContainerCreateConfig::new(self.name, self.image)?
            .with_host(self.host)?
            .with_network(self.network);
        if let Some(platform) = self.platform {
            config = config.with_platform(platform);
        }
        Ok(config)
    }
}
