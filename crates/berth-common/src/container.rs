//! Container creation configuration.
//!
//! [`ContainerCreateConfig`] gathers everything a single create call needs:
//! the image and process settings, host resources, network attachment, and
//! an optional platform constraint. Engine adapters translate it into their
//! own request shape; nothing here mirrors a particular engine client.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{BerthError, Result};

/// Transport protocol of an exposed port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

/// A container port and its protocol, rendered as `80/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExposedPort {
    /// Port number inside the container.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl ExposedPort {
    /// A TCP port.
    #[must_use]
    pub const fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    /// A UDP port.
    #[must_use]
    pub const fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }
}

impl fmt::Display for ExposedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::Tcp => write!(f, "{}/tcp", self.port),
            Protocol::Udp => write!(f, "{}/udp", self.port),
        }
    }
}

/// Healthcheck run by the engine inside the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    /// Probe command, e.g. `["CMD", "curl", "-f", "localhost"]`.
    pub test: Vec<String>,
    /// Time between probes.
    pub interval: Option<Duration>,
    /// Time a single probe may take.
    pub timeout: Option<Duration>,
    /// Consecutive failures before the container is unhealthy.
    pub retries: Option<u32>,
    /// Grace period during which failures do not count.
    pub start_period: Option<Duration>,
}

/// Image and process settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image reference, e.g. `nginx:1.27`.
    pub image: String,
    /// Command (arguments to the entrypoint).
    pub command: Vec<String>,
    /// Entrypoint override.
    pub entrypoint: Option<Vec<String>>,
    /// Environment variables.
    pub env: Vec<(String, String)>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// Ports the container listens on.
    pub exposed_ports: Vec<ExposedPort>,
    /// Working directory for the process.
    pub working_dir: Option<String>,
    /// User the process runs as.
    pub user: Option<String>,
    /// Healthcheck override.
    pub healthcheck: Option<HealthcheckConfig>,
}

impl ImageConfig {
    /// Creates an image configuration with only the image reference set.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }
}

/// Host port published for a container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Container side of the binding.
    pub container_port: ExposedPort,
    /// Host interface to bind, all interfaces when `None`.
    pub host_ip: Option<String>,
    /// Host port; `0` lets the engine choose.
    pub host_port: u16,
}

/// What the engine does when the container exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart.
    #[default]
    No,
    /// Always restart.
    Always,
    /// Restart unless explicitly stopped.
    UnlessStopped,
    /// Restart on nonzero exit, up to a retry count.
    OnFailure {
        /// Maximum restart attempts; `0` means unlimited.
        max_retries: u32,
    },
}

impl RestartPolicy {
    /// Returns the engine's name for this policy.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::UnlessStopped => "unless-stopped",
            Self::OnFailure { .. } => "on-failure",
        }
    }
}

/// Host resources and host-side wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResources {
    /// Memory limit in bytes.
    pub memory_bytes: Option<u64>,
    /// CPU quota in units of 1e-9 CPUs.
    pub nano_cpus: Option<u64>,
    /// CPU shares (relative weight).
    pub cpu_shares: Option<u64>,
    /// Published ports.
    pub port_bindings: Vec<PortBinding>,
    /// Bind mounts in `host:container[:opts]` form.
    pub binds: Vec<String>,
    /// Restart policy.
    pub restart_policy: RestartPolicy,
    /// Remove the container automatically when it exits.
    pub auto_remove: bool,
}

/// Per-network endpoint settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// DNS aliases on this network.
    pub aliases: Vec<String>,
}

/// Network attachment at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network mode, e.g. `bridge`, `host`, or a network name.
    pub mode: Option<String>,
    /// Networks to join, keyed by network name.
    pub endpoints: BTreeMap<String, EndpointConfig>,
}

/// Platform the image must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system, e.g. `linux`.
    pub os: String,
    /// CPU architecture, e.g. `amd64`.
    pub architecture: String,
    /// Architecture variant, e.g. `v8`.
    pub variant: Option<String>,
}

impl Platform {
    /// Creates a platform without a variant.
    #[must_use]
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

/// Everything needed to create one container, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerCreateConfig {
    name: String,
    image: ImageConfig,
    host: HostResources,
    network: NetworkConfig,
    platform: Option<Platform>,
}

impl ContainerCreateConfig {
    /// Creates a configuration with default host, network, and platform
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` if the name or image is invalid.
    pub fn new(name: impl Into<String>, image: ImageConfig) -> Result<Self> {
        let config = Self {
            name: name.into(),
            image,
            host: HostResources::default(),
            network: NetworkConfig::default(),
            platform: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Replaces the host resources.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` if the resource limits are invalid.
    pub fn with_host(mut self, host: HostResources) -> Result<Self> {
        self.host = host;
        self.validate()?;
        Ok(self)
    }

    /// Replaces the network configuration.
    #[must_use]
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Sets the platform constraint.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Checks every invariant of the configuration.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.image.image.trim().is_empty() {
            return Err(config_error(format!(
                "container {} has no image reference",
                self.name
            )));
        }
        if let Some(memory) = self
            .host
            .memory_bytes
            .filter(|m| *m < constants::MIN_MEMORY_BYTES)
        {
            return Err(config_error(format!(
                "memory limit {memory} bytes is below the minimum of {} bytes",
                constants::MIN_MEMORY_BYTES
            )));
        }
        if self.host.nano_cpus == Some(0) {
            return Err(config_error("nano_cpus must be greater than zero"));
        }
        if self.host.cpu_shares == Some(0) {
            return Err(config_error("cpu_shares must be greater than zero"));
        }
        Ok(())
    }

    /// Container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image and process settings.
    #[must_use]
    pub const fn image(&self) -> &ImageConfig {
        &self.image
    }

    /// Host resources.
    #[must_use]
    pub const fn host(&self) -> &HostResources {
        &self.host
    }

    /// Network configuration.
    #[must_use]
    pub const fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Platform constraint, if any.
    #[must_use]
    pub const fn platform(&self) -> Option<&Platform> {
        self.platform.as_ref()
    }
}

/// Container names follow `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(config_error("container name must not be empty"));
    };
    if !first.is_ascii_alphanumeric() {
        return Err(config_error(format!(
            "container name {name:?} must start with a letter or digit"
        )));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(config_error(format!(
            "container name {name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

fn config_error(message: impl Into<String>) -> BerthError {
    BerthError::Config {
        message: message.into(),
    }
}
