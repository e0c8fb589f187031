//! System-wide constants and engine defaults.

/// Application name used in log targets and user agents.
pub const APP_NAME: &str = "berth";

/// Engine endpoint used when neither options nor environment name one.
pub const DEFAULT_ENGINE_HOST: &str = "unix:///var/run/docker.sock";

/// Environment variable naming the engine endpoint.
pub const ENV_ENGINE_HOST: &str = "DOCKER_HOST";

/// Environment variable pinning the engine API version.
pub const ENV_API_VERSION: &str = "DOCKER_API_VERSION";

/// Environment variable naming the directory holding `ca.pem`, `cert.pem`
/// and `key.pem`. Setting it switches TCP hosts to TLS.
pub const ENV_CERT_PATH: &str = "DOCKER_CERT_PATH";

/// Environment variable enabling verification of the engine's certificate.
pub const ENV_TLS_VERIFY: &str = "DOCKER_TLS_VERIFY";

/// Highest engine API version this client speaks.
pub const MAX_API_VERSION: &str = "1.45";

/// Lowest engine API version this client accepts during negotiation.
pub const MIN_API_VERSION: &str = "1.24";

/// File that must exist at the root of every build context.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Smallest memory limit the engine accepts for a container (6 MiB).
pub const MIN_MEMORY_BYTES: u64 = 6 * 1024 * 1024;

/// Signal sent by a graceful stop.
pub const DEFAULT_STOP_SIGNAL: &str = "SIGTERM";

/// Length of the header preceding every multiplexed exec frame.
pub const FRAME_HEADER_LEN: usize = 8;

/// Filter key selecting untagged, unreferenced images.
pub const DANGLING_FILTER: &str = "dangling";
