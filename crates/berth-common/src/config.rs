//! Engine connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Options used to open an engine connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Engine endpoint, e.g. `unix:///var/run/docker.sock`,
    /// `tcp://127.0.0.1:2375` or `https://engine:2376`.
    pub host: String,
    /// API version to pin. Negotiated with the engine when `None`.
    pub api_version: Option<String>,
    /// Timeout for establishing each connection to the engine. It bounds the
    /// dial only; per-call deadlines come from the call context.
    pub connect_timeout: Option<Duration>,
    /// Directory with `ca.pem`, `cert.pem` and `key.pem`. When set, TCP
    /// hosts are dialed over TLS with this client identity.
    pub cert_path: Option<PathBuf>,
    /// Verify the engine certificate against `ca.pem`. Only meaningful with
    /// `cert_path`.
    pub tls_verify: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_ENGINE_HOST.to_string(),
            api_version: None,
            connect_timeout: Some(Duration::from_secs(10)),
            cert_path: None,
            tls_verify: false,
        }
    }
}

impl ConnectOptions {
    /// Builds options from `DOCKER_HOST`, `DOCKER_API_VERSION`,
    /// `DOCKER_CERT_PATH` and `DOCKER_TLS_VERIFY`, falling back to defaults
    /// for anything unset or empty.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds options from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            host: non_empty(constants::ENV_ENGINE_HOST).unwrap_or(defaults.host),
            api_version: non_empty(constants::ENV_API_VERSION),
            connect_timeout: defaults.connect_timeout,
            cert_path: non_empty(constants::ENV_CERT_PATH).map(PathBuf::from),
            tls_verify: non_empty(constants::ENV_TLS_VERIFY).is_some(),
        }
    }

    /// Sets the engine endpoint.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Pins the API version instead of negotiating it.
    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Dials TCP hosts over TLS using the certificates in `dir`.
    #[must_use]
    pub fn tls(mut self, dir: impl Into<PathBuf>, verify: bool) -> Self {
        self.cert_path = Some(dir.into());
        self.tls_verify = verify;
        self
    }

    /// Sets the per-connection dial timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_points_at_local_engine() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.host, "unix:///var/run/docker.sock");
        assert!(opts.api_version.is_none());
        assert!(opts.cert_path.is_none());
    }

    #[test]
    fn lookup_overrides_host_and_version() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DOCKER_HOST", "tcp://10.0.0.5:2375"),
            ("DOCKER_API_VERSION", "1.43"),
        ]);
        let opts = ConnectOptions::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(opts.host, "tcp://10.0.0.5:2375");
        assert_eq!(opts.api_version.as_deref(), Some("1.43"));
        assert!(opts.cert_path.is_none());
        assert!(!opts.tls_verify);
    }

    #[test]
    fn lookup_reads_tls_variables() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DOCKER_HOST", "tcp://10.0.0.5:2376"),
            ("DOCKER_CERT_PATH", "/home/ops/.docker"),
            ("DOCKER_TLS_VERIFY", "1"),
        ]);
        let opts = ConnectOptions::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(opts.cert_path, Some(PathBuf::from("/home/ops/.docker")));
        assert!(opts.tls_verify);
    }

    #[test]
    fn empty_variables_fall_back_to_defaults() {
        let opts = ConnectOptions::from_lookup(|_| Some("  ".to_string()));
        assert_eq!(opts, ConnectOptions::default());
    }

    #[test]
    fn builder_methods_set_fields() {
        let opts = ConnectOptions::default()
            .host("http://engine:2375")
            .api_version("1.41")
            .connect_timeout(Duration::from_secs(3))
            .tls("/etc/berth/certs", false);
        assert_eq!(opts.host, "http://engine:2375");
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(opts.cert_path, Some(PathBuf::from("/etc/berth/certs")));
        assert!(!opts.tls_verify);
        assert_eq!(opts.api_version.as_deref(), Some("1.41"));
    }
}
