//! Engine endpoint parsing.

use std::fmt;
use std::path::{Path, PathBuf};

use berth_common::error::EngineError;

/// Authority used in request URLs sent over a Unix socket. The engine
/// ignores it; it only has to form a valid URL.
const SOCKET_AUTHORITY: &str = "http://localhost";

/// Where the engine listens and how to address it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    socket: Option<PathBuf>,
}

impl Endpoint {
    /// Parses an engine host.
    ///
    /// `unix:///path` dials the socket at `path`. `tcp://` and bare
    /// `host:port` map to `http://`, or to `https://` when `tls` is set;
    /// `http://` and `https://` are kept.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unsupported` for `npipe://` and other schemes,
    /// for a relative socket path, or for an empty host.
    pub fn parse(host: &str, tls: bool) -> Result<Self, EngineError> {
        let host = host.trim();
        if let Some(path) = host.strip_prefix("unix://") {
            return Self::unix(path);
        }
        let host = host.trim_end_matches('/');
        let plain = if tls { "https" } else { "http" };
        let (scheme, rest) = match host.split_once("://") {
            Some(("tcp", rest)) => (plain, rest),
            Some(("http", rest)) => ("http", rest),
            Some(("https", rest)) => ("https", rest),
            Some((other, _)) => {
                return Err(EngineError::Unsupported(format!(
                    "engine host scheme {other}:// (use unix://, tcp://, http:// or https://)"
                )));
            }
            None => (plain, host),
        };
        if rest.is_empty() {
            return Err(EngineError::Unsupported(format!(
                "engine host {host:?} has no address"
            )));
        }
        Ok(Self {
            base: format!("{scheme}://{rest}"),
            socket: None,
        })
    }

    #[cfg(unix)]
    fn unix(path: &str) -> Result<Self, EngineError> {
        let socket = PathBuf::from(path);
        if !socket.is_absolute() {
            return Err(EngineError::Unsupported(format!(
                "engine socket path {path:?} must be absolute"
            )));
        }
        Ok(Self {
            base: SOCKET_AUTHORITY.to_string(),
            socket: Some(socket),
        })
    }

    #[cfg(not(unix))]
    fn unix(path: &str) -> Result<Self, EngineError> {
        Err(EngineError::Unsupported(format!(
            "unix socket {path} on a platform without unix sockets"
        )))
    }

    /// URL prefix for requests, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Socket to dial instead of TCP, if any.
    #[must_use]
    pub fn socket(&self) -> Option<&Path> {
        self.socket.as_deref()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.socket {
            Some(path) => write!(f, "unix://{}", path.display()),
            None => f.write_str(&self.base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(host: &str) -> String {
        Endpoint::parse(host, false).unwrap().base_url().to_string()
    }

    #[test]
    fn tcp_maps_to_http() {
        assert_eq!(base("tcp://127.0.0.1:2375"), "http://127.0.0.1:2375");
    }

    #[test]
    fn tcp_maps_to_https_with_tls() {
        let endpoint = Endpoint::parse("tcp://10.0.0.5:2376", true).unwrap();
        assert_eq!(endpoint.base_url(), "https://10.0.0.5:2376");
        assert!(endpoint.socket().is_none());
    }

    #[test]
    fn http_and_https_are_kept() {
        assert_eq!(base("http://engine:2375/"), "http://engine:2375");
        assert_eq!(base("https://engine:2376"), "https://engine:2376");
        let explicit = Endpoint::parse("http://engine:2375", true).unwrap();
        assert_eq!(explicit.base_url(), "http://engine:2375");
    }

    #[test]
    fn bare_address_defaults_to_http() {
        assert_eq!(base("localhost:2375"), "http://localhost:2375");
    }

    #[cfg(unix)]
    #[test]
    fn unix_socket_dials_the_path() {
        let endpoint = Endpoint::parse("unix:///var/run/docker.sock", false).unwrap();
        assert_eq!(endpoint.socket(), Some(Path::new("/var/run/docker.sock")));
        assert_eq!(endpoint.base_url(), "http://localhost");
        assert_eq!(endpoint.to_string(), "unix:///var/run/docker.sock");
    }

    #[cfg(unix)]
    #[test]
    fn relative_socket_path_is_rejected() {
        let err = Endpoint::parse("unix://docker.sock", false).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }

    #[test]
    fn named_pipe_is_unsupported() {
        let err = Endpoint::parse("npipe:////./pipe/docker_engine", false).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }

    #[test]
    fn empty_address_is_rejected() {
        assert!(Endpoint::parse("tcp://", false).is_err());
        assert!(Endpoint::parse("", false).is_err());
    }
}
