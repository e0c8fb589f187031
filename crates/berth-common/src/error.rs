//! Unified error types for the Berth workspace.
//!
//! Two layers exist. [`EngineError`] is what a runtime client reports for a
//! single engine call. [`BerthError`] is what the lifecycle
//! components hand back to callers: every variant carries a stable category
//! label and the identifier of the container or image involved.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single call against the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be reached or the handshake failed.
    #[error("engine unreachable at {endpoint}: {message}")]
    Unreachable {
        /// Endpoint that was dialed.
        endpoint: String,
        /// Description of the failure.
        message: String,
    },

    /// The engine answered with a non-success status.
    #[error("engine returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the engine's error body.
        message: String,
    },

    /// Reading or writing the underlying connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The engine sent a body that could not be decoded.
    #[error("malformed engine response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The caller's deadline passed before the call completed.
    #[error("call deadline exceeded")]
    DeadlineExceeded,

    /// The requested operation or endpoint form is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl EngineError {
    /// Returns `true` if the engine reported that the target does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Returns `true` if the engine reported a conflict (name collision,
    /// container already in the requested state).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }
}

/// Lifecycle operation that was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOp {
    /// Container creation.
    Create,
    /// Container start.
    Start,
    /// Graceful stop.
    Stop,
    /// Forced removal.
    Purge,
    /// Container listing.
    List,
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Purge => write!(f, "purge"),
            Self::List => write!(f, "list"),
        }
    }
}

/// Why an image build failed.
#[derive(Debug, Error)]
pub enum BuildFailure {
    /// The build context has no `Dockerfile` at its root.
    #[error("no Dockerfile at the root of build context {path}")]
    MissingDockerfile {
        /// Context directory.
        path: PathBuf,
    },

    /// The build context could not be archived.
    #[error("failed to archive build context {path}: {source}")]
    Context {
        /// Context directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The engine rejected the build request.
    #[error("build request rejected: {0}")]
    Submit(#[source] EngineError),

    /// The build log carried an error record.
    #[error("engine reported build error: {message}")]
    Stream {
        /// Error text from the record.
        message: String,
        /// Error code from `errorDetail`, when present.
        code: Option<i64>,
    },

    /// The build log could not be decoded.
    #[error("failed to decode build log: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Why a health probe could not observe a status.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// Inspecting the container failed.
    #[error("inspection failed: {0}")]
    Inspect(#[source] EngineError),

    /// The container has no healthcheck configured.
    #[error("container has no healthcheck")]
    NotConfigured,

    /// The engine reported a status outside starting/healthy/unhealthy.
    #[error("unrecognised health status {0:?}")]
    UnknownStatus(String),
}

/// Failure while decoding a multiplexed exec stream.
#[derive(Debug, Error)]
pub enum DemuxError {
    /// Reading from the stream failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// A frame header carried an unknown stream tag.
    #[error("unknown stream tag {0}")]
    UnknownStream(u8),

    /// The engine injected a system-error frame.
    #[error("engine error frame: {0}")]
    System(String),

    /// The stream ended part-way through a frame.
    #[error("stream ended mid-frame with {missing} bytes outstanding")]
    Truncated {
        /// Bytes still expected when the stream closed.
        missing: usize,
    },
}

/// Why a command execution failed.
#[derive(Debug, Error)]
pub enum ExecFailure {
    /// The command vector was empty.
    #[error("command is empty")]
    EmptyCommand,

    /// Creating the exec instance failed.
    #[error("failed to create exec instance: {0}")]
    Create(#[source] EngineError),

    /// Attaching to the exec instance failed.
    #[error("failed to attach to exec instance {exec_id}: {source}")]
    Attach {
        /// Exec instance identifier.
        exec_id: String,
        /// Underlying engine error.
        source: EngineError,
    },

    /// Demultiplexing the output stream failed.
    #[error("failed to read exec output: {0}")]
    Demux(#[source] DemuxError),

    /// Inspecting the exec instance after completion failed.
    #[error("failed to inspect exec instance {exec_id}: {source}")]
    Inspect {
        /// Exec instance identifier.
        exec_id: String,
        /// Underlying engine error.
        source: EngineError,
    },

    /// The engine reported no exit code after the stream closed.
    #[error("exec instance {exec_id} reported no exit code")]
    ExitCodeUnavailable {
        /// Exec instance identifier.
        exec_id: String,
    },

    /// The command exited with a nonzero code.
    #[error("command exited with code {code}: {stderr}")]
    NonZeroExit {
        /// Exit code reported by the engine.
        code: i64,
        /// Captured standard error.
        stderr: String,
    },
}

/// Top-level error type returned by every Berth component.
#[derive(Debug, Error)]
pub enum BerthError {
    /// The engine could not be reached; never retried.
    #[error("[connection] {endpoint}: {source}")]
    Connection {
        /// Endpoint that was dialed.
        endpoint: String,
        /// Underlying engine error.
        source: EngineError,
    },

    /// Building an image failed.
    #[error("[build] image {tag}: {source}")]
    Build {
        /// Tag the build was targeting.
        tag: String,
        /// What went wrong.
        source: BuildFailure,
    },

    /// The engine rejected a lifecycle operation.
    #[error("[lifecycle] {op} container {id}: {source}")]
    Lifecycle {
        /// Rejected operation.
        op: LifecycleOp,
        /// Container name or identifier.
        id: String,
        /// Underlying engine error.
        source: EngineError,
    },

    /// A health probe did not observe a status.
    #[error("[health] container {id}: {source}")]
    HealthProbe {
        /// Container identifier.
        id: String,
        /// What went wrong.
        source: ProbeFailure,
    },

    /// Running a command inside a container failed.
    #[error("[exec] container {id}: {source}")]
    Exec {
        /// Container identifier.
        id: String,
        /// What went wrong.
        source: ExecFailure,
    },

    /// Removing or pruning images failed.
    #[error("[image-gc] image {image}: {source}")]
    ImageGc {
        /// Image name, or `<dangling>` for a prune.
        image: String,
        /// Underlying engine error.
        source: EngineError,
    },

    /// A configuration value is invalid.
    #[error("[config] {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl BerthError {
    /// Returns the stable category label of this error.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Build { .. } => "build",
            Self::Lifecycle { .. } => "lifecycle",
            Self::HealthProbe { .. } => "health",
            Self::Exec { .. } => "exec",
            Self::ImageGc { .. } => "image-gc",
            Self::Config { .. } => "config",
        }
    }

    /// Returns the container, image, or endpoint this error concerns.
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::Connection { endpoint, .. } => endpoint,
            Self::Build { tag, .. } => tag,
            Self::Lifecycle { id, .. } | Self::HealthProbe { id, .. } | Self::Exec { id, .. } => id,
            Self::ImageGc { image, .. } => image,
            Self::Config { .. } => "",
        }
    }

    /// Returns the exit code if this is a nonzero-exit exec failure.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i64> {
        match self {
            Self::Exec {
                source: ExecFailure::NonZeroExit { code, .. },
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BerthError>;
