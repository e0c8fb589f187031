//! Engine-neutral response records.

use berth_common::types::{ContainerId, ContainerState, ImageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Container identifier.
    pub id: ContainerId,
    /// Names, without the engine's leading slash.
    pub names: Vec<String>,
    /// Image the container was created from.
    pub image: String,
    /// Lifecycle state, `None` if the engine reported an unknown one.
    pub state: Option<ContainerState>,
    /// Human-readable status, e.g. `Up 3 minutes (healthy)`.
    pub status: String,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
}

/// Response to a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedContainer {
    /// Identifier of the new container.
    pub id: ContainerId,
    /// Non-fatal warnings raised by the engine.
    pub warnings: Vec<String>,
}

/// Healthcheck state of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    /// Status string exactly as the engine reported it.
    pub status: String,
    /// Consecutive failed probes.
    pub failing_streak: u32,
}

/// Runtime state of an inspected container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStateInfo {
    /// Lifecycle state, `None` if the engine reported an unknown one.
    pub status: Option<ContainerState>,
    /// Whether the main process is running.
    pub running: bool,
    /// Exit code of the last run.
    pub exit_code: i64,
    /// Healthcheck state, absent when no healthcheck is configured.
    pub health: Option<HealthState>,
}

/// Low-level information about one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInspect {
    /// Container identifier.
    pub id: ContainerId,
    /// Container name, without the leading slash.
    pub name: String,
    /// Image identifier the container runs.
    pub image: String,
    /// Runtime state.
    pub state: ContainerStateInfo,
}

/// State of an exec instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecInspect {
    /// Whether the command is still running.
    pub running: bool,
    /// Exit code, once the command has finished.
    pub exit_code: Option<i64>,
}

/// Low-level information about one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInspect {
    /// Image identifier.
    pub id: ImageId,
    /// Repository tags pointing at this image.
    pub repo_tags: Vec<String>,
    /// Size in bytes.
    pub size: u64,
}

/// One line of an image removal response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageDeleteItem {
    /// A tag was removed.
    Untagged(String),
    /// An image layer was deleted.
    Deleted(ImageId),
}

/// Outcome of an image prune.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Bytes of disk space freed.
    pub space_reclaimed: u64,
    /// Images that were deleted.
    pub images_deleted: Vec<ImageId>,
}

impl PruneReport {
    /// Returns `true` if nothing was removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images_deleted.is_empty() && self.space_reclaimed == 0
    }
}
