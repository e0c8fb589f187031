//! Typed option records, one per engine operation.
//!
//! Each record's `Default` is the policy the Berth components use, so a
//! component call and a bare `Default::default()` agree.

use std::collections::BTreeMap;
use std::time::Duration;

use berth_common::constants;
use serde::{Deserialize, Serialize};

/// Options for listing containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Include stopped containers.
    pub all: bool,
    /// Engine-side filters, e.g. `name` → `["web"]`.
    pub filters: BTreeMap<String, Vec<String>>,
}

/// Options for stopping a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOptions {
    /// Signal sent to the container's main process.
    pub signal: String,
    /// Grace period before the engine kills the container. `None` leaves
    /// the engine's own default in force.
    pub grace_period: Option<Duration>,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            signal: constants::DEFAULT_STOP_SIGNAL.to_string(),
            grace_period: None,
        }
    }
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOptions {
    /// Kill the container first if it is running.
    pub force: bool,
    /// Remove anonymous volumes attached to the container.
    pub remove_volumes: bool,
    /// Remove the container's links instead of the container itself.
    pub remove_links: bool,
}

impl Default for RemoveOptions {
    /// Forced removal with anonymous volumes, links preserved.
    fn default() -> Self {
        Self {
            force: true,
            remove_volumes: true,
            remove_links: false,
        }
    }
}

/// Options for creating an exec instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCreateOptions {
    /// Command and arguments.
    pub command: Vec<String>,
    /// Attach standard output.
    pub attach_stdout: bool,
    /// Attach standard error.
    pub attach_stderr: bool,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory override.
    pub working_dir: Option<String>,
    /// User override.
    pub user: Option<String>,
}

impl ExecCreateOptions {
    /// Runs `command` with both output streams attached.
    #[must_use]
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            attach_stdout: true,
            attach_stderr: true,
            env: Vec::new(),
            working_dir: None,
            user: None,
        }
    }
}

/// Options for building an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Tags applied to the resulting image.
    pub tags: Vec<String>,
    /// Dockerfile path inside the context.
    pub dockerfile: String,
    /// Always pull the newest base image.
    pub pull: bool,
    /// Always remove intermediate containers, even on failure.
    pub force_rm: bool,
    /// Disable the layer cache.
    pub no_cache: bool,
    /// Suppress verbose build output.
    pub quiet: bool,
    /// Build-time variables.
    pub build_args: BTreeMap<String, String>,
}

impl Default for BuildOptions {
    /// Fresh-pull, no-cache, force-remove policy with the root `Dockerfile`.
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            dockerfile: constants::DOCKERFILE_NAME.to_string(),
            pull: true,
            force_rm: true,
            no_cache: true,
            quiet: false,
            build_args: BTreeMap::new(),
        }
    }
}

impl BuildOptions {
    /// The default policy tagging the image with `tag`.
    #[must_use]
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tags: vec![tag.into()],
            ..Self::default()
        }
    }
}

/// Options for removing an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRemoveOptions {
    /// Remove even if tagged in several repositories or used by stopped
    /// containers.
    pub force: bool,
    /// Delete untagged parent images.
    pub prune_children: bool,
}

impl Default for ImageRemoveOptions {
    fn default() -> Self {
        Self {
            force: true,
            prune_children: true,
        }
    }
}

/// Filters for pruning images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneFilters {
    /// Engine filter map, e.g. `dangling` → `["true"]`.
    pub filters: BTreeMap<String, Vec<String>>,
}

impl PruneFilters {
    /// Selects untagged images no container references.
    #[must_use]
    pub fn dangling() -> Self {
        let mut filters = BTreeMap::new();
        let _ = filters.insert(
            constants::DANGLING_FILTER.to_string(),
            vec!["true".to_string()],
        );
        Self { filters }
    }

    /// Returns `true` if the filters restrict pruning to dangling images.
    #[must_use]
    pub fn is_dangling_only(&self) -> bool {
        self.filters
            .get(constants::DANGLING_FILTER)
            .is_some_and(|v| v.iter().any(|s| s == "true" || s == "1"))
    }
}

impl Default for PruneFilters {
    fn default() -> Self {
        Self::dangling()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_defaults_to_sigterm_with_engine_grace() {
        let opts = StopOptions::default();
        assert_eq!(opts.signal, "SIGTERM");
        assert!(opts.grace_period.is_none());
    }

    #[test]
    fn remove_defaults_force_volumes_and_keep_links() {
        let opts = RemoveOptions::default();
        assert!(opts.force);
        assert!(opts.remove_volumes);
        assert!(!opts.remove_links);
    }

    #[test]
    fn build_defaults_follow_fresh_build_policy() {
        let opts = BuildOptions::tagged("app:latest");
        assert_eq!(opts.tags, vec!["app:latest"]);
        assert_eq!(opts.dockerfile, "Dockerfile");
        assert!(opts.pull && opts.force_rm && opts.no_cache);
        assert!(!opts.quiet);
    }

    #[test]
    fn exec_options_attach_both_streams() {
        let opts = ExecCreateOptions::new(vec!["ls".into()]);
        assert!(opts.attach_stdout && opts.attach_stderr);
    }

    #[test]
    fn default_prune_filters_are_dangling_only() {
        assert!(PruneFilters::default().is_dangling_only());
        let all = PruneFilters {
            filters: BTreeMap::new(),
        };
        assert!(!all.is_dangling_only());
    }
}
