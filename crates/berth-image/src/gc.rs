//! Image garbage collection.
//!
//! Deletion is idempotent: an image that cannot be inspected is treated as
//! absent, so deleting it again is a successful no-op.

use berth_common::constants::DANGLING_FILTER;
use berth_common::error::{BerthError, Result};
use berth_core::client::{CallContext, RuntimeClient};
use berth_core::models::{ImageDeleteItem, PruneReport};
use berth_core::options::{ImageRemoveOptions, PruneFilters};

/// Outcome of [`ImageGc::delete_image`].
///
/// `existed` is reported truthfully even when removal fails.
#[derive(Debug)]
pub struct ImageDeletion {
    /// Whether the image was present before the call.
    pub existed: bool,
    /// Tags removed and layers deleted by the engine.
    pub removed: Vec<ImageDeleteItem>,
    /// Why removal failed, if it did.
    pub error: Option<BerthError>,
}

impl ImageDeletion {
    /// Converts the outcome into `existed`, or the removal error.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::ImageGc` if the image existed but could not be
    /// removed.
    pub fn into_result(self) -> Result<bool> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.existed),
        }
    }
}

/// Removes images from the engine's store.
pub struct ImageGc<'a> {
    client: &'a dyn RuntimeClient,
}

impl<'a> ImageGc<'a> {
    /// Creates a collector borrowing the shared engine client.
    #[must_use]
    pub fn new(client: &'a dyn RuntimeClient) -> Self {
        Self { client }
    }

    /// Deletes the image called `name` (a tag or an ID), forcing removal and
    /// pruning untagged parents.
    #[must_use]
    pub fn delete_image(&self, ctx: &CallContext, name: &str) -> ImageDeletion {
        let inspect = match self.client.inspect_image(ctx, name) {
            Ok(inspect) => inspect,
            Err(e) => {
                tracing::debug!(image = %name, error = %e, "image lookup failed, treating as absent");
                return ImageDeletion {
                    existed: false,
                    removed: Vec::new(),
                    error: None,
                };
            }
        };

        match self
            .client
            .remove_image(ctx, &inspect.id, &ImageRemoveOptions::default())
        {
            Ok(removed) => {
                tracing::info!(image = %name, id = %inspect.id, items = removed.len(), "image deleted");
                ImageDeletion {
                    existed: true,
                    removed,
                    error: None,
                }
            }
            Err(source) => {
                tracing::warn!(image = %name, id = %inspect.id, error = %source, "image removal failed");
                ImageDeletion {
                    existed: true,
                    removed: Vec::new(),
                    error: Some(BerthError::ImageGc {
                        image: name.to_string(),
                        source,
                    }),
                }
            }
        }
    }

    /// Removes every untagged, unreferenced image. Nothing to prune is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::ImageGc` if the engine rejects the prune.
    pub fn prune_dangling_images(&self, ctx: &CallContext) -> Result<PruneReport> {
        let report = self
            .client
            .prune_images(ctx, &PruneFilters::dangling())
            .map_err(|source| BerthError::ImageGc {
                image: format!("<{DANGLING_FILTER}>"),
                source,
            })?;
        tracing::info!(
            removed = report.images_deleted.len(),
            reclaimed = report.space_reclaimed,
            "dangling images pruned"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use berth_core::testing::FakeEngine;

    use super::*;

    #[test]
    fn delete_is_idempotent() {
        let engine = FakeEngine::new();
        let _ = engine.add_image(Some("app:1"), 10);
        let gc = ImageGc::new(&engine);
        let ctx = CallContext::background();

        assert!(gc.delete_image(&ctx, "app:1").into_result().expect("first"));
        assert!(!gc.delete_image(&ctx, "app:1").into_result().expect("second"));
        assert_eq!(engine.image_count(), 0);
    }

    #[test]
    fn delete_removes_by_resolved_id_with_force_and_prune() {
        let engine = FakeEngine::new();
        let id = engine.add_image(Some("app:1"), 10);

        let outcome = ImageGc::new(&engine).delete_image(&CallContext::background(), "app:1");
        assert!(outcome.existed);
        assert!(outcome.removed.contains(&ImageDeleteItem::Untagged("app:1".into())));
        assert!(outcome.removed.contains(&ImageDeleteItem::Deleted(id.clone())));
        assert!(
            engine
                .calls()
                .contains(&format!("remove_image {id} force=true noprune=false"))
        );
    }

    #[test]
    fn removal_failure_still_reports_existence() {
        let engine = FakeEngine::new();
        let _ = engine.add_image(Some("app:1"), 10);
        engine.fail_on("remove_image", 409, "image is being used by running container");

        let outcome = ImageGc::new(&engine).delete_image(&CallContext::background(), "app:1");
        assert!(outcome.existed);
        let err = outcome.error.expect("removal error");
        assert_eq!(err.category(), "image-gc");
        assert_eq!(err.subject(), "app:1");
        assert!(engine.has_image("app:1"));
    }

    #[test]
    fn lookup_failure_counts_as_absent() {
        let engine = FakeEngine::new();
        let _ = engine.add_image(Some("app:1"), 10);
        engine.fail_on("inspect_image", 500, "daemon busy");

        let outcome = ImageGc::new(&engine).delete_image(&CallContext::background(), "app:1");
        assert!(!outcome.existed);
        assert!(outcome.error.is_none());
        assert!(!engine.calls().iter().any(|c| c.starts_with("remove_image")));
    }

    #[test]
    fn prune_with_nothing_dangling_is_empty_report() {
        let engine = FakeEngine::new();
        let _ = engine.add_image(Some("app:1"), 10);

        let report = ImageGc::new(&engine)
            .prune_dangling_images(&CallContext::background())
            .expect("prune");
        assert!(report.is_empty());
        assert_eq!(report.space_reclaimed, 0);
        assert!(report.images_deleted.is_empty());
    }

    #[test]
    fn prune_removes_only_dangling() {
        let engine = FakeEngine::new();
        let _ = engine.add_image(Some("app:1"), 10);
        let a = engine.add_image(None, 30);
        let b = engine.add_image(None, 12);

        let report = ImageGc::new(&engine)
            .prune_dangling_images(&CallContext::background())
            .expect("prune");
        assert_eq!(report.space_reclaimed, 42);
        assert_eq!(report.images_deleted, vec![a, b]);
        assert_eq!(engine.image_count(), 1);
    }

    #[test]
    fn rejected_prune_is_error() {
        let engine = FakeEngine::new();
        engine.fail_on("prune", 409, "a prune operation is already running");
        let err = ImageGc::new(&engine)
            .prune_dangling_images(&CallContext::background())
            .unwrap_err();
        assert_eq!(err.subject(), "<dangling>");
    }
}
