//! Image build pipeline.
//!
//! A build archives the context directory, submits it with a fixed policy
//! (always pull, force-remove intermediates, no cache) and follows the
//! engine's JSON log until end-of-stream. Any error record fails the build.

use std::io::BufReader;
use std::path::Path;

use berth_common::error::{BerthError, BuildFailure, Result};
use berth_common::types::ImageId;
use berth_core::client::{ByteStream, CallContext, RuntimeClient};
use berth_core::options::BuildOptions;

use crate::context::archive_context;
use crate::log::BuildLogRecord;

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Tag applied to the image.
    pub tag: String,
    /// Identifier of the built image, when the engine announced it.
    pub image_id: Option<ImageId>,
    /// Number of log records consumed.
    pub records: usize,
}

/// Builds images from local context directories.
pub struct ImageBuildPipeline<'a> {
    client: &'a dyn RuntimeClient,
}

impl<'a> ImageBuildPipeline<'a> {
    /// Creates a pipeline borrowing the shared engine client.
    #[must_use]
    pub fn new(client: &'a dyn RuntimeClient) -> Self {
        Self { client }
    }

    /// Builds the context at `path` and tags the result `tag`.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Build` if the context cannot be archived, the
    /// engine rejects the request, the log carries an error record, or the
    /// log cannot be decoded.
    pub fn build(&self, ctx: &CallContext, path: &Path, tag: &str) -> Result<BuildSummary> {
        self.build_with_progress(ctx, path, tag, |_| {})
    }

    /// Like [`Self::build`], passing every decoded log record to `progress`.
    ///
    /// # Errors
    ///
    /// See [`Self::build`].
    pub fn build_with_progress<F>(
        &self,
        ctx: &CallContext,
        path: &Path,
        tag: &str,
        progress: F,
    ) -> Result<BuildSummary>
    where
        F: FnMut(&BuildLogRecord),
    {
        let build_err = |source| BerthError::Build {
            tag: tag.to_string(),
            source,
        };

        let context = archive_context(path).map_err(build_err)?;
        tracing::info!(tag = %tag, context = %path.display(), bytes = context.len(), "submitting image build");

        let body = self
            .client
            .build_image(ctx, context, &BuildOptions::tagged(tag))
            .map_err(|e| build_err(BuildFailure::Submit(e)))?;

        let (records, image_id) = follow_log(body, progress).map_err(build_err)?;
        tracing::info!(tag = %tag, records, image = ?image_id, "image built");

        Ok(BuildSummary {
            tag: tag.to_string(),
            image_id,
            records,
        })
    }
}

/// Consumes the build log to end-of-stream. Owns `body`, so it is dropped
/// exactly once whichever way this returns.
fn follow_log<F>(
    body: ByteStream,
    mut progress: F,
) -> std::result::Result<(usize, Option<ImageId>), BuildFailure>
where
    F: FnMut(&BuildLogRecord),
{
    let mut records = 0;
    let mut image_id = None;
    let stream = serde_json::Deserializer::from_reader(BufReader::new(body))
        .into_iter::<BuildLogRecord>();
    for record in stream {
        let record = record.map_err(BuildFailure::Decode)?;
        records += 1;
        progress(&record);
        if let Some((message, code)) = record.failure() {
            tracing::warn!(error = %message, code = ?code, "build log reported an error");
            return Err(BuildFailure::Stream { message, code });
        }
        if let Some(line) = record.stream.as_deref() {
            tracing::debug!(line = %line.trim_end(), "build");
        }
        if let Some(id) = record.image_id() {
            image_id = Some(ImageId::new(id));
        }
    }
    Ok((records, image_id))
}

#[cfg(test)]
mod tests {
    use berth_core::testing::FakeEngine;

    use super::*;

    const STEPS: [&str; 4] = [
        r#"{"stream":"Step 1/2 : FROM alpine\n"}"#,
        r#"{"status":"Pulling from library/alpine","id":"latest"}"#,
        r#"{"stream":"Step 2/2 : RUN true\n"}"#,
        r#"{"aux":{"ID":"sha256:feed"}}"#,
    ];
    const FAILURE: &str = r#"{"errorDetail":{"code":1,"message":"RUN failed"},"error":"RUN failed"}"#;

    fn context() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\nRUN true\n").expect("write");
        dir
    }

    #[test]
    fn clean_log_is_success() {
        let engine = FakeEngine::with_chunk_size(7);
        engine.script_build(&STEPS);
        let dir = context();

        let summary = ImageBuildPipeline::new(&engine)
            .build(&CallContext::background(), dir.path(), "app:1")
            .expect("build");
        assert_eq!(summary.tag, "app:1");
        assert_eq!(summary.records, 4);
        assert_eq!(summary.image_id, Some(ImageId::new("sha256:feed")));
        assert!(engine.has_image("app:1"));
        assert_eq!(engine.stream_drops(), 1);
    }

    /// Reader that counts how often it is asked for bytes.
    struct CountingReader {
        inner: std::io::Cursor<Vec<u8>>,
        reads: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl std::io::Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self
                .reads
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    #[test]
    fn log_is_read_in_blocks() {
        let reads = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let log = STEPS.join("\n").into_bytes();
        let body = Box::new(CountingReader {
            inner: std::io::Cursor::new(log.clone()),
            reads: std::sync::Arc::clone(&reads),
        });

        let (records, image_id) = follow_log(body, |_| {}).expect("clean log");
        assert_eq!(records, 4);
        assert_eq!(image_id, Some(ImageId::new("sha256:feed")));
        let calls = reads.load(std::sync::atomic::Ordering::SeqCst);
        assert!(calls < log.len() / 10, "{calls} reads for {} bytes", log.len());
    }

    #[test]
    fn build_uses_fixed_policy() {
        let engine = FakeEngine::new();
        engine.script_build(&STEPS);
        let dir = context();

        let _ = ImageBuildPipeline::new(&engine)
            .build(&CallContext::background(), dir.path(), "app:1")
            .expect("build");
        let call = engine
            .calls()
            .into_iter()
            .find(|c| c.starts_with("build"))
            .expect("build call");
        assert!(call.contains("app:1 pull=true forcerm=true nocache=true"));
    }

    #[test]
    fn error_record_anywhere_fails_build() {
        for position in 0..=STEPS.len() {
            let engine = FakeEngine::with_chunk_size(5);
            let mut lines = STEPS.to_vec();
            lines.insert(position, FAILURE);
            engine.script_build(&lines);
            let dir = context();

            let err = ImageBuildPipeline::new(&engine)
                .build(&CallContext::background(), dir.path(), "app:1")
                .unwrap_err();
            assert_eq!(err.category(), "build", "position {position}");
            assert_eq!(err.subject(), "app:1");
            assert!(err.to_string().contains("RUN failed"), "position {position}");
            assert_eq!(engine.stream_drops(), 1, "position {position}");
        }
    }

    #[test]
    fn progress_sees_records_up_to_failure() {
        let engine = FakeEngine::new();
        engine.script_build(&[STEPS[0], FAILURE, STEPS[2]]);
        let dir = context();
        let mut seen = Vec::new();

        let result = ImageBuildPipeline::new(&engine).build_with_progress(
            &CallContext::background(),
            dir.path(),
            "app:1",
            |record| seen.push(record.clone()),
        );
        assert!(result.is_err());
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn garbage_in_log_is_decode_error() {
        let engine = FakeEngine::new();
        engine.script_build(&[STEPS[0], "{not json"]);
        let dir = context();

        let err = ImageBuildPipeline::new(&engine)
            .build(&CallContext::background(), dir.path(), "app:1")
            .unwrap_err();
        assert!(matches!(
            err,
            BerthError::Build {
                source: BuildFailure::Decode(_),
                ..
            }
        ));
        assert_eq!(engine.stream_drops(), 1);
    }

    #[test]
    fn missing_dockerfile_never_reaches_engine() {
        let engine = FakeEngine::new();
        let dir = tempfile::tempdir().expect("failed to create tempdir");

        let err = ImageBuildPipeline::new(&engine)
            .build(&CallContext::background(), dir.path(), "app:1")
            .unwrap_err();
        assert!(matches!(
            err,
            BerthError::Build {
                source: BuildFailure::MissingDockerfile { .. },
                ..
            }
        ));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn rejected_submission_is_build_error() {
        let engine = FakeEngine::new();
        engine.fail_on("build", 500, "daemon out of disk");
        let dir = context();

        let err = ImageBuildPipeline::new(&engine)
            .build(&CallContext::background(), dir.path(), "app:1")
            .unwrap_err();
        assert!(err.to_string().contains("build request rejected"));
        assert_eq!(engine.stream_drops(), 0);
    }
}
