//! Records of the engine's streamed build log.
//!
//! The engine writes one JSON object per event. Every field is optional;
//! unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// Byte progress of a pull or layer transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDetail {
    /// Bytes done.
    #[serde(default)]
    pub current: u64,
    /// Bytes expected.
    #[serde(default)]
    pub total: u64,
}

/// Structured failure attached to an error record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Engine error code, when one is given.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error text.
    #[serde(default)]
    pub message: String,
}

/// One decoded build log line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLogRecord {
    /// Free-text output of a build step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// Status line, e.g. `Downloading`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Layer or step the status applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Rendered progress bar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    /// Numeric progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_detail: Option<ProgressDetail>,
    /// Error text; its presence marks the build as failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured form of `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    /// Auxiliary payload, e.g. `{"ID": "sha256:..."}` for the built image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux: Option<serde_json::Value>,
}

impl BuildLogRecord {
    /// Returns the failure message if this is an error record.
    ///
    /// A record counts as an error if it has an `error` field or a non-empty
    /// `errorDetail.message`.
    #[must_use]
    pub fn failure(&self) -> Option<(String, Option<i64>)> {
        let code = self.error_detail.as_ref().and_then(|d| d.code);
        if let Some(message) = &self.error {
            return Some((message.clone(), code));
        }
        self.error_detail
            .as_ref()
            .filter(|d| !d.message.is_empty())
            .map(|d| (d.message.clone(), d.code))
    }

    /// Returns the image identifier announced in an `aux` record.
    #[must_use]
    pub fn image_id(&self) -> Option<&str> {
        self.aux.as_ref()?.get("ID")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_progress_record() {
        let record: BuildLogRecord = serde_json::from_str(
            r#"{"status":"Downloading","id":"a1b2","progress":"[==>  ]","progressDetail":{"current":10,"total":40}}"#,
        )
        .expect("decode");
        assert_eq!(record.status.as_deref(), Some("Downloading"));
        assert_eq!(
            record.progress_detail,
            Some(ProgressDetail {
                current: 10,
                total: 40
            })
        );
        assert!(record.failure().is_none());
    }

    #[test]
    fn empty_progress_detail_is_accepted() {
        let record: BuildLogRecord =
            serde_json::from_str(r#"{"status":"Pulling fs layer","progressDetail":{}}"#)
                .expect("decode");
        assert_eq!(record.progress_detail, Some(ProgressDetail::default()));
    }

    #[test]
    fn error_record_is_a_failure() {
        let record: BuildLogRecord = serde_json::from_str(
            r#"{"errorDetail":{"code":1,"message":"RUN exited 1"},"error":"RUN exited 1"}"#,
        )
        .expect("decode");
        assert_eq!(record.failure(), Some(("RUN exited 1".to_string(), Some(1))));
    }

    #[test]
    fn error_detail_alone_is_a_failure() {
        let record: BuildLogRecord =
            serde_json::from_str(r#"{"errorDetail":{"message":"no space left"}}"#).expect("decode");
        assert_eq!(record.failure(), Some(("no space left".to_string(), None)));
    }

    #[test]
    fn aux_carries_image_id() {
        let record: BuildLogRecord =
            serde_json::from_str(r#"{"aux":{"ID":"sha256:abc"}}"#).expect("decode");
        assert_eq!(record.image_id(), Some("sha256:abc"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let record: BuildLogRecord =
            serde_json::from_str(r#"{"stream":"Step 1/2\n","extra":true}"#).expect("decode");
        assert_eq!(record.stream.as_deref(), Some("Step 1/2\n"));
    }
}
