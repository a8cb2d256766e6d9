//! Entry points for callers
//!
//! Every call builds its own `PipelineDriver`, so concurrent conversions on
//! distinct file pairs share nothing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::TranscodeConfig;
use crate::error::{ErrorKind, Result, TranscodeError};
use crate::pipeline::{ConversionReport, PipelineDriver};

/// Convert one PCM16 WAV file into an AAC M4A file, blocking the caller.
pub fn transcode_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &TranscodeConfig,
) -> Result<ConversionReport> {
    PipelineDriver::new(config.clone()).run(input.as_ref(), output.as_ref())
}

/// `transcode_file` on tokio's blocking pool.
pub async fn transcode_file_async(
    input: impl Into<PathBuf>,
    output: impl Into<PathBuf>,
    config: TranscodeConfig,
) -> Result<ConversionReport> {
    let input = input.into();
    let output = output.into();
    tokio::task::spawn_blocking(move || transcode_file(&input, &output, &config))
        .await
        .map_err(|e| TranscodeError::EncodeFailure(format!("conversion task failed: {}", e)))?
}

/// Success flag or one failure kind with its message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            kind: None,
            message: None,
        }
    }

    pub fn failure(error: &TranscodeError) -> Self {
        let failure = error.to_failure();
        Self {
            ok: false,
            kind: Some(failure.kind),
            message: Some(failure.message),
        }
    }

    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(e) => Self::failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_shape() {
        let ok = serde_json::to_value(Outcome::success()).unwrap();
        assert_eq!(ok, serde_json::json!({ "ok": true }));

        let err = TranscodeError::MalformedHeader("missing RIFF/WAVE signature".into());
        let failed = serde_json::to_value(Outcome::from_result::<()>(&Err(err))).unwrap();
        assert_eq!(failed["ok"], false);
        assert_eq!(failed["kind"], "MalformedHeader");
        assert!(failed["message"]
            .as_str()
            .unwrap()
            .contains("missing RIFF/WAVE signature"));
    }

    #[test]
    fn test_missing_input_reports_kind() {
        let dir = tempfile::tempdir().unwrap();
        let result = transcode_file(
            dir.path().join("absent.wav"),
            dir.path().join("out.m4a"),
            &TranscodeConfig::default(),
        );
        let outcome = Outcome::from_result(&result);
        assert!(!outcome.ok);
        assert_eq!(outcome.kind, Some(ErrorKind::InputNotFound));
        assert!(!dir.path().join("out.m4a").exists());
    }

    #[tokio::test]
    async fn test_async_invalid_argument() {
        let err = transcode_file_async("", "out.m4a", TranscodeConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
