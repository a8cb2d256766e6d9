use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for a WAV to M4A conversion
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("Malformed WAV header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("Muxing error: {0}")]
    Muxing(String),

    #[error("MP4 writer error: {0}")]
    Mp4(#[from] mp4::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to configure encoder: {0}")]
    EncoderConfigure(String),

    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    #[error("Failed to convert samples: {0}")]
    Resample(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),
}

/// Failure classification surfaced to callers of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InputNotFound,
    MalformedHeader,
    UnsupportedFormat,
    EncoderUnavailable,
    EncodeFailure,
    MuxError,
    #[serde(rename = "IOError")]
    IoError,
    InvalidArgument,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InputNotFound => "InputNotFound",
            ErrorKind::MalformedHeader => "MalformedHeader",
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::EncoderUnavailable => "EncoderUnavailable",
            ErrorKind::EncodeFailure => "EncodeFailure",
            ErrorKind::MuxError => "MuxError",
            ErrorKind::IoError => "IOError",
            ErrorKind::InvalidArgument => "InvalidArgument",
        };
        f.write_str(name)
    }
}

impl TranscodeError {
    /// The taxonomy bucket this error is reported under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscodeError::InputNotFound(_) => ErrorKind::InputNotFound,
            TranscodeError::MalformedHeader(_) => ErrorKind::MalformedHeader,
            TranscodeError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            TranscodeError::EncoderUnavailable(_) => ErrorKind::EncoderUnavailable,
            TranscodeError::EncodeFailure(_) => ErrorKind::EncodeFailure,
            TranscodeError::Ffmpeg(e) => match e {
                FfmpegError::InitFailed(_)
                | FfmpegError::EncoderConfigure(_)
                | FfmpegError::ResamplerCreate(_) => ErrorKind::EncoderUnavailable,
                FfmpegError::Resample(_) | FfmpegError::EncodeFrame(_) => {
                    ErrorKind::EncodeFailure
                }
            },
            TranscodeError::Muxing(_) | TranscodeError::Mp4(_) => ErrorKind::MuxError,
            TranscodeError::Io(_) => ErrorKind::IoError,
            TranscodeError::Config(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Structured form of this error for the call contract.
    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// A failed conversion as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TranscodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_errors_split_by_stage() {
        let setup: TranscodeError = FfmpegError::EncoderConfigure("aac".into()).into();
        assert_eq!(setup.kind(), ErrorKind::EncoderUnavailable);

        let runtime: TranscodeError = FfmpegError::EncodeFrame("EINVAL".into()).into();
        assert_eq!(runtime.kind(), ErrorKind::EncodeFailure);
    }

    #[test]
    fn test_io_error_kind() {
        let err: TranscodeError = std::io::Error::other("disk full").into();
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(err.kind().to_string(), "IOError");
    }

    #[test]
    fn test_failure_carries_message() {
        let err = TranscodeError::MalformedHeader("missing RIFF signature".into());
        let failure = err.to_failure();
        assert_eq!(failure.kind, ErrorKind::MalformedHeader);
        assert!(failure.message.contains("missing RIFF signature"));
    }
}
