//! FFmpeg module - process-wide setup of the FFmpeg libraries
//!
//! This module handles:
//! - FFmpeg initialization (once per process)
//! - Routing FFmpeg's log output through `tracing`

use std::sync::OnceLock;

pub use ffmpeg_next as ffmpeg;

use crate::error::FfmpegError;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize FFmpeg library
///
/// Safe to call from every conversion; the underlying initialisation runs once.
pub fn init() -> Result<(), FfmpegError> {
    INIT.get_or_init(|| {
        ffmpeg::init().map_err(|e| format!("ffmpeg::init() failed: {}", e))?;
        tracing::info!("FFmpeg initialized");
        Ok(())
    })
    .clone()
    .map_err(FfmpegError::InitFailed)
}

/// Install a custom FFmpeg log callback that forwards to `tracing` and drops
/// known-noisy encoder messages.
///
/// Must be called after `init()` and before any conversion threads start,
/// because altering the global log callback is not thread-safe.
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state and are called once at
    // startup, before conversions run.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages the AAC encoder and resampler emit on every short recording.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Trying to remove",
    "Qavg:",
    "Using a PCE to encode channel layout",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    let msg = msg.trim_end();
    if msg.is_empty() || SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s)) {
        return;
    }

    if level <= ffmpeg_next::ffi::AV_LOG_ERROR as std::ffi::c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    }
}

/// Get FFmpeg version information
pub fn version_info() -> String {
    let v = ffmpeg::util::version();
    format!("libavutil {}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_version_info_format() {
        assert!(version_info().starts_with("libavutil "));
    }
}
