//! FFmpeg module - provides wrappers and utilities for FFmpeg library access
//!
//! This module handles:
//! - FFmpeg initialization and log routing
//! - Safe wrappers for raw context fields `ffmpeg-next` does not expose
//! - Timebase conversion and other utilities

pub mod helpers;
pub mod utils;

pub use ffmpeg_next as ffmpeg;
#[allow(unused_imports)]
pub use utils::*;

/// Initialize the FFmpeg library.
///
/// Call once before the first conversion. Calling it again is harmless.
/// Returns an error if the underlying C library fails to initialize.
pub fn init() -> Result<(), crate::error::TranscodeError> {
    ffmpeg::init().map_err(|e| {
        crate::error::TranscodeError::Config(format!("ffmpeg::init() failed: {}", e))
    })?;

    tracing::debug!("FFmpeg initialized");

    Ok(())
}

/// Install a custom FFmpeg log callback that suppresses known-noisy messages.
///
/// Decoding MP3 files with ID3 tags and encoding with the native Vorbis
/// encoder both produce warnings that are expected and harmless for this
/// pipeline. This function filters them out so they don't pollute the
/// application log.
///
/// **Safety & Ordering:** Must be called after `init()` and before any threading begins,
/// because altering the global log callback is not thread-safe.
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state and are safe to call
    // after `ffmpeg::init()`.  They are called exactly once at startup before
    // any conversion threads start.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that are expected side-effects of transcoding and should be suppressed.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Estimating duration from bitrate, this may be inaccurate",
    "Skipping 0 bytes of junk",
    "Could not update timestamps for skipped samples",
    "Could not update timestamps for discarded samples",
    "Queue input is backward in time",
];

/// Whether a formatted FFmpeg log line should be dropped.
pub(crate) fn is_suppressed(msg: &str) -> bool {
    SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s))
}

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    // Respect the configured log level
    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    // Format the message using FFmpeg's own vsnprintf helper
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
    if is_suppressed(&msg) {
        return;
    }

    let msg = msg.trim_end();
    if level <= ffmpeg_next::ffi::AV_LOG_ERROR as std::ffi::c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    }
}

/// Get the version information of the linked FFmpeg libraries.
/// Useful for debugging and reporting environment consistency.
pub fn version_info() -> String {
    let version = unsafe { ffmpeg_next::ffi::avformat_version() };
    format!(
        "libavformat {}.{}.{}",
        version >> 16,
        (version >> 8) & 0xff,
        version & 0xff
    )
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
    fn test_suppressed_messages() {
        assert!(is_suppressed(
            "[mp3 @ 0x55] Estimating duration from bitrate, this may be inaccurate\n"
        ));
        assert!(!is_suppressed("[ogg @ 0x55] Broken file\n"));
    }

    #[test]
    fn test_version_info() {
        assert!(version_info().starts_with("libavformat "));
    }
}
