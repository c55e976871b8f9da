//! Audio transcoder: converts the first audio stream of any container FFmpeg
//! can read into an OGG/Vorbis file.

pub(crate) mod api;
pub mod config;
pub mod error;
pub mod ffi;
pub mod ffmpeg_utils;
pub mod guard;
pub mod sink;
pub mod source;
pub mod transcode;

#[cfg(test)]
pub(crate) mod tests;

pub use api::*;
pub use config::{LogFormat, SampleFormatPolicy, TranscodeConfig};
pub use error::{ErrorStage, Result, TranscodeError};
pub use ffmpeg_utils::version_info as ffmpeg_version_info;
pub use ffmpeg_utils::{init, install_log_filter};
pub use guard::{Ledger, ResourceKind};
