//! Transcoder configuration
//!
//! The output container (OGG) and codec (Vorbis) are fixed. Configuration
//! only covers how the pipeline treats its input and how the demo binary logs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Output container short name passed to the muxer
pub const OUTPUT_FORMAT: &str = "ogg";

/// What to do when the decoder's sample format differs from the encoder's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormatPolicy {
    /// Convert samples to planar f32 at the source rate and channel layout
    #[default]
    Convert,
    /// Fail with `SampleFormatMismatch`
    Reject,
}

/// Log output format for the demo binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Transcoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Send end-of-stream to the decoder and drain its buffered frames before
    /// flushing the encoder
    pub flush_decoder: bool,

    /// Handling of decoded samples that are not planar f32
    pub sample_format_policy: SampleFormatPolicy,

    /// Encoder bit rate in bps; `None` propagates the input stream's bit rate
    pub bit_rate_override: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            flush_decoder: true,
            sample_format_policy: SampleFormatPolicy::Convert,
            bit_rate_override: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl TranscodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: TranscodeConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `tracing` filter directive for this crate
    pub fn log_filter(&self) -> String {
        format!("ogg_transcode={},ffmpeg={}", self.log_level, self.log_level)
    }
}
