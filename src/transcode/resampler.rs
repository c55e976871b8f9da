//! Sample format conversion for the transcoding pipeline
//!
//! Converts decoded PCM frames to planar f32 for the Vorbis encoder. The
//! sample rate and channel layout of the source pass through unchanged.

use crate::error::{Result, TranscodeError};
use crate::ffmpeg_utils::sample_format_name;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;

use super::bridge::resolve_channel_layout;
use super::encoder::ENCODER_SAMPLE_FMT;

/// Sample format converter wrapping FFmpeg's `SwrContext`
pub struct SampleConverter {
    context: resampling::Context,
}

impl SampleConverter {
    /// Create a converter for frames shaped like `src_frame`.
    pub fn for_frame(src_frame: &ffmpeg::util::frame::Audio) -> Result<Self> {
        let layout = resolve_channel_layout(src_frame.channel_layout(), src_frame.channels() as u16)
            .map_err(|e| TranscodeError::ResampleFailed(e.to_string()))?;
        Self::new(src_frame.format(), layout, src_frame.rate())
    }

    /// Create a converter from `format` to planar f32 at `rate` / `layout`.
    pub fn new(format: ffmpeg::format::Sample, layout: ChannelLayout, rate: u32) -> Result<Self> {
        let context = resampling::Context::get(
            format,
            layout,
            rate,
            ENCODER_SAMPLE_FMT,
            layout,
            rate,
        )
        .map_err(|e| {
            TranscodeError::ResampleFailed(format!(
                "Failed to create conversion context from {}: {}",
                sample_format_name(format),
                e
            ))
        })?;

        tracing::debug!(
            from = sample_format_name(format),
            to = sample_format_name(ENCODER_SAMPLE_FMT),
            sample_rate = rate,
            "sample converter created"
        );

        Ok(Self { context })
    }

    /// Convert one decoded frame.
    ///
    /// Returns `None` when the converter buffered the input without producing
    /// output.
    pub fn convert(
        &mut self,
        frame: &ffmpeg::util::frame::Audio,
    ) -> Result<Option<ffmpeg::util::frame::Audio>> {
        // swr allocates the output buffer itself; a pre-filled frame confuses it
        let mut out = ffmpeg::util::frame::Audio::empty();

        self.context
            .run(frame, &mut out)
            .map_err(|e| TranscodeError::ResampleFailed(format!("Conversion error: {}", e)))?;

        if out.samples() == 0 {
            return Ok(None);
        }
        Ok(Some(out))
    }

    /// Drain anything still held by the converter.
    ///
    /// Format-only conversion usually buffers nothing, in which case swr
    /// reports an error on flush. That is not fatal.
    pub fn flush(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut out = ffmpeg::util::frame::Audio::empty();
        if let Err(e) = self.context.flush(&mut out) {
            tracing::debug!("Converter flush returned non-fatal error: {}", e);
            return Ok(None);
        }

        if out.samples() == 0 {
            return Ok(None);
        }
        Ok(Some(out))
    }
}
