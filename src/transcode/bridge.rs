//! Codec bridge: derive the Vorbis encoder's settings from the decoder
//!
//! The encoder keeps the source's sampling characteristics (rate, channel
//! layout, bit rate). Only the sample format changes, to the planar float
//! format Vorbis requires.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

use crate::config::{SampleFormatPolicy, TranscodeConfig};
use crate::error::{Result, TranscodeError};
use crate::ffmpeg_utils::{helpers, sample_format_name};

use super::decoder::AudioDecoder;
use super::encoder::ENCODER_SAMPLE_FMT;

/// Encoder configuration computed from the decoder's negotiated parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: ChannelLayout,
    pub sample_format: Sample,
    /// 0 leaves the choice to the encoder
    pub bit_rate: u64,
    pub time_base: ffmpeg::Rational,
}

impl EncoderParams {
    /// Derive encoder parameters from an opened decoder.
    pub fn derive(decoder: &AudioDecoder, config: &TranscodeConfig) -> Result<Self> {
        let bit_rate = config
            .bit_rate_override
            .unwrap_or_else(|| source_bit_rate(decoder.codec_id(), decoder.bit_rate()));
        Self::from_source(
            decoder.sample_rate(),
            decoder.channels(),
            decoder.channel_layout(),
            bit_rate,
        )
    }

    /// Derive encoder parameters from raw source characteristics.
    pub fn from_source(
        sample_rate: u32,
        channels: u16,
        layout: ChannelLayout,
        bit_rate: u64,
    ) -> Result<Self> {
        if sample_rate == 0 || sample_rate > i32::MAX as u32 {
            return Err(TranscodeError::EncoderOpenFailed(format!(
                "invalid source sample rate {}",
                sample_rate
            )));
        }

        let channel_layout = resolve_channel_layout(layout, channels)?;

        Ok(Self {
            sample_rate,
            channels,
            channel_layout,
            sample_format: ENCODER_SAMPLE_FMT,
            bit_rate,
            time_base: ffmpeg::Rational::new(1, sample_rate as i32),
        })
    }
}

/// Bit rate to carry over from the source.
///
/// Lossless sources (PCM, FLAC, ...) report the rate of the raw signal,
/// which is far above anything Vorbis encodes to, so those map to 0 and the
/// encoder picks its default quality.
pub fn source_bit_rate(codec_id: ffmpeg::codec::Id, bit_rate: u64) -> u64 {
    if helpers::codec_is_lossless(codec_id) {
        0
    } else {
        bit_rate
    }
}

/// Pick the channel layout to hand the encoder.
///
/// Decoders for some formats (raw PCM in WAV without a channel mask, for
/// instance) report a channel count but no layout. Those get FFmpeg's default
/// layout for the count. Only native-order layouts pass through, since a
/// custom channel map is owned by the context it was read from.
pub fn resolve_channel_layout(layout: ChannelLayout, channels: u16) -> Result<ChannelLayout> {
    if channels == 0 {
        return Err(TranscodeError::EncoderOpenFailed(
            "source reports zero channels".into(),
        ));
    }
    if helpers::layout_is_native(&layout) && layout.channels() == i32::from(channels) {
        return Ok(layout);
    }
    let fallback = ChannelLayout::default(i32::from(channels));
    if fallback.is_empty() {
        return Err(TranscodeError::EncoderOpenFailed(format!(
            "no default channel layout for {} channels",
            channels
        )));
    }
    Ok(fallback)
}

/// Decide whether decoded samples need converting before encoding.
///
/// Returns `true` when a conversion stage is required, or
/// `SampleFormatMismatch` when the policy forbids it.
pub fn check_sample_format(found: Sample, policy: SampleFormatPolicy) -> Result<bool> {
    if found == ENCODER_SAMPLE_FMT {
        return Ok(false);
    }
    match policy {
        SampleFormatPolicy::Convert => Ok(true),
        SampleFormatPolicy::Reject => Err(TranscodeError::SampleFormatMismatch {
            found: sample_format_name(found).to_string(),
            required: sample_format_name(ENCODER_SAMPLE_FMT).to_string(),
        }),
    }
}
