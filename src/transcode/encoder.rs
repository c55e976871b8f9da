//! Vorbis encoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to encode planar float PCM frames into
//! Vorbis packets. libvorbis is used when FFmpeg was built with it; otherwise
//! FFmpeg's native (experimental) encoder is used.

use crate::error::{Result, TranscodeError};
use crate::ffmpeg_utils::helpers;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::util::format::sample::Sample;

use super::bridge::EncoderParams;
use super::{classify_receive, classify_send, ReceiveStatus, SendStatus};

/// Sample format Vorbis encoders accept
pub const ENCODER_SAMPLE_FMT: Sample = Sample::F32(ffmpeg::util::format::sample::Type::Planar);

/// Locate the Vorbis encoder.
///
/// `avcodec_find_encoder` prefers non-experimental implementations, so this
/// yields libvorbis when present and the native encoder otherwise.
pub fn find_vorbis_encoder() -> Result<ffmpeg::Codec> {
    codec::encoder::find(codec::Id::VORBIS).ok_or_else(|| {
        TranscodeError::NoEncoderAvailable("vorbis encoder not found in this FFmpeg build".into())
    })
}

/// Check whether the FFmpeg build includes a Vorbis encoder.
pub fn is_vorbis_encoder_available() -> bool {
    codec::encoder::find(codec::Id::VORBIS).is_some()
}

/// Vorbis encoder backed by a real FFmpeg codec context
pub struct VorbisEncoder {
    encoder: ffmpeg::encoder::Audio,
    codec_name: String,
    /// Samples per channel per frame; 0 means the encoder takes any size
    frame_size: usize,
    time_base: ffmpeg::Rational,
}

impl VorbisEncoder {
    /// Allocate and open an encoder for `codec` configured from `params`.
    pub fn open(codec: ffmpeg::Codec, params: &EncoderParams, global_header: bool) -> Result<Self> {
        // Build context and configure the audio encoder BEFORE opening
        let mut context = helpers::alloc_codec_context(codec).ok_or_else(|| {
            TranscodeError::EncoderAllocFailed(format!(
                "avcodec_alloc_context3 returned null for {}",
                codec.name()
            ))
        })?;
        helpers::allow_experimental(&mut context);
        context.set_time_base(params.time_base);
        if global_header {
            context.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut audio_enc = context.encoder().audio().map_err(|e| {
            TranscodeError::EncoderAllocFailed(format!("Cannot get audio encoder handle: {}", e))
        })?;

        audio_enc.set_rate(params.sample_rate as i32);
        audio_enc.set_format(params.sample_format);
        audio_enc.set_channel_layout(params.channel_layout);
        if params.bit_rate > 0 {
            audio_enc.set_bit_rate(params.bit_rate as usize);
        }

        let encoder = audio_enc.open_as(codec).map_err(|e| {
            TranscodeError::EncoderOpenFailed(format!(
                "Failed to open {} encoder ({} Hz, {} ch): {}",
                codec.name(),
                params.sample_rate,
                params.channels,
                e
            ))
        })?;

        let frame_size = encoder.frame_size() as usize;

        tracing::debug!(
            encoder = codec.name(),
            sample_rate = params.sample_rate,
            channels = params.channels,
            bit_rate = params.bit_rate,
            frame_size,
            "vorbis encoder opened"
        );

        Ok(Self {
            encoder,
            codec_name: codec.name().to_string(),
            frame_size,
            time_base: params.time_base,
        })
    }

    /// Send one PCM frame to the encoder.
    pub fn send_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<SendStatus> {
        classify_send(self.encoder.send_frame(frame)).map_err(|e| {
            TranscodeError::EncoderSendFailed(format!(
                "{} send_frame error: {}",
                self.codec_name, e
            ))
        })
    }

    /// Send EOF to flush the encoder's buffered output.
    pub fn send_eof(&mut self) -> Result<()> {
        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(TranscodeError::EncoderFlushSendFailed(format!(
                "{} send_eof error: {}",
                self.codec_name, e
            ))),
        }
    }

    /// Receive one encoded packet into `packet`.
    pub fn receive_packet(&mut self, packet: &mut ffmpeg::Packet) -> Result<ReceiveStatus> {
        classify_receive(self.encoder.receive_packet(packet)).map_err(|e| {
            TranscodeError::EncoderReceiveFailed(format!(
                "{} receive_packet error: {}",
                self.codec_name, e
            ))
        })
    }

    /// The number of samples per channel the encoder expects per frame, or 0
    /// when any size is accepted.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// The encoder timebase (1 / sample_rate).
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Name of the FFmpeg encoder implementation in use.
    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// Codec parameters for the encoded stream (for muxer stream setup).
    pub fn codec_parameters(&self) -> Result<ffmpeg::codec::Parameters> {
        helpers::encoder_codec_parameters(&self.encoder)
            .map_err(|e| TranscodeError::EncoderParamsExportFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::util::channel_layout::ChannelLayout;

    fn stereo_params() -> EncoderParams {
        EncoderParams {
            sample_rate: 44_100,
            channels: 2,
            channel_layout: ChannelLayout::STEREO,
            sample_format: ENCODER_SAMPLE_FMT,
            bit_rate: 128_000,
            time_base: ffmpeg::Rational::new(1, 44_100),
        }
    }

    #[test]
    fn test_vorbis_encoder_creation() {
        crate::ffmpeg_utils::init().unwrap();
        if !is_vorbis_encoder_available() {
            return;
        }
        let codec = find_vorbis_encoder().unwrap();
        let enc = VorbisEncoder::open(codec, &stereo_params(), false);
        assert!(enc.is_ok(), "Vorbis encoder should open: {:?}", enc.err());
        let enc = enc.unwrap();
        assert_eq!(enc.time_base(), ffmpeg::Rational::new(1, 44_100));
        assert!(enc.codec_parameters().is_ok());
    }

    #[test]
    fn test_vorbis_encoder_flush_without_input() {
        crate::ffmpeg_utils::init().unwrap();
        if !is_vorbis_encoder_available() {
            return;
        }
        let codec = find_vorbis_encoder().unwrap();
        let mut enc = VorbisEncoder::open(codec, &stereo_params(), false).unwrap();
        enc.send_eof().unwrap();
        let mut packet = ffmpeg::Packet::empty();
        let mut status = enc.receive_packet(&mut packet).unwrap();
        while status == ReceiveStatus::Ready {
            status = enc.receive_packet(&mut packet).unwrap();
        }
        assert_eq!(status, ReceiveStatus::EndOfStream);
    }
}
