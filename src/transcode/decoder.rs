//! Audio decoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to decode compressed audio packets
//! (MP3, AAC, FLAC, PCM, …) into raw PCM `AVFrame`s.

use crate::error::{Result, TranscodeError};
use crate::ffmpeg_utils::helpers;
use ffmpeg_next as ffmpeg;

use super::{classify_receive, classify_send, ReceiveStatus, SendStatus};

/// Audio decoder backed by an FFmpeg codec context
pub struct AudioDecoder {
    /// The FFmpeg decoder context
    decoder: ffmpeg::decoder::Audio,
    /// Stream index in the source file
    stream_index: usize,
    /// Time base of the source stream; decoded timestamps are expressed in it
    time_base: ffmpeg::Rational,
    /// Bit rate reported by the stream when the decoder has none
    stream_bit_rate: u64,
}

impl AudioDecoder {
    /// Open a decoder for a stream described by `params`.
    ///
    /// Mirrors the four steps FFmpeg needs (find, allocate, copy parameters,
    /// open) so each failure keeps its own error kind.
    pub fn open(
        params: &ffmpeg::codec::Parameters,
        stream_index: usize,
        time_base: ffmpeg::Rational,
    ) -> Result<Self> {
        let codec_id = params.id();
        let codec = ffmpeg::codec::decoder::find(codec_id).ok_or_else(|| {
            TranscodeError::NoDecoderAvailable(crate::ffmpeg_utils::codec_name(codec_id).into())
        })?;

        let mut context = helpers::alloc_codec_context(codec).ok_or_else(|| {
            TranscodeError::DecoderAllocFailed(format!(
                "avcodec_alloc_context3 returned null for {}",
                codec.name()
            ))
        })?;

        context.set_parameters(params.clone()).map_err(|e| {
            TranscodeError::DecoderParamCopyFailed(format!(
                "stream {}: {}",
                stream_index, e
            ))
        })?;

        if helpers::default_unspecified_layout(&mut context) {
            tracing::debug!(stream_index, "no channel mask on source, using default layout");
        }

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.audio())
            .map_err(|e| {
                TranscodeError::DecoderOpenFailed(format!(
                    "{} on stream {}: {}",
                    codec.name(),
                    stream_index,
                    e
                ))
            })?;

        tracing::debug!(
            stream_index,
            codec = codec.name(),
            sample_rate = decoder.rate(),
            channels = decoder.channels(),
            "audio decoder opened"
        );

        Ok(Self {
            decoder,
            stream_index,
            time_base,
            stream_bit_rate: helpers::codec_params_bit_rate(params),
        })
    }

    /// Send a compressed packet to the decoder.
    pub fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<SendStatus> {
        classify_send(self.decoder.send_packet(packet)).map_err(|e| {
            TranscodeError::DecoderSendFailed(format!(
                "send_packet error on stream {}: {}",
                self.stream_index, e
            ))
        })
    }

    /// Send EOF so the decoder releases its buffered frames.
    ///
    /// An EOF response means the decoder was already flushed, which is not an
    /// error.
    pub fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(TranscodeError::DecoderFlushSendFailed(format!(
                "send_eof error on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    /// Receive one decoded PCM frame into `frame`.
    ///
    /// FFmpeg unreferences `frame` before filling it, so the same frame can be
    /// reused across calls.
    pub fn receive_frame(&mut self, frame: &mut ffmpeg::frame::Audio) -> Result<ReceiveStatus> {
        classify_receive(self.decoder.receive_frame(frame)).map_err(|e| {
            TranscodeError::DecoderReceiveFailed(format!(
                "receive_frame error on stream {}: {}",
                self.stream_index, e
            ))
        })
    }

    /// The source stream index.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Time base of the source stream.
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Codec being decoded.
    pub fn codec_id(&self) -> ffmpeg::codec::Id {
        self.decoder.id()
    }

    /// Sample rate of decoded frames.
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    /// Channel count of decoded frames.
    pub fn channels(&self) -> u16 {
        self.decoder.channels() as u16
    }

    /// Sample format of decoded frames.
    pub fn format(&self) -> ffmpeg::format::Sample {
        self.decoder.format()
    }

    /// Channel layout of decoded frames.
    pub fn channel_layout(&self) -> ffmpeg::util::channel_layout::ChannelLayout {
        self.decoder.channel_layout()
    }

    /// Negotiated bit rate, falling back to the stream's declared one.
    pub fn bit_rate(&self) -> u64 {
        match self.decoder.bit_rate() {
            0 => self.stream_bit_rate,
            rate => rate as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_pcm_decoder() {
        crate::ffmpeg_utils::init().unwrap();
        let decoder = ffmpeg::codec::decoder::find(ffmpeg::codec::Id::PCM_S16LE);
        assert!(decoder.is_some());
    }

    #[test]
    fn test_open_without_decoder() {
        crate::ffmpeg_utils::init().unwrap();
        let mut params = ffmpeg::codec::Parameters::new();
        helpers::codec_params_set_codec_id(&mut params, ffmpeg::codec::Id::None);

        let err = AudioDecoder::open(&params, 0, ffmpeg::Rational::new(1, 44_100))
            .err()
            .expect("codec id none has no decoder");
        assert!(matches!(err, TranscodeError::NoDecoderAvailable(_)));
        assert_eq!(err.code(), -4);
    }

    #[test]
    fn test_maskless_wav_decodes_with_default_layout() {
        use ffmpeg_next::util::channel_layout::ChannelLayout;

        crate::ffmpeg_utils::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        for channels in [2u16, 6] {
            let path = dir.path().join(format!("{}ch.wav", channels));
            crate::tests::fixtures::write_sine_wav(&path, 44_100, channels, 2_048);

            let mut input = ffmpeg::format::input(&path).unwrap();
            let (index, params, time_base) = {
                let stream = input.streams().best(ffmpeg::media::Type::Audio).unwrap();
                (stream.index(), stream.parameters(), stream.time_base())
            };
            let mut decoder = AudioDecoder::open(&params, index, time_base).unwrap();
            let expected = ChannelLayout::default(i32::from(channels));
            assert_eq!(decoder.channel_layout(), expected);

            let mut frame = ffmpeg::frame::Audio::empty();
            let mut got_frame = false;
            for (stream, packet) in input.packets() {
                if stream.index() != index {
                    continue;
                }
                decoder.send_packet(&packet).unwrap();
                if matches!(decoder.receive_frame(&mut frame).unwrap(), ReceiveStatus::Ready) {
                    got_frame = true;
                    break;
                }
            }
            assert!(got_frame);
            assert!(!frame.channel_layout().is_empty());
            assert_eq!(frame.channel_layout(), expected);
            assert_eq!(frame.channels(), channels);
        }
    }

    #[test]
    fn test_decoder_codec_id() {
        crate::ffmpeg_utils::init().unwrap();
        let decoder = ffmpeg::codec::decoder::find(ffmpeg::codec::Id::FLAC);
        assert!(decoder.is_some());
        assert_eq!(decoder.unwrap().id(), ffmpeg::codec::Id::FLAC);
    }
}
