//! Source reader: open the input container, pick its audio stream and read
//! packets from it.

use std::ffi::CString;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;

use crate::error::{Result, TranscodeError};
use crate::ffmpeg_utils::{self, helpers};
use crate::guard::{Guard, Ledger, ResourceKind};
use crate::transcode::decoder::AudioDecoder;

/// Description of one stream in the input container
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    pub media_type: ffmpeg::media::Type,
    pub codec_id: ffmpeg::codec::Id,
    pub sample_rate: u32,
    pub channels: u16,
    /// Empty for non-audio streams and sources without a channel mask
    pub channel_layout: ChannelLayout,
    /// `None` for non-audio streams
    pub sample_format: Option<ffmpeg::format::Sample>,
    pub bit_rate: u64,
    pub time_base: ffmpeg::Rational,
}

impl StreamInfo {
    fn from_stream(stream: &ffmpeg::format::stream::Stream) -> Self {
        let params = stream.parameters();
        let media_type = params.medium();

        // Layout and sample format only reach a codec context, so read them
        // through an unopened one. A custom channel map belongs to that
        // context and is not kept.
        let (channel_layout, sample_format) = if media_type == ffmpeg::media::Type::Audio {
            ffmpeg::codec::Context::from_parameters(params.clone())
                .and_then(|ctx| ctx.decoder().audio())
                .map(|audio| {
                    let layout = audio.channel_layout();
                    let layout = if helpers::layout_is_native(&layout) {
                        layout
                    } else {
                        ChannelLayout::default(0)
                    };
                    (layout, Some(audio.format()))
                })
                .unwrap_or((ChannelLayout::default(0), None))
        } else {
            (ChannelLayout::default(0), None)
        };

        Self {
            index: stream.index(),
            media_type,
            codec_id: params.id(),
            sample_rate: helpers::codec_params_sample_rate(&params),
            channels: helpers::codec_params_channels(&params),
            channel_layout,
            sample_format,
            bit_rate: helpers::codec_params_bit_rate(&params),
            time_base: stream.time_base(),
        }
    }
}

/// Result of reading one packet from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The packet buffer holds a packet (from any stream)
    Packet,
    /// The container has no more packets
    EndOfStream,
}

pub(crate) fn path_to_cstring(path: &Path) -> Result<CString> {
    let s = path
        .to_str()
        .ok_or_else(|| TranscodeError::InvalidPath(path.display().to_string()))?;
    CString::new(s).map_err(|_| TranscodeError::InvalidPath(s.to_string()))
}

/// Open the input container at `path` without probing it.
pub fn open_input(path: &Path, ledger: &Ledger) -> Result<Guard<ffmpeg::format::context::Input>> {
    let c_path = path_to_cstring(path)?;
    let input = helpers::open_input_context(&c_path).map_err(|e| {
        TranscodeError::InputOpenFailed(format!("{}: {}", path.display(), e))
    })?;
    Ok(ledger.track(ResourceKind::InputContainer, input))
}

/// Read enough of the input to fill in every stream's parameters.
pub fn probe_streams(input: &mut ffmpeg::format::context::Input) -> Result<()> {
    helpers::find_stream_info(input)
        .map_err(|e| TranscodeError::StreamProbeFailed(e.to_string()))
}

/// Index of the first audio stream, in ascending index order.
pub fn select_audio_stream(input: &ffmpeg::format::context::Input) -> Result<usize> {
    input
        .streams()
        .find(|s| s.parameters().medium() == ffmpeg::media::Type::Audio)
        .map(|s| s.index())
        .ok_or(TranscodeError::NoAudioStreamFound)
}

/// Describe every stream in the container.
pub fn describe_streams(input: &ffmpeg::format::context::Input) -> Vec<StreamInfo> {
    input.streams().map(|s| StreamInfo::from_stream(&s)).collect()
}

/// Open a decoder for the stream described by `params`.
pub fn open_decoder(
    params: &ffmpeg::codec::Parameters,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    ledger: &Ledger,
) -> Result<Guard<AudioDecoder>> {
    let decoder = AudioDecoder::open(params, stream_index, time_base)?;
    Ok(ledger.track(ResourceKind::Decoder, decoder))
}

/// Open input container plus a decoder for its first audio stream
pub struct SourceReader {
    // decoder is released before the container it reads from
    decoder: Guard<AudioDecoder>,
    input: Guard<ffmpeg::format::context::Input>,
    info: StreamInfo,
}

impl SourceReader {
    /// Open `path`, probe it, select the audio stream and open its decoder.
    pub fn open(path: &Path, ledger: &Ledger) -> Result<Self> {
        let mut input = open_input(path, ledger)?;
        probe_streams(&mut input)?;

        let streams = describe_streams(&input);
        for s in &streams {
            tracing::debug!(
                index = s.index,
                media_type = ffmpeg_utils::media_type_name(s.media_type),
                codec = ffmpeg_utils::codec_name(s.codec_id),
                sample_rate = s.sample_rate,
                channels = s.channels,
                bit_rate = s.bit_rate,
                "input stream"
            );
        }

        let stream_index = select_audio_stream(&input)?;
        let info = streams
            .into_iter()
            .find(|s| s.index == stream_index)
            .ok_or(TranscodeError::NoAudioStreamFound)?;

        let params = input
            .stream(stream_index)
            .map(|s| s.parameters())
            .ok_or(TranscodeError::NoAudioStreamFound)?;
        let decoder = open_decoder(&params, stream_index, info.time_base, ledger)?;

        tracing::info!(
            path = %path.display(),
            stream_index,
            codec = ffmpeg_utils::codec_name(info.codec_id),
            sample_rate = info.sample_rate,
            channels = info.channels,
            "source opened"
        );

        Ok(Self {
            decoder,
            input,
            info,
        })
    }

    /// Read the next packet of any stream into `packet`.
    pub fn read_packet(&mut self, packet: &mut ffmpeg::Packet) -> Result<ReadOutcome> {
        match packet.read(&mut self.input) {
            Ok(()) => Ok(ReadOutcome::Packet),
            Err(ffmpeg::Error::Eof) => Ok(ReadOutcome::EndOfStream),
            Err(e) => Err(TranscodeError::PacketReadFailed(e.to_string())),
        }
    }

    pub fn decoder(&self) -> &AudioDecoder {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut AudioDecoder {
        &mut self.decoder
    }

    /// The selected audio stream.
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn stream_index(&self) -> usize {
        self.info.index
    }

    pub fn time_base(&self) -> ffmpeg::Rational {
        self.info.time_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input() {
        crate::ffmpeg_utils::init().unwrap();
        let ledger = Ledger::new();
        let err = open_input(Path::new("/nonexistent/input.mp3"), &ledger)
            .err()
            .unwrap();
        assert!(matches!(err, TranscodeError::InputOpenFailed(_)));
        assert_eq!(ledger.total_acquired(), 0);
    }

    #[test]
    fn test_describe_maskless_surround_wav() {
        crate::ffmpeg_utils::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("six.wav");
        crate::tests::fixtures::write_sine_wav(&path, 48_000, 6, 4_800);

        let ledger = Ledger::new();
        let mut input = open_input(&path, &ledger).unwrap();
        probe_streams(&mut input).unwrap();
        let streams = describe_streams(&input);
        assert_eq!(streams.len(), 1);

        let info = &streams[0];
        assert_eq!(info.media_type, ffmpeg::media::Type::Audio);
        assert_eq!(info.channels, 6);
        assert_eq!(info.sample_rate, 48_000);
        assert!(info.channel_layout.is_empty() || info.channel_layout.channels() == 6);
        assert_eq!(
            info.sample_format,
            Some(ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed))
        );
    }

    #[test]
    fn test_interior_nul_is_invalid_path() {
        let err = path_to_cstring(Path::new("bad\0name.wav")).unwrap_err();
        assert_eq!(err.code(), -30);
    }
}
