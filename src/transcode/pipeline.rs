//! Decode → encode → mux loop
//!
//! One call converts one file. The pipeline owns every FFmpeg resource it
//! creates through [`Guard`]s, so any error returned from a stage unwinds
//! whatever was built so far.
//!
//! ```text
//! ReadingInput ──EOF──▶ FlushingDecoder ──▶ FlushingEncoder ──▶ Done
//!      │  ▲
//!      └──┘ one packet per step, decoder and encoder drained after each
//! ```

use std::fmt;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use serde::Serialize;

use crate::config::TranscodeConfig;
use crate::error::{Result, TranscodeError};
use crate::ffmpeg_utils::{self, helpers};
use crate::guard::{Guard, Ledger, ResourceKind};
use crate::sink::OggSink;
use crate::source::{ReadOutcome, SourceReader};

use super::bridge::{check_sample_format, EncoderParams};
use super::encoder::{find_vorbis_encoder, VorbisEncoder};
use super::rechunk::SampleQueue;
use super::resampler::SampleConverter;
use super::{ReceiveStatus, SendStatus};

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    ReadingInput,
    FlushingDecoder,
    FlushingEncoder,
    Done,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::ReadingInput => "reading_input",
            LoopState::FlushingDecoder => "flushing_decoder",
            LoopState::FlushingEncoder => "flushing_encoder",
            LoopState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Progress record for one conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub stream_index: usize,
    pub input_exhausted: bool,
    pub decoder_flushed: bool,
    pub encoder_flush_sent: bool,
    pub encoder_drained: bool,
    pub packets_read: u64,
    pub packets_skipped: u64,
    pub frames_decoded: u64,
    pub frames_encoded: u64,
    pub packets_written: u64,
    pub samples_decoded: u64,
    pub samples_encoded: u64,
    /// Last written packet pts, in the encoder time base
    pub last_written_pts: Option<i64>,
}

/// What a finished conversion did
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeSummary {
    pub input_codec: String,
    pub encoder: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u64,
    pub packets_read: u64,
    pub packets_skipped: u64,
    pub packets_written: u64,
    pub samples_decoded: u64,
    pub samples_encoded: u64,
    pub output_time_base: String,
    pub duration_secs: f64,
}

/// Run one conversion, recording resources in `ledger`.
pub fn run(
    input: &Path,
    output: &Path,
    config: &TranscodeConfig,
    ledger: &Ledger,
) -> Result<TranscodeSummary> {
    let mut transcoder = Transcoder::open(input, output, config, ledger)?;
    transcoder.run()?;
    transcoder.finish()
}

/// `ffmpeg::Packet` keeps its `AVPacket` inline, so only the payload it
/// later references needs releasing.
fn alloc_packet(ledger: &Ledger) -> Guard<ffmpeg::Packet> {
    ledger.acquire(ResourceKind::Packet, ffmpeg::Packet::empty(), |mut p| {
        helpers::packet_unref(&mut p)
    })
}

fn alloc_frame(ledger: &Ledger) -> Result<Guard<ffmpeg::frame::Audio>> {
    let frame = ffmpeg::frame::Audio::empty();
    if !helpers::frame_is_allocated(&frame) {
        return Err(TranscodeError::FrameAllocFailed);
    }
    Ok(ledger.acquire(ResourceKind::Frame, frame, |mut f| {
        helpers::frame_unref(&mut f)
    }))
}

/// A fully set up conversion.
///
/// Fields drop in declaration order: buffers, then codecs, then containers.
struct Transcoder {
    in_packet: Guard<ffmpeg::Packet>,
    decoded: Guard<ffmpeg::frame::Audio>,
    out_packet: Guard<ffmpeg::Packet>,
    converter: Option<Guard<SampleConverter>>,
    queue: SampleQueue,
    encoder: Guard<VorbisEncoder>,
    source: SourceReader,
    sink: OggSink,
    ledger: Ledger,
    config: TranscodeConfig,
    params: EncoderParams,
    state: PipelineState,
    loop_state: LoopState,
}

impl Transcoder {
    fn open(
        input: &Path,
        output: &Path,
        config: &TranscodeConfig,
        ledger: &Ledger,
    ) -> Result<Self> {
        let source = SourceReader::open(input, ledger)?;

        // Some decoders only settle their sample format on the first frame;
        // those are checked again per frame
        let decoder_format = source.decoder().format();
        if decoder_format != ffmpeg::format::Sample::None {
            check_sample_format(decoder_format, config.sample_format_policy)?;
        }

        let mut sink = OggSink::open(output, ledger)?;
        let codec = find_vorbis_encoder()?;
        sink.create_stream(codec)?;

        let params = EncoderParams::derive(source.decoder(), config)?;
        let encoder = VorbisEncoder::open(codec, &params, sink.needs_global_header())?;
        let encoder = ledger.track(ResourceKind::Encoder, encoder);

        sink.copy_encoder_params(&encoder)?;
        sink.open_io()?;
        sink.write_header()?;

        let queue = SampleQueue::new(
            params.channels,
            params.channel_layout,
            params.sample_rate,
            encoder.frame_size(),
        );

        tracing::info!(
            output = %output.display(),
            encoder = encoder.codec_name(),
            sample_rate = params.sample_rate,
            channels = params.channels,
            bit_rate = params.bit_rate,
            frame_size = encoder.frame_size(),
            "transcode pipeline ready"
        );

        Ok(Self {
            in_packet: alloc_packet(ledger),
            decoded: alloc_frame(ledger)?,
            out_packet: alloc_packet(ledger),
            converter: None,
            queue,
            encoder,
            state: PipelineState {
                stream_index: source.stream_index(),
                ..Default::default()
            },
            source,
            sink,
            ledger: ledger.clone(),
            config: config.clone(),
            params,
            loop_state: LoopState::ReadingInput,
        })
    }

    fn run(&mut self) -> Result<()> {
        loop {
            let next = match self.loop_state {
                LoopState::ReadingInput => self.read_input()?,
                LoopState::FlushingDecoder => self.flush_decoder()?,
                LoopState::FlushingEncoder => self.flush_encoder()?,
                LoopState::Done => return Ok(()),
            };
            if next != self.loop_state {
                tracing::debug!(
                    from = %self.loop_state,
                    state = %next,
                    packets_read = self.state.packets_read,
                    packets_written = self.state.packets_written,
                    "pipeline state change"
                );
                self.loop_state = next;
            }
        }
    }

    /// Read one packet and push it through the decoder.
    fn read_input(&mut self) -> Result<LoopState> {
        helpers::packet_unref(&mut self.in_packet);
        if self.source.read_packet(&mut self.in_packet)? == ReadOutcome::EndOfStream {
            self.state.input_exhausted = true;
            return Ok(if self.config.flush_decoder {
                LoopState::FlushingDecoder
            } else {
                LoopState::FlushingEncoder
            });
        }

        if self.in_packet.stream() != self.state.stream_index {
            self.state.packets_skipped += 1;
            return Ok(LoopState::ReadingInput);
        }
        self.state.packets_read += 1;

        loop {
            match self.source.decoder_mut().send_packet(&self.in_packet)? {
                SendStatus::Accepted => break,
                SendStatus::NotReady => {
                    if self.drain_decoder()? == 0 {
                        return Err(TranscodeError::DecoderSendFailed(
                            "decoder refused input without pending output".into(),
                        ));
                    }
                }
            }
        }
        self.drain_decoder()?;
        Ok(LoopState::ReadingInput)
    }

    /// Receive frames until the decoder wants more input. Returns the number
    /// of frames received.
    fn drain_decoder(&mut self) -> Result<usize> {
        let mut received = 0;
        loop {
            match self.source.decoder_mut().receive_frame(&mut self.decoded)? {
                ReceiveStatus::Ready => {
                    received += 1;
                    self.handle_decoded_frame()?;
                    helpers::frame_unref(&mut self.decoded);
                }
                ReceiveStatus::NotReady => return Ok(received),
                ReceiveStatus::EndOfStream => {
                    self.state.decoder_flushed = true;
                    return Ok(received);
                }
            }
        }
    }

    fn handle_decoded_frame(&mut self) -> Result<()> {
        let samples = self.decoded.samples();
        self.state.frames_decoded += 1;
        self.state.samples_decoded += samples as u64;

        let pts = self
            .decoded
            .pts()
            .or_else(|| self.decoded.timestamp())
            .map(|ts| {
                ffmpeg_utils::rescale_ts(ts, self.source.time_base(), self.params.time_base)
            });

        // The converter and the queue are set up for the negotiated layout
        if self.decoded.channel_layout().is_empty()
            && self.decoded.channels() == self.params.channels
        {
            self.decoded.set_channel_layout(self.params.channel_layout);
        }

        let needs_conversion =
            check_sample_format(self.decoded.format(), self.config.sample_format_policy)?;
        if needs_conversion {
            if self.converter.is_none() {
                let converter = SampleConverter::for_frame(&self.decoded)?;
                self.converter = Some(self.ledger.track(ResourceKind::Resampler, converter));
            }
            if let Some(converter) = self.converter.as_mut() {
                if let Some(converted) = converter.convert(&self.decoded)? {
                    self.queue.push(&converted, pts)?;
                }
            }
        } else {
            self.queue.push(&self.decoded, pts)?;
        }

        tracing::trace!(samples, pts = ?pts, buffered = self.queue.buffered(), "decoded frame");

        self.encode_queued()
    }

    /// Send every full frame the queue holds.
    fn encode_queued(&mut self) -> Result<()> {
        while let Some(frame) = self.queue.pop_frame()? {
            self.encode_frame(&frame)?;
        }
        Ok(())
    }

    fn encode_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()> {
        loop {
            match self.encoder.send_frame(frame)? {
                SendStatus::Accepted => break,
                SendStatus::NotReady => {
                    if self.drain_encoder()? == 0 {
                        return Err(TranscodeError::EncoderSendFailed(
                            "encoder refused input without pending output".into(),
                        ));
                    }
                }
            }
        }
        self.state.frames_encoded += 1;
        self.state.samples_encoded += frame.samples() as u64;
        self.drain_encoder()?;
        Ok(())
    }

    /// Receive and write packets until the encoder wants more input. Returns
    /// the number of packets written.
    fn drain_encoder(&mut self) -> Result<usize> {
        let mut written = 0;
        loop {
            helpers::packet_unref(&mut self.out_packet);
            match self.encoder.receive_packet(&mut self.out_packet)? {
                ReceiveStatus::Ready => {
                    self.write_encoded()?;
                    written += 1;
                }
                ReceiveStatus::NotReady => return Ok(written),
                ReceiveStatus::EndOfStream => {
                    self.state.encoder_drained = true;
                    return Ok(written);
                }
            }
        }
    }

    fn write_encoded(&mut self) -> Result<()> {
        if let Some(pts) = self.out_packet.pts() {
            if let Some(last) = self.state.last_written_pts {
                if pts < last {
                    tracing::warn!(pts, last, "encoder produced a decreasing timestamp");
                }
            }
            self.state.last_written_pts = Some(pts);
        }

        let time_base = self.encoder.time_base();
        self.sink.write_packet(&mut self.out_packet, time_base)?;
        self.state.packets_written += 1;
        Ok(())
    }

    /// Signal end of input to the decoder and drain what it still holds.
    fn flush_decoder(&mut self) -> Result<LoopState> {
        self.source.decoder_mut().send_eof()?;
        while !self.state.decoder_flushed {
            if self.drain_decoder()? == 0 && !self.state.decoder_flushed {
                return Err(TranscodeError::DecoderReceiveFailed(
                    "decoder stalled while flushing".into(),
                ));
            }
        }
        Ok(LoopState::FlushingEncoder)
    }

    /// Push the buffered tail through the encoder, then signal end of input
    /// and drain it.
    fn flush_encoder(&mut self) -> Result<LoopState> {
        if let Some(converter) = self.converter.as_mut() {
            if let Some(tail) = converter.flush()? {
                self.queue.push(&tail, None)?;
            }
        }
        self.encode_queued()?;
        if let Some(last) = self.queue.flush_frame()? {
            self.encode_frame(&last)?;
        }

        self.encoder.send_eof()?;
        self.state.encoder_flush_sent = true;
        while !self.state.encoder_drained {
            if self.drain_encoder()? == 0 && !self.state.encoder_drained {
                return Err(TranscodeError::EncoderReceiveFailed(
                    "encoder stalled while flushing".into(),
                ));
            }
        }
        Ok(LoopState::Done)
    }

    /// Write the trailer, close the file and report what was done.
    fn finish(mut self) -> Result<TranscodeSummary> {
        self.sink.write_trailer()?;
        self.sink.close_io()?;

        let time_base = self.sink.stream_time_base();
        let duration_secs = ffmpeg_utils::ts_to_seconds(
            self.state.samples_encoded as i64,
            self.params.time_base,
        );

        tracing::debug!(state = ?self.state, "pipeline finished");

        Ok(TranscodeSummary {
            input_codec: ffmpeg_utils::codec_name(self.source.info().codec_id).to_string(),
            encoder: self.encoder.codec_name().to_string(),
            sample_rate: self.params.sample_rate,
            channels: self.params.channels,
            bit_rate: self.params.bit_rate,
            packets_read: self.state.packets_read,
            packets_skipped: self.state.packets_skipped,
            packets_written: self.state.packets_written,
            samples_decoded: self.state.samples_decoded,
            samples_encoded: self.state.samples_encoded,
            output_time_base: format!("{}/{}", time_base.numerator(), time_base.denominator()),
            duration_secs,
        })
    }
}
