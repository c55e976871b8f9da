//! Test fixtures for integration tests
//!
//! Media inputs are generated on the fly so no binary assets are needed, and
//! converted outputs are inspected by decoding them back with FFmpeg.

use crate::ffmpeg_utils::ffmpeg;
use std::path::Path;

/// Format tag FFmpeg's WAV demuxer maps to no codec at all
pub const UNKNOWN_WAV_TAG: u16 = 0x7a7a;

/// Write a WAV file with the given format tag and raw sample payload.
pub fn write_wav_raw(
    path: &Path,
    format_tag: u16,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    data: &[u8],
) {
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&format_tag.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);

    std::fs::write(path, out).unwrap();
}

/// One sample of a per-channel sine tone (440 Hz times the channel number).
fn sine_sample(index: usize, channel: u16, sample_rate: u32) -> i16 {
    let freq = 440.0 * (channel as f64 + 1.0);
    let t = index as f64 / sample_rate as f64;
    ((t * freq * std::f64::consts::TAU).sin() * 0.4 * i16::MAX as f64) as i16
}

/// Write a 16-bit PCM sine wave, `frames` samples per channel. The file has
/// no channel mask, so FFmpeg only learns the channel count.
pub fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
    let mut data = Vec::with_capacity(frames * channels as usize * 2);
    for i in 0..frames {
        for ch in 0..channels {
            data.extend_from_slice(&sine_sample(i, ch, sample_rate).to_le_bytes());
        }
    }
    write_wav_raw(path, 1, sample_rate, channels, 16, &data);
}

/// Write a Matroska file holding one FLAC stream per entry of `channels`,
/// each `frames` samples per channel long.
///
/// Used for compressed and multi-stream inputs; FLAC is always built into
/// FFmpeg.
pub fn write_flac_mkv(path: &Path, sample_rate: u32, channels: &[u16], frames: usize) {
    let s16 = ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed);
    let time_base = ffmpeg::Rational::new(1, sample_rate as i32);
    let codec = ffmpeg::codec::encoder::find(ffmpeg::codec::Id::FLAC).unwrap();

    let mut output = ffmpeg::format::output_as(&path, "matroska").unwrap();
    let global_header = output
        .format()
        .flags()
        .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

    let mut encoders = Vec::new();
    for &count in channels {
        let mut encoder = ffmpeg::codec::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .unwrap();
        encoder.set_rate(sample_rate as i32);
        encoder.set_format(s16);
        encoder.set_channel_layout(ffmpeg::ChannelLayout::default(i32::from(count)));
        encoder.set_time_base(time_base);
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).unwrap();

        let mut stream = output.add_stream(codec).unwrap();
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
        encoders.push(encoder);
    }
    output.write_header().unwrap();

    let chunk = match encoders.first().map_or(0, |e| e.frame_size() as usize) {
        0 => 4096,
        n => n,
    };
    let mut written = 0;
    while written < frames {
        let n = chunk.min(frames - written);
        for (index, (encoder, &count)) in encoders.iter_mut().zip(channels).enumerate() {
            let layout = ffmpeg::ChannelLayout::default(i32::from(count));
            let mut frame = ffmpeg::frame::Audio::new(s16, n, layout);
            frame.set_rate(sample_rate);
            frame.set_pts(Some(written as i64));
            let data = frame.data_mut(0);
            for i in 0..n {
                for ch in 0..count {
                    let at = (i * count as usize + ch as usize) * 2;
                    let v = sine_sample(written + i, ch, sample_rate);
                    data[at..at + 2].copy_from_slice(&v.to_le_bytes());
                }
            }
            encoder.send_frame(&frame).unwrap();
            write_encoded(encoder, index, time_base, &mut output);
        }
        written += n;
    }
    for (index, encoder) in encoders.iter_mut().enumerate() {
        encoder.send_eof().unwrap();
        write_encoded(encoder, index, time_base, &mut output);
    }
    output.write_trailer().unwrap();
}

fn write_encoded(
    encoder: &mut ffmpeg::encoder::Audio,
    index: usize,
    time_base: ffmpeg::Rational,
    output: &mut ffmpeg::format::context::Output,
) {
    let stream_time_base = output.stream(index).unwrap().time_base();
    let mut packet = ffmpeg::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(index);
        packet.rescale_ts(time_base, stream_time_base);
        packet.write_interleaved(output).unwrap();
    }
}

/// Write a 32-bit IEEE float WAV (decodes to packed f32).
pub fn write_float_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
    let mut data = Vec::with_capacity(frames * channels as usize * 4);
    for i in 0..frames {
        for _ in 0..channels {
            let v = ((i % 100) as f32 / 100.0) - 0.5;
            data.extend_from_slice(&v.to_le_bytes());
        }
    }
    write_wav_raw(path, 3, sample_rate, channels, 32, &data);
}

/// Write a WAV whose format tag has no decoder.
pub fn write_unknown_codec_wav(path: &Path) {
    write_wav_raw(path, UNKNOWN_WAV_TAG, 44_100, 2, 16, &[0u8; 4096]);
}

/// Write a subtitle-only file.
pub fn write_srt(path: &Path) {
    let text = "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nWorld\n";
    std::fs::write(path, text).unwrap();
}

/// What decoding a converted file back yields
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedOutput {
    pub stream_count: usize,
    pub codec_id: ffmpeg::codec::Id,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: u64,
    pub packet_pts: Vec<i64>,
}

/// Decode every packet of the first audio stream in `path`.
pub fn decode_output(path: &Path) -> DecodedOutput {
    let mut input = ffmpeg::format::input(&path).unwrap();
    let stream_count = input.streams().count();
    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .expect("output has an audio stream");
    let index = stream.index();
    let codec_id = stream.parameters().id();

    let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters()).unwrap();
    let mut decoder = context.decoder().audio().unwrap();

    let mut samples = 0u64;
    let mut packet_pts = Vec::new();
    let mut frame = ffmpeg::frame::Audio::empty();

    for (s, packet) in input.packets() {
        if s.index() != index {
            continue;
        }
        if let Some(pts) = packet.pts() {
            packet_pts.push(pts);
        }
        decoder.send_packet(&packet).unwrap();
        while decoder.receive_frame(&mut frame).is_ok() {
            samples += frame.samples() as u64;
        }
    }
    decoder.send_eof().unwrap();
    while decoder.receive_frame(&mut frame).is_ok() {
        samples += frame.samples() as u64;
    }

    DecodedOutput {
        stream_count,
        codec_id,
        sample_rate: decoder.rate(),
        channels: decoder.channels() as u16,
        samples,
        packet_pts,
    }
}

/// True when the Vorbis encoder in this build opens with `channels`
/// channels. FFmpeg's native encoder only takes stereo; libvorbis takes up
/// to eight.
pub fn vorbis_accepts_channels(channels: u16) -> bool {
    use crate::transcode::bridge::EncoderParams;
    use crate::transcode::encoder::{find_vorbis_encoder, VorbisEncoder};

    if !vorbis_ready() {
        return false;
    }
    let Ok(codec) = find_vorbis_encoder() else {
        return false;
    };
    let layout = ffmpeg::ChannelLayout::default(i32::from(channels));
    EncoderParams::from_source(44_100, channels, layout, 0)
        .and_then(|params| VorbisEncoder::open(codec, &params, true))
        .is_ok()
}

/// Initialize FFmpeg and report whether conversions can run at all.
pub fn vorbis_ready() -> bool {
    crate::ffmpeg_utils::init().unwrap();
    crate::transcode::encoder::is_vorbis_encoder_available()
        && crate::ffmpeg_utils::helpers::decoder_exists(ffmpeg::codec::Id::VORBIS)
}
