//! FFmpeg utility functions

use ffmpeg_next as ffmpeg;

/// Convert timestamps from one timebase to another
///
/// Exact rational rescaling (`av_rescale_q`), rounding to nearest. Used for
/// every frame and packet that crosses from one time base to another so no
/// floating-point drift accumulates.
pub fn rescale_ts(ts: i64, from: ffmpeg::Rational, to: ffmpeg::Rational) -> i64 {
    unsafe { ffmpeg::ffi::av_rescale_q(ts, from.into(), to.into()) }
}

/// Get the codec name for a codec ID
pub fn codec_name(codec_id: ffmpeg::codec::Id) -> &'static str {
    codec_id.name()
}

/// Get the media type name
pub fn media_type_name(media_type: ffmpeg::media::Type) -> &'static str {
    match media_type {
        ffmpeg::media::Type::Video => "video",
        ffmpeg::media::Type::Audio => "audio",
        ffmpeg::media::Type::Subtitle => "subtitle",
        ffmpeg::media::Type::Data => "data",
        ffmpeg::media::Type::Attachment => "attachment",
        _ => "unknown",
    }
}

/// Get the short name of a sample format (e.g. `fltp`, `s16`)
pub fn sample_format_name(format: ffmpeg::format::Sample) -> &'static str {
    use ffmpeg::format::sample::Type;
    use ffmpeg::format::Sample;
    match format {
        Sample::None => "none",
        Sample::U8(Type::Packed) => "u8",
        Sample::U8(Type::Planar) => "u8p",
        Sample::I16(Type::Packed) => "s16",
        Sample::I16(Type::Planar) => "s16p",
        Sample::I32(Type::Packed) => "s32",
        Sample::I32(Type::Planar) => "s32p",
        Sample::I64(Type::Packed) => "s64",
        Sample::I64(Type::Planar) => "s64p",
        Sample::F32(Type::Packed) => "flt",
        Sample::F32(Type::Planar) => "fltp",
        Sample::F64(Type::Packed) => "dbl",
        Sample::F64(Type::Planar) => "dblp",
    }
}

/// Duration in seconds of `ts` ticks of `time_base`
pub fn ts_to_seconds(ts: i64, time_base: ffmpeg::Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}
