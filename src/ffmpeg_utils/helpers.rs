//! Safe wrappers around FFmpeg FFI calls.
//!
//! Almost every function in this module is `pub` and **safe** to call. All
//! `unsafe` blocks are contained here with explicit safety arguments.
//! Callers outside this module should never need to write `unsafe` for routine
//! FFmpeg access. The one exception is [`close_output_io`], which works on a
//! raw context pointer held by the sink's I/O guard.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use std::ffi::CStr;
use std::ptr;

// ── Container contexts ──────────────────────────────────────────────────────

/// Open an input container without probing its streams.
///
/// `ffmpeg::format::input` opens and probes in one step. The two are kept
/// apart here so each can fail with its own error.
pub fn open_input_context(path: &CStr) -> Result<ffmpeg::format::context::Input, ffmpeg::Error> {
    let mut ctx: *mut ffmpeg::ffi::AVFormatContext = ptr::null_mut();
    // SAFETY: `ctx` is a valid out-pointer and `path` is NUL-terminated. On
    // failure FFmpeg frees whatever it allocated and leaves `ctx` null.
    let ret = unsafe {
        ffmpeg::ffi::avformat_open_input(&mut ctx, path.as_ptr(), ptr::null(), ptr::null_mut())
    };
    if ret < 0 || ctx.is_null() {
        return Err(ffmpeg::Error::from(ret));
    }
    // SAFETY: `ctx` is a freshly opened input context we own. `Input` closes
    // it with `avformat_close_input` on drop.
    Ok(unsafe { ffmpeg::format::context::Input::wrap(ctx) })
}

/// Read enough packets to fill in codec parameters for every stream.
pub fn find_stream_info(input: &mut ffmpeg::format::context::Input) -> Result<(), ffmpeg::Error> {
    // SAFETY: `input.as_mut_ptr()` is an open input context.
    let ret =
        unsafe { ffmpeg::ffi::avformat_find_stream_info(input.as_mut_ptr(), ptr::null_mut()) };
    if ret < 0 {
        Err(ffmpeg::Error::from(ret))
    } else {
        Ok(())
    }
}

/// Allocate an output container context for `format_name`, without opening
/// any I/O.
pub fn alloc_output_context(
    format_name: &CStr,
    path: &CStr,
) -> Result<ffmpeg::format::context::Output, ffmpeg::Error> {
    let mut ctx: *mut ffmpeg::ffi::AVFormatContext = ptr::null_mut();
    // SAFETY: both strings are NUL-terminated and `ctx` is a valid out-pointer.
    let ret = unsafe {
        ffmpeg::ffi::avformat_alloc_output_context2(
            &mut ctx,
            ptr::null(),
            format_name.as_ptr(),
            path.as_ptr(),
        )
    };
    if ret < 0 || ctx.is_null() {
        return Err(ffmpeg::Error::from(ret.min(-1)));
    }
    // SAFETY: `ctx` is a freshly allocated output context with `pb == NULL`.
    // `Output` frees it (and closes `pb` if still set) on drop.
    Ok(unsafe { ffmpeg::format::context::Output::wrap(ctx) })
}

fn output_format_flags(output: &ffmpeg::format::context::Output) -> i32 {
    // SAFETY: an allocated output context always carries a non-null
    // `oformat`, and `flags` is a plain int.
    unsafe {
        let oformat = (*output.as_ptr()).oformat;
        if oformat.is_null() {
            0
        } else {
            (*oformat).flags
        }
    }
}

/// True when the output format writes through an `AVIOContext` the caller has
/// to open (i.e. `AVFMT_NOFILE` is not set).
pub fn output_requires_io(output: &ffmpeg::format::context::Output) -> bool {
    output_format_flags(output) & ffmpeg::ffi::AVFMT_NOFILE as i32 == 0
}

/// True when encoders feeding this output must emit global headers.
pub fn output_needs_global_header(output: &ffmpeg::format::context::Output) -> bool {
    output_format_flags(output) & ffmpeg::ffi::AVFMT_GLOBALHEADER as i32 != 0
}

/// Open `pb` on the output context for writing to `path`.
pub fn open_output_io(
    output: &mut ffmpeg::format::context::Output,
    path: &CStr,
) -> Result<(), ffmpeg::Error> {
    // SAFETY: `output.as_mut_ptr()` is a live output context and `pb` is the
    // field `avio_open` is documented to fill in.
    let ret = unsafe {
        let ctx = output.as_mut_ptr();
        ffmpeg::ffi::avio_open(
            &mut (*ctx).pb,
            path.as_ptr(),
            ffmpeg::ffi::AVIO_FLAG_WRITE as i32,
        )
    };
    if ret < 0 {
        Err(ffmpeg::Error::from(ret))
    } else {
        Ok(())
    }
}

/// Close and null the `pb` of an output context.
///
/// `avio_closep` leaves `pb` null, so a later `avformat_free_context` /
/// `Output` drop will not close it a second time.
///
/// # Safety
///
/// `ctx` must point to a live output context.
pub unsafe fn close_output_io(ctx: *mut ffmpeg::ffi::AVFormatContext) -> Result<(), ffmpeg::Error> {
    if ctx.is_null() || (*ctx).pb.is_null() {
        return Ok(());
    }
    let ret = ffmpeg::ffi::avio_closep(&mut (*ctx).pb);
    if ret < 0 {
        Err(ffmpeg::Error::from(ret))
    } else {
        Ok(())
    }
}

// ── Codec contexts ──────────────────────────────────────────────────────────

/// Allocate a codec context bound to `codec`, or `None` when FFmpeg is out of
/// memory.
pub fn alloc_codec_context(codec: ffmpeg::Codec) -> Option<ffmpeg::codec::Context> {
    // SAFETY: `codec.as_ptr()` is a registered codec descriptor.
    let ctx = unsafe { ffmpeg::ffi::avcodec_alloc_context3(codec.as_ptr()) };
    if ctx.is_null() {
        return None;
    }
    // SAFETY: `ctx` is a freshly allocated context with no other owner;
    // `Context` frees it with `avcodec_free_context` on drop.
    Some(unsafe { ffmpeg::codec::Context::wrap(ctx, None) })
}

/// Allow codecs flagged `AV_CODEC_CAP_EXPERIMENTAL` (FFmpeg's native Vorbis
/// encoder is one) to be opened on this context.
pub fn allow_experimental(context: &mut ffmpeg::codec::Context) {
    // SAFETY: plain int field on a live context.
    unsafe {
        (*context.as_mut_ptr()).strict_std_compliance = ffmpeg::ffi::FF_COMPLIANCE_EXPERIMENTAL;
    }
}

/// Allocate a fresh `AVCodecParameters`, copy the encoder context into it,
/// and return it as a safe `ffmpeg::codec::Parameters`.
///
/// Used to export an opened encoder's configuration onto the output stream.
pub fn encoder_codec_parameters(
    encoder: &ffmpeg::codec::encoder::Audio,
) -> Result<ffmpeg::codec::Parameters, ffmpeg::Error> {
    use std::ops::Deref;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `avcodec_parameters_alloc` returns a valid pointer or null, which
    // is checked before wrapping. Once wrapped, `Parameters` owns and frees it,
    // including on the error path below. `ctx.as_ptr()` is a live, opened
    // encoder context.
    unsafe {
        let raw = ffmpeg::ffi::avcodec_parameters_alloc();
        if raw.is_null() {
            return Err(ffmpeg::Error::Other {
                errno: ffmpeg::error::ENOMEM,
            });
        }
        let params = ffmpeg::codec::Parameters::wrap(raw, None);
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(raw, ctx.as_ptr());
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret));
        }
        Ok(params)
    }
}

// ── Codec-parameter field accessors ─────────────────────────────────────────

/// Read `sample_rate` from an `AVCodecParameters` struct.
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: `params.as_ptr()` returns a valid non-null pointer for the
    // lifetime of `params`.  `sample_rate` is a plain i32 field with no
    // ownership semantics.
    unsafe { (*params.as_ptr()).sample_rate.max(0) as u32 }
}

/// Read `ch_layout.nb_channels` from an `AVCodecParameters` struct.
pub fn codec_params_channels(params: &ffmpeg::codec::parameters::Parameters) -> u16 {
    // SAFETY: same as `codec_params_sample_rate`.
    unsafe { (*params.as_ptr()).ch_layout.nb_channels.max(0) as u16 }
}

/// Read `bit_rate` from an `AVCodecParameters` struct.
pub fn codec_params_bit_rate(params: &ffmpeg::codec::parameters::Parameters) -> u64 {
    unsafe { (*params.as_ptr()).bit_rate.max(0) as u64 }
}

/// Overwrite `codec_id` on an `AVCodecParameters` struct.
///
/// Lets tests describe a stream whose codec has no registered decoder.
#[cfg(test)]
pub fn codec_params_set_codec_id(
    params: &mut ffmpeg::codec::parameters::Parameters,
    codec_id: ffmpeg::codec::Id,
) {
    // SAFETY: plain enum field on a parameters struct we own.
    unsafe {
        let p = params.as_mut_ptr();
        (*p).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
        (*p).codec_id = codec_id.into();
    }
}

// ── Channel layouts ─────────────────────────────────────────────────────────

/// True when `layout` is a plain channel mask (`AV_CHANNEL_ORDER_NATIVE`).
pub fn layout_is_native(layout: &ChannelLayout) -> bool {
    layout.0.order == ffmpeg::ffi::AVChannelOrder::AV_CHANNEL_ORDER_NATIVE
}

/// Give a codec context whose layout is only a channel count the default
/// layout for that count, as the ffmpeg CLI does for its decoders.
///
/// Demuxers such as WAV leave `ch_layout` in `AV_CHANNEL_ORDER_UNSPEC` when
/// the file carries no channel mask. Decoded frames copy that, and swresample
/// refuses frames whose layout differs from the one it was configured with.
/// Returns `true` when the layout was replaced.
pub fn default_unspecified_layout(context: &mut ffmpeg::codec::Context) -> bool {
    // SAFETY: `ch_layout` is an inline field of a live context. An UNSPEC
    // layout owns no channel map, and `av_channel_layout_uninit` is called
    // before the struct is overwritten anyway.
    unsafe {
        let ch_layout = &mut (*context.as_mut_ptr()).ch_layout;
        if ch_layout.order != ffmpeg::ffi::AVChannelOrder::AV_CHANNEL_ORDER_UNSPEC
            || ch_layout.nb_channels <= 0
        {
            return false;
        }
        let channels = ch_layout.nb_channels;
        ffmpeg::ffi::av_channel_layout_uninit(ch_layout);
        ffmpeg::ffi::av_channel_layout_default(ch_layout, channels);
        ch_layout.order == ffmpeg::ffi::AVChannelOrder::AV_CHANNEL_ORDER_NATIVE
    }
}

// ── Packet / frame buffers ──────────────────────────────────────────────────

/// Drop the payload reference held by `packet` so it can be refilled.
pub fn packet_unref(packet: &mut ffmpeg::Packet) {
    // SAFETY: `av_packet_unref` accepts any initialised packet, including an
    // already blank one.
    unsafe { ffmpeg::ffi::av_packet_unref(packet.as_mut_ptr()) }
}

/// Drop the sample buffers held by `frame` so it can be refilled.
pub fn frame_unref(frame: &mut ffmpeg::frame::Audio) {
    // SAFETY: `av_frame_unref` accepts any allocated frame. Callers check
    // `frame_is_allocated` before the frame enters the pipeline.
    unsafe { ffmpeg::ffi::av_frame_unref(frame.as_mut_ptr()) }
}

/// True when the `AVFrame` behind `frame` was actually allocated.
pub fn frame_is_allocated(frame: &ffmpeg::frame::Audio) -> bool {
    // SAFETY: only the pointer value is inspected.
    unsafe { !frame.as_ptr().is_null() }
}

// ── Codec lookup ────────────────────────────────────────────────────────────

/// Returns `true` if a decoder is registered for `codec_id`.
#[cfg(test)]
pub fn decoder_exists(codec_id: ffmpeg::codec::Id) -> bool {
    // SAFETY: `avcodec_find_decoder` is thread-safe (reads a global read-only
    // registry after `ffmpeg::init()`).  The returned pointer is only used for
    // a null check; we never dereference it.
    let ptr = unsafe { ffmpeg::ffi::avcodec_find_decoder(codec_id.into()) };
    !ptr.is_null()
}

/// True when FFmpeg describes `codec_id` as lossless. The bit rate of such a
/// stream measures the uncompressed signal, not a lossy coding target.
pub fn codec_is_lossless(codec_id: ffmpeg::codec::Id) -> bool {
    // SAFETY: descriptors are static read-only data; null is checked.
    unsafe {
        let desc = ffmpeg::ffi::avcodec_descriptor_get(codec_id.into());
        !desc.is_null() && (*desc).props & ffmpeg::ffi::AV_CODEC_PROP_LOSSLESS as i32 != 0
    }
}

// ── FLTP audio plane reinterpretation ───────────────────────────────────────

/// Reinterpret a raw byte slice from an FLTP audio plane as `&[f32]`.
///
/// `byte_slice` must be the data plane of an `ffmpeg::util::frame::Audio`
/// frame in `FLTP` (planar float32) format.  `sample_count` is the number of
/// samples in the plane.
///
/// Returns `None` if:
/// - the pointer is not 4-byte aligned, or
/// - `byte_slice.len()` is shorter than `sample_count * 4`.
pub fn fltp_plane_as_f32(byte_slice: &[u8], sample_count: usize) -> Option<&[f32]> {
    let expected_bytes = sample_count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: alignment and length are verified above.  FLTP planes are
    // native-endian f32 values laid out contiguously.
    Some(unsafe { std::slice::from_raw_parts(ptr as *const f32, sample_count) })
}

/// Mutable version of [`fltp_plane_as_f32`].
pub fn fltp_plane_as_f32_mut(byte_slice: &mut [u8], sample_count: usize) -> Option<&mut [f32]> {
    let expected_bytes = sample_count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_mut_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: as above; the mutable borrow of `byte_slice` is carried over.
    Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut f32, sample_count) })
}

/// Extract an audio plane slice from an `AVFrame`.
///
/// Works around `ffmpeg-next`'s `Audio::data(index)` stopping at the first
/// zero `linesize`. Planar audio frames usually only populate `linesize[0]`,
/// which then describes every plane.
pub fn audio_plane_data(frame: &ffmpeg::frame::Audio, index: usize) -> &[u8] {
    // SAFETY: `extended_data` holds one pointer per channel for planar
    // formats (one in total for packed), each valid for `linesize[0]` bytes
    // while `frame` is borrowed.
    unsafe {
        let f = frame.as_ptr();
        let planes = if frame.format().is_planar() {
            (*f).ch_layout.nb_channels.max(0) as usize
        } else {
            1
        };
        if index >= planes {
            return &[];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &[];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &[];
        }

        let size = (*f).linesize[0].max(0) as usize;
        std::slice::from_raw_parts(plane_ptr, size)
    }
}

/// Mutable version of [`audio_plane_data`].
pub fn audio_plane_data_mut(frame: &mut ffmpeg::frame::Audio, index: usize) -> &mut [u8] {
    // SAFETY: see `audio_plane_data`; the frame is mutably borrowed.
    unsafe {
        let is_planar = frame.format().is_planar();
        let f = frame.as_mut_ptr();
        let planes = if is_planar {
            (*f).ch_layout.nb_channels.max(0) as usize
        } else {
            1
        };
        if index >= planes {
            return &mut [];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &mut [];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &mut [];
        }

        let size = (*f).linesize[0].max(0) as usize;
        std::slice::from_raw_parts_mut(plane_ptr, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fltp_plane_alignment_and_length() {
        let values = [0.5f32, -0.25, 1.0];
        let bytes: &[u8] = unsafe {
            std::slice::from_raw_parts(values.as_ptr() as *const u8, values.len() * 4)
        };
        assert_eq!(fltp_plane_as_f32(bytes, 3), Some(&values[..]));
        assert_eq!(fltp_plane_as_f32(bytes, 4), None);
    }

    #[test]
    fn test_alloc_codec_context() {
        crate::ffmpeg_utils::init().unwrap();
        let codec = ffmpeg::codec::decoder::find(ffmpeg::codec::Id::PCM_S16LE).unwrap();
        assert!(alloc_codec_context(codec).is_some());
    }

    #[test]
    fn test_decoder_exists() {
        crate::ffmpeg_utils::init().unwrap();
        assert!(decoder_exists(ffmpeg::codec::Id::PCM_S16LE));
        assert!(!decoder_exists(ffmpeg::codec::Id::None));
    }

    #[test]
    fn test_codec_is_lossless() {
        assert!(codec_is_lossless(ffmpeg::codec::Id::PCM_S16LE));
        assert!(codec_is_lossless(ffmpeg::codec::Id::FLAC));
        assert!(!codec_is_lossless(ffmpeg::codec::Id::MP3));
        assert!(!codec_is_lossless(ffmpeg::codec::Id::None));
    }

    #[test]
    fn test_ogg_output_flags() {
        crate::ffmpeg_utils::init().unwrap();
        let format = std::ffi::CString::new("ogg").unwrap();
        let path = std::ffi::CString::new("unused.ogg").unwrap();
        let output = alloc_output_context(&format, &path).unwrap();
        assert!(output_requires_io(&output));
    }

    #[test]
    fn test_open_missing_input() {
        crate::ffmpeg_utils::init().unwrap();
        let path = std::ffi::CString::new("/nonexistent/input.mp3").unwrap();
        assert!(open_input_context(&path).is_err());
    }

    #[test]
    fn test_unref_blank_buffers() {
        crate::ffmpeg_utils::init().unwrap();
        let mut packet = ffmpeg::Packet::empty();
        packet_unref(&mut packet);
        assert_eq!(packet.size(), 0);

        let mut frame = ffmpeg::frame::Audio::empty();
        assert!(frame_is_allocated(&frame));
        frame_unref(&mut frame);
    }
}
