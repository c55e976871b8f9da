//! Audio transcoding module
//!
//! This module handles the re-encode half of the converter:
//! - Audio decoder bound to the selected source stream
//! - Codec bridge deriving Vorbis encoder settings from the decoder
//! - Sample format conversion to planar float (same rate and layout)
//! - Re-grouping of decoded samples into encoder-sized frames
//! - The decode → encode → mux loop and its flush sequence

pub mod bridge;
pub mod decoder;
pub mod encoder;
pub mod pipeline;
pub mod rechunk;
pub mod resampler;

/// Outcome of handing one unit of input to a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The codec took the input
    Accepted,
    /// The codec has pending output that must be drained first
    NotReady,
}

/// Outcome of asking a codec for one unit of output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// The output buffer was filled
    Ready,
    /// The codec needs more input
    NotReady,
    /// The codec has been flushed and has nothing left
    EndOfStream,
}

/// Map an `ffmpeg-next` send result onto [`SendStatus`], passing other errors
/// through untouched.
pub(crate) fn classify_send(
    result: Result<(), ffmpeg_next::Error>,
) -> Result<SendStatus, ffmpeg_next::Error> {
    match result {
        Ok(()) => Ok(SendStatus::Accepted),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
            Ok(SendStatus::NotReady)
        }
        Err(e) => Err(e),
    }
}

/// Map an `ffmpeg-next` receive result onto [`ReceiveStatus`], passing other
/// errors through untouched.
pub(crate) fn classify_receive(
    result: Result<(), ffmpeg_next::Error>,
) -> Result<ReceiveStatus, ffmpeg_next::Error> {
    match result {
        Ok(()) => Ok(ReceiveStatus::Ready),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
            Ok(ReceiveStatus::NotReady)
        }
        Err(ffmpeg_next::Error::Eof) => Ok(ReceiveStatus::EndOfStream),
        Err(e) => Err(e),
    }
}
