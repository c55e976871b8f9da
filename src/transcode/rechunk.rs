//! Re-grouping of planar f32 samples into encoder-sized frames
//!
//! Decoders hand out frames of whatever size the source codec uses (1152 for
//! MP3, 4096 for FLAC, arbitrary for PCM), while an encoder with a fixed
//! `frame_size` rejects anything else except the final frame.

use crate::error::{Result, TranscodeError};
use crate::ffmpeg_utils::helpers;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;

use super::encoder::ENCODER_SAMPLE_FMT;

/// FIFO of per-channel samples with encoder-timebase timestamps
pub struct SampleQueue {
    planes: Vec<Vec<f32>>,
    layout: ChannelLayout,
    rate: u32,
    /// 0 = emit whatever is buffered
    frame_size: usize,
    /// pts of the first buffered sample, in 1/rate units
    next_pts: Option<i64>,
}

impl SampleQueue {
    pub fn new(channels: u16, layout: ChannelLayout, rate: u32, frame_size: usize) -> Self {
        Self {
            planes: vec![Vec::new(); channels as usize],
            layout,
            rate,
            frame_size,
            next_pts: None,
        }
    }

    /// Append a planar f32 frame.
    ///
    /// `pts` is the frame's timestamp in the encoder timebase. Only the first
    /// frame's timestamp is used; later output is stamped by sample count so
    /// timestamps stay strictly increasing.
    pub fn push(&mut self, frame: &ffmpeg::util::frame::Audio, pts: Option<i64>) -> Result<()> {
        if frame.format() != ENCODER_SAMPLE_FMT {
            return Err(TranscodeError::ResampleFailed(format!(
                "sample queue expects fltp, got {}",
                crate::ffmpeg_utils::sample_format_name(frame.format())
            )));
        }
        if frame.channels() as usize != self.planes.len() {
            return Err(TranscodeError::ResampleFailed(format!(
                "sample queue expects {} channels, got {}",
                self.planes.len(),
                frame.channels()
            )));
        }

        let n = frame.samples();
        for (ch, plane) in self.planes.iter_mut().enumerate() {
            let data = helpers::audio_plane_data(frame, ch);
            let floats = helpers::fltp_plane_as_f32(data, n).ok_or_else(|| {
                TranscodeError::ResampleFailed(format!(
                    "FLTP plane {} has bad alignment or length ({} bytes for {} samples)",
                    ch,
                    data.len(),
                    n
                ))
            })?;
            plane.extend_from_slice(floats);
        }

        if self.next_pts.is_none() {
            self.next_pts = Some(pts.unwrap_or(0));
        }
        Ok(())
    }

    /// Samples per channel currently buffered.
    pub fn buffered(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    /// Take one full frame, if enough samples are buffered.
    pub fn pop_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let available = self.buffered();
        if available == 0 {
            return Ok(None);
        }
        match self.frame_size {
            0 => self.take(available).map(Some),
            size if available >= size => self.take(size).map(Some),
            _ => Ok(None),
        }
    }

    /// Take whatever is left as a final, possibly short, frame.
    pub fn flush_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        match self.buffered() {
            0 => Ok(None),
            n => self.take(n).map(Some),
        }
    }

    fn take(&mut self, n: usize) -> Result<ffmpeg::util::frame::Audio> {
        let mut out = ffmpeg::util::frame::Audio::new(ENCODER_SAMPLE_FMT, n, self.layout);
        out.set_rate(self.rate);
        fill_planes(&mut out, &self.planes, n)?;

        for plane in self.planes.iter_mut() {
            plane.drain(..n);
        }
        let pts = self.next_pts.unwrap_or(0);
        out.set_pts(Some(pts));
        self.next_pts = Some(pts + n as i64);
        Ok(out)
    }
}

/// Copy the first `n` samples of each plane into `out`. Nothing is consumed
/// from the queue when this fails.
fn fill_planes(out: &mut ffmpeg::util::frame::Audio, planes: &[Vec<f32>], n: usize) -> Result<()> {
    for (ch, plane) in planes.iter().enumerate() {
        let bytes = helpers::audio_plane_data_mut(out, ch);
        let len = bytes.len();
        let floats = helpers::fltp_plane_as_f32_mut(bytes, n).ok_or_else(|| {
            TranscodeError::ResampleFailed(format!(
                "output plane {} has bad alignment or length ({} bytes for {} samples)",
                ch, len, n
            ))
        })?;
        floats.copy_from_slice(&plane[..n]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fltp_frame(samples: usize, value: f32) -> ffmpeg::util::frame::Audio {
        let mut frame =
            ffmpeg::util::frame::Audio::new(ENCODER_SAMPLE_FMT, samples, ChannelLayout::STEREO);
        frame.set_rate(44_100);
        for ch in 0..2 {
            let bytes = helpers::audio_plane_data_mut(&mut frame, ch);
            let floats = helpers::fltp_plane_as_f32_mut(bytes, samples).unwrap();
            floats.fill(value);
        }
        frame
    }

    #[test]
    fn test_fixed_frame_size() {
        let mut queue = SampleQueue::new(2, ChannelLayout::STEREO, 44_100, 64);
        queue.push(&fltp_frame(100, 0.25), Some(1000)).unwrap();
        assert_eq!(queue.buffered(), 100);

        let first = queue.pop_frame().unwrap().unwrap();
        assert_eq!(first.samples(), 64);
        assert_eq!(first.pts(), Some(1000));
        assert_eq!(first.rate(), 44_100);
        assert!(queue.pop_frame().unwrap().is_none());

        queue.push(&fltp_frame(30, 0.5), Some(5000)).unwrap();
        let second = queue.pop_frame().unwrap().unwrap();
        assert_eq!(second.samples(), 64);
        assert_eq!(second.pts(), Some(1064));

        let tail = queue.flush_frame().unwrap().unwrap();
        assert_eq!(tail.samples(), 2);
        assert_eq!(tail.pts(), Some(1128));
        assert!(queue.flush_frame().unwrap().is_none());
    }

    #[test]
    fn test_samples_preserved_in_order() {
        let mut queue = SampleQueue::new(2, ChannelLayout::STEREO, 44_100, 4);
        queue.push(&fltp_frame(3, 0.1), None).unwrap();
        queue.push(&fltp_frame(3, 0.9), None).unwrap();

        let frame = queue.pop_frame().unwrap().unwrap();
        let plane = helpers::audio_plane_data(&frame, 1);
        let floats = helpers::fltp_plane_as_f32(plane, 4).unwrap();
        assert_eq!(floats, &[0.1, 0.1, 0.1, 0.9]);
        assert_eq!(frame.pts(), Some(0));
    }

    #[test]
    fn test_variable_frame_size_emits_everything() {
        let mut queue = SampleQueue::new(2, ChannelLayout::STEREO, 44_100, 0);
        assert!(queue.pop_frame().unwrap().is_none());
        queue.push(&fltp_frame(777, 0.0), Some(0)).unwrap();
        assert_eq!(queue.pop_frame().unwrap().unwrap().samples(), 777);
        assert_eq!(queue.buffered(), 0);
    }

    #[test]
    fn test_unwritable_plane_is_an_error() {
        let mut frame = ffmpeg::util::frame::Audio::new(ENCODER_SAMPLE_FMT, 8, ChannelLayout::MONO);
        let planes = vec![vec![0.5f32; 8], vec![0.5f32; 8]];
        // the mono frame has no second plane to write into
        let err = fill_planes(&mut frame, &planes, 8).unwrap_err();
        assert!(matches!(err, TranscodeError::ResampleFailed(_)));
    }

    #[test]
    fn test_layout_mismatch_keeps_samples() {
        let mut queue = SampleQueue::new(2, ChannelLayout::MONO, 44_100, 4);
        queue.push(&fltp_frame(6, 0.5), Some(0)).unwrap();
        assert!(queue.pop_frame().is_err());
        assert_eq!(queue.buffered(), 6);
    }

    #[test]
    fn test_rejects_packed_frames() {
        let mut queue = SampleQueue::new(2, ChannelLayout::STEREO, 44_100, 64);
        let packed = ffmpeg::util::frame::Audio::new(
            ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed),
            16,
            ChannelLayout::STEREO,
        );
        let err = queue.push(&packed, None).unwrap_err();
        assert!(matches!(err, TranscodeError::ResampleFailed(_)));
    }
}
