//! OGG sink: output container, its Vorbis stream and the file it writes to

use std::ffi::CString;
use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::config::OUTPUT_FORMAT;
use crate::error::{Result, TranscodeError};
use crate::ffmpeg_utils::helpers;
use crate::guard::{Guard, Ledger, ResourceKind};
use crate::source::path_to_cstring;
use crate::transcode::encoder::VorbisEncoder;

/// The `AVIOContext` opened on an output container.
///
/// Holds the container pointer rather than the I/O pointer because closing
/// must also null the container's `pb` field.
pub struct OutputIo {
    ctx: *mut ffmpeg::ffi::AVFormatContext,
}

fn release_output_io(io: OutputIo) {
    // SAFETY: the sink drops its I/O guard before the container guard, so
    // `ctx` is still live here.
    if let Err(e) = unsafe { helpers::close_output_io(io.ctx) } {
        tracing::warn!("Failed to close output I/O during cleanup: {}", e);
    }
}

/// Allocate an output container for `format` at `path`. Nothing is written
/// to disk until the I/O is opened.
pub fn open_output(
    path: &Path,
    format: &str,
    ledger: &Ledger,
) -> Result<Guard<ffmpeg::format::context::Output>> {
    let c_path = path_to_cstring(path)?;
    let c_format = CString::new(format)
        .map_err(|_| TranscodeError::OutputAllocFailed(format!("bad format name {}", format)))?;
    let output = helpers::alloc_output_context(&c_format, &c_path).map_err(|e| {
        TranscodeError::OutputAllocFailed(format!("{} for {}: {}", format, path.display(), e))
    })?;
    Ok(ledger.track(ResourceKind::OutputContainer, output))
}

/// Output side of a conversion
pub struct OggSink {
    // declared first so it is released before the container
    io: Option<Guard<OutputIo>>,
    output: Guard<ffmpeg::format::context::Output>,
    path: CString,
    ledger: Ledger,
    stream_index: Option<usize>,
    stream_time_base: ffmpeg::Rational,
}

impl OggSink {
    /// Allocate the OGG container for `path`.
    pub fn open(path: &Path, ledger: &Ledger) -> Result<Self> {
        let output = open_output(path, OUTPUT_FORMAT, ledger)?;
        Ok(Self {
            io: None,
            output,
            path: path_to_cstring(path)?,
            ledger: ledger.clone(),
            stream_index: None,
            stream_time_base: ffmpeg::Rational::new(0, 1),
        })
    }

    /// True when the container requires encoders to emit global headers.
    pub fn needs_global_header(&self) -> bool {
        helpers::output_needs_global_header(&self.output)
    }

    /// Add the output audio stream for `codec`.
    pub fn create_stream(&mut self, codec: ffmpeg::Codec) -> Result<usize> {
        let stream = self.output.add_stream(codec).map_err(|e| {
            TranscodeError::OutputStreamCreateFailed(format!("{}: {}", codec.name(), e))
        })?;
        let index = stream.index();
        self.stream_index = Some(index);
        Ok(index)
    }

    fn stream_index(&self) -> Result<usize> {
        self.stream_index.ok_or_else(|| {
            TranscodeError::OutputStreamCreateFailed("no output stream created".into())
        })
    }

    /// Copy the opened encoder's parameters onto the output stream.
    pub fn copy_encoder_params(&mut self, encoder: &VorbisEncoder) -> Result<()> {
        let index = self.stream_index()?;
        let params = encoder.codec_parameters()?;
        let mut stream = self.output.stream_mut(index).ok_or_else(|| {
            TranscodeError::EncoderParamsExportFailed(format!("output stream {} vanished", index))
        })?;
        stream.set_parameters(params);
        stream.set_time_base(encoder.time_base());
        Ok(())
    }

    /// Open the output file, unless the format does its own I/O.
    pub fn open_io(&mut self) -> Result<()> {
        if !helpers::output_requires_io(&self.output) {
            tracing::debug!("output format needs no explicit I/O");
            return Ok(());
        }
        helpers::open_output_io(&mut self.output, &self.path).map_err(|e| {
            TranscodeError::OutputIOOpenFailed(format!("{}: {}", self.path.to_string_lossy(), e))
        })?;
        // SAFETY: only the pointer value is taken; the container outlives
        // the I/O guard.
        let io = OutputIo {
            ctx: unsafe { self.output.as_mut_ptr() },
        };
        self.io = Some(self.ledger.acquire(ResourceKind::OutputIo, io, release_output_io));
        Ok(())
    }

    /// Write the container header. The muxer may pick its own stream time
    /// base here, so it is read back afterwards.
    pub fn write_header(&mut self) -> Result<()> {
        let index = self.stream_index()?;
        self.output
            .write_header()
            .map_err(|e| TranscodeError::HeaderWriteFailed(e.to_string()))?;
        if let Some(stream) = self.output.stream(index) {
            self.stream_time_base = stream.time_base();
        }
        tracing::debug!(
            stream_index = index,
            time_base = ?self.stream_time_base,
            "output header written"
        );
        Ok(())
    }

    /// Write one encoded packet whose timestamps are in `encoder_time_base`.
    pub fn write_packet(
        &mut self,
        packet: &mut ffmpeg::Packet,
        encoder_time_base: ffmpeg::Rational,
    ) -> Result<()> {
        let index = self.stream_index()?;
        packet.set_stream(index);
        packet.rescale_ts(encoder_time_base, self.stream_time_base);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| TranscodeError::PacketWriteFailed(e.to_string()))
    }

    /// Finalize the container.
    pub fn write_trailer(&mut self) -> Result<()> {
        self.output
            .write_trailer()
            .map_err(|e| TranscodeError::TrailerWriteFailed(e.to_string()))
    }

    /// Close the output file, reporting any error from the final flush.
    pub fn close_io(&mut self) -> Result<()> {
        let Some(io) = self.io.take() else {
            return Ok(());
        };
        io.release_with(|io| {
            // SAFETY: the container guard is still held by `self`.
            unsafe { helpers::close_output_io(io.ctx) }
        })
        .map_err(|e| TranscodeError::IOCloseFailed(e.to_string()))
    }

    /// Stream time base chosen by the muxer.
    pub fn stream_time_base(&self) -> ffmpeg::Rational {
        self.stream_time_base
    }
}
