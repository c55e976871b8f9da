use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    /// Opening, probing or decoding the input
    Source,
    /// Deriving encoder parameters and opening the encoder
    Bridge,
    /// Creating or writing the output container
    Sink,
    /// The decode/encode loop itself
    Loop,
    /// Anything outside the pipeline (paths, configuration)
    Caller,
}

/// Main error type for the transcoder
///
/// Every variant corresponds to one failure point of the pipeline and maps to
/// a stable negative status code through [`TranscodeError::code`].
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// The input container could not be opened
    #[error("Failed to open input file: {0}")]
    InputOpenFailed(String),

    /// The input container did not yield usable stream information
    #[error("Failed to find stream info: {0}")]
    StreamProbeFailed(String),

    /// The input container has no audio stream
    #[error("No audio stream found in source file")]
    NoAudioStreamFound,

    /// No decoder is registered for the audio stream's codec
    #[error("Failed to find decoder: codec_id={0}")]
    NoDecoderAvailable(String),

    /// The decoder context could not be allocated
    #[error("Failed to allocate decoder context: {0}")]
    DecoderAllocFailed(String),

    /// Stream parameters could not be copied into the decoder context
    #[error("Failed to copy stream parameters to decoder: {0}")]
    DecoderParamCopyFailed(String),

    /// The decoder could not be opened
    #[error("Failed to open decoder: {0}")]
    DecoderOpenFailed(String),

    /// The output container context could not be allocated
    #[error("Failed to allocate output context: {0}")]
    OutputAllocFailed(String),

    /// No Vorbis encoder is available in this FFmpeg build
    #[error("Failed to find encoder: codec_id={0}")]
    NoEncoderAvailable(String),

    /// A stream could not be added to the output container
    #[error("Failed to create output stream: {0}")]
    OutputStreamCreateFailed(String),

    /// The encoder context could not be allocated
    #[error("Failed to allocate encoder context: {0}")]
    EncoderAllocFailed(String),

    /// The encoder rejected its configuration
    #[error("Failed to open encoder: {0}")]
    EncoderOpenFailed(String),

    /// Encoder parameters could not be exported to the output stream
    #[error("Failed to export encoder parameters: {0}")]
    EncoderParamsExportFailed(String),

    /// The output file could not be opened for writing
    #[error("Failed to open output I/O: {0}")]
    OutputIOOpenFailed(String),

    /// The container header could not be written
    #[error("Failed to write header: {0}")]
    HeaderWriteFailed(String),

    /// The container trailer could not be written
    #[error("Failed to write trailer: {0}")]
    TrailerWriteFailed(String),

    /// The output file could not be closed
    #[error("Failed to close output I/O: {0}")]
    IOCloseFailed(String),

    /// A packet could not be allocated. `ffmpeg::Packet` keeps its
    /// `AVPacket` inline, so the pipeline itself never raises this.
    #[error("Failed to allocate packet")]
    PacketAllocFailed,

    /// A frame could not be allocated
    #[error("Failed to allocate frame")]
    FrameAllocFailed,

    /// Reading a packet from the input failed
    #[error("Failed to read packet: {0}")]
    PacketReadFailed(String),

    /// The decoder rejected a packet
    #[error("Failed to send packet to decoder: {0}")]
    DecoderSendFailed(String),

    /// The decoder failed while producing a frame
    #[error("Failed to receive frame from decoder: {0}")]
    DecoderReceiveFailed(String),

    /// The encoder rejected a frame
    #[error("Failed to send frame to encoder: {0}")]
    EncoderSendFailed(String),

    /// The encoder failed while producing a packet
    #[error("Failed to receive packet from encoder: {0}")]
    EncoderReceiveFailed(String),

    /// The muxer rejected a packet
    #[error("Failed to write packet: {0}")]
    PacketWriteFailed(String),

    /// The encoder rejected the end-of-stream signal
    #[error("Failed to flush encoder: {0}")]
    EncoderFlushSendFailed(String),

    /// The decoder rejected the end-of-stream signal
    #[error("Failed to flush decoder: {0}")]
    DecoderFlushSendFailed(String),

    /// Decoded samples are not in the encoder's format and conversion is disabled
    #[error("Sample format mismatch: decoder produces {found}, encoder requires {required}")]
    SampleFormatMismatch { found: String, required: String },

    /// Sample format conversion failed
    #[error("Failed to convert samples: {0}")]
    ResampleFailed(String),

    /// A path could not be interpreted
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Configuration could not be loaded or saved
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl TranscodeError {
    /// Stable integer status for this failure point. Success is `0`.
    pub fn code(&self) -> i32 {
        match self {
            TranscodeError::InputOpenFailed(_) => -1,
            TranscodeError::StreamProbeFailed(_) => -2,
            TranscodeError::NoAudioStreamFound => -3,
            TranscodeError::NoDecoderAvailable(_) => -4,
            TranscodeError::DecoderAllocFailed(_) => -5,
            TranscodeError::DecoderParamCopyFailed(_) => -6,
            TranscodeError::DecoderOpenFailed(_) => -7,
            TranscodeError::OutputAllocFailed(_) => -8,
            TranscodeError::NoEncoderAvailable(_) => -9,
            TranscodeError::OutputStreamCreateFailed(_) => -10,
            TranscodeError::EncoderAllocFailed(_) => -11,
            TranscodeError::EncoderOpenFailed(_) => -12,
            TranscodeError::EncoderParamsExportFailed(_) => -13,
            TranscodeError::OutputIOOpenFailed(_) => -14,
            TranscodeError::TrailerWriteFailed(_) => -15,
            TranscodeError::IOCloseFailed(_) => -16,
            TranscodeError::HeaderWriteFailed(_) => -17,
            TranscodeError::PacketAllocFailed => -18,
            TranscodeError::FrameAllocFailed => -19,
            TranscodeError::PacketReadFailed(_) => -20,
            TranscodeError::DecoderSendFailed(_) => -21,
            TranscodeError::DecoderReceiveFailed(_) => -22,
            TranscodeError::EncoderSendFailed(_) => -23,
            TranscodeError::EncoderReceiveFailed(_) => -24,
            TranscodeError::PacketWriteFailed(_) => -25,
            TranscodeError::EncoderFlushSendFailed(_) => -26,
            TranscodeError::DecoderFlushSendFailed(_) => -27,
            TranscodeError::SampleFormatMismatch { .. } => -28,
            TranscodeError::ResampleFailed(_) => -29,
            TranscodeError::InvalidPath(_) => -30,
            TranscodeError::Config(_)
            | TranscodeError::Io(_)
            | TranscodeError::ConfigParse(_)
            | TranscodeError::ConfigSerialize(_) => -31,
        }
    }

    /// The pipeline stage this error was raised in.
    pub fn stage(&self) -> ErrorStage {
        use TranscodeError::*;
        match self {
            InputOpenFailed(_)
            | StreamProbeFailed(_)
            | NoAudioStreamFound
            | NoDecoderAvailable(_)
            | DecoderAllocFailed(_)
            | DecoderParamCopyFailed(_)
            | DecoderOpenFailed(_) => ErrorStage::Source,
            NoEncoderAvailable(_)
            | EncoderAllocFailed(_)
            | EncoderOpenFailed(_)
            | SampleFormatMismatch { .. } => ErrorStage::Bridge,
            OutputAllocFailed(_)
            | OutputStreamCreateFailed(_)
            | EncoderParamsExportFailed(_)
            | OutputIOOpenFailed(_)
            | HeaderWriteFailed(_)
            | TrailerWriteFailed(_)
            | IOCloseFailed(_)
            | PacketWriteFailed(_) => ErrorStage::Sink,
            PacketAllocFailed
            | FrameAllocFailed
            | PacketReadFailed(_)
            | DecoderSendFailed(_)
            | DecoderReceiveFailed(_)
            | EncoderSendFailed(_)
            | EncoderReceiveFailed(_)
            | EncoderFlushSendFailed(_)
            | DecoderFlushSendFailed(_)
            | ResampleFailed(_) => ErrorStage::Loop,
            InvalidPath(_) | Config(_) | Io(_) | ConfigParse(_) | ConfigSerialize(_) => {
                ErrorStage::Caller
            }
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TranscodeError>;
