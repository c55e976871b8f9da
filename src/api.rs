use crate::config::TranscodeConfig;
use crate::error::Result;
use crate::guard::Ledger;
use crate::transcode::pipeline;
use std::path::Path;

pub use crate::transcode::pipeline::TranscodeSummary;

/// Convert the first audio stream of `input` to an OGG/Vorbis file at
/// `output`, with the default configuration.
pub fn transcode<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<TranscodeSummary> {
    transcode_with_config(input, output, &TranscodeConfig::default())
}

/// Convert `input` to OGG/Vorbis at `output` using `config`.
pub fn transcode_with_config<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &TranscodeConfig,
) -> Result<TranscodeSummary> {
    transcode_with_ledger(input, output, config, &Ledger::new())
}

/// Convert `input` to OGG/Vorbis at `output`, recording every FFmpeg resource
/// the conversion acquires and releases in `ledger`.
///
/// Every resource has been released by the time this returns, on success and
/// on failure alike.
pub fn transcode_with_ledger<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &TranscodeConfig,
    ledger: &Ledger,
) -> Result<TranscodeSummary> {
    let input = input.as_ref();
    let output = output.as_ref();

    let result = pipeline::run(input, output, config, ledger);
    match &result {
        Ok(summary) => tracing::info!(
            input = %input.display(),
            output = %output.display(),
            packets_written = summary.packets_written,
            samples_encoded = summary.samples_encoded,
            "conversion finished"
        ),
        Err(e) => tracing::warn!(
            input = %input.display(),
            code = e.code(),
            stage = ?e.stage(),
            "conversion failed: {}",
            e
        ),
    }
    ledger.log_summary();
    result
}
