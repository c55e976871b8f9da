//! OGG/Vorbis transcoder
//!
//! Converts the first audio stream of a media file into an OGG/Vorbis file.
//!
//! Usage: `ogg-transcode <input> <output> [config.toml] [--json]`

use std::process::ExitCode;

use ogg_transcode::{LogFormat, TranscodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "ogg-transcode";

struct Args {
    input: String,
    output: String,
    config: Option<String>,
    json: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> Option<Args> {
    let mut json = false;
    let mut positional = Vec::new();
    for arg in args {
        if arg == "--json" {
            json = true;
        } else {
            positional.push(arg);
        }
    }
    let mut positional = positional.into_iter();
    let input = positional.next()?;
    let output = positional.next()?;
    let config = positional.next();
    if positional.next().is_some() {
        return None;
    }
    Some(Args {
        input,
        output,
        config,
        json,
    })
}

fn main() -> ExitCode {
    let Some(args) = parse_args(std::env::args().skip(1)) else {
        eprintln!("usage: {} <input> <output> [config.toml] [--json]", APP_NAME);
        return ExitCode::from(2);
    };

    // Load configuration
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Failed to load config file {}: {}",
                args.config.as_deref().unwrap_or_default(),
                e
            );
            return ExitCode::from(e.code().unsigned_abs() as u8);
        }
    };

    init_logging(&config);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("FFmpeg version: {}", ogg_transcode::ffmpeg_version_info());

    if let Err(e) = ogg_transcode::init() {
        tracing::error!("FFmpeg initialization failed: {}", e);
        return ExitCode::from(e.code().unsigned_abs() as u8);
    }
    ogg_transcode::install_log_filter();

    match ogg_transcode::transcode_with_config(&args.input, &args.output, &config) {
        Ok(summary) => {
            if args.json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(json) => println!("{}", json),
                    Err(e) => tracing::error!("Failed to render summary: {}", e),
                }
            } else {
                println!(
                    "{} -> {}: {} {} Hz, {} ch, {} packets, {:.2}s",
                    args.input,
                    args.output,
                    summary.encoder,
                    summary.sample_rate,
                    summary.channels,
                    summary.packets_written,
                    summary.duration_secs
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {} (code {})", APP_NAME, e, e.code());
            ExitCode::from(e.code().unsigned_abs() as u8)
        }
    }
}

/// Load the configuration file named on the command line, or the defaults
/// when none was given.
fn load_config(path: Option<&str>) -> ogg_transcode::Result<TranscodeConfig> {
    match path {
        Some(path) => TranscodeConfig::from_file(path),
        None => Ok(TranscodeConfig::default()),
    }
}

/// Initialize logging with tracing
fn init_logging(config: &TranscodeConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_filter().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Option<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["in.mp3", "out.ogg"]).unwrap();
        assert_eq!(parsed.input, "in.mp3");
        assert_eq!(parsed.output, "out.ogg");
        assert!(parsed.config.is_none());
        assert!(!parsed.json);

        let parsed = args(&["--json", "in.mp3", "out.ogg", "conf.toml"]).unwrap();
        assert!(parsed.json);
        assert_eq!(parsed.config.as_deref(), Some("conf.toml"));

        assert!(args(&["in.mp3"]).is_none());
        assert!(args(&["a", "b", "c", "d"]).is_none());
    }

    #[test]
    fn test_load_config() {
        assert_eq!(load_config(None).unwrap(), TranscodeConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcode.toml");
        std::fs::write(&path, "flush_decoder = false\n").unwrap();
        assert!(!load_config(path.to_str()).unwrap().flush_decoder);

        let missing = dir.path().join("missing.toml");
        let err = load_config(missing.to_str()).unwrap_err();
        assert_eq!(err.code(), -31);
    }
}
