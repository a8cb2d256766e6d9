//! wav-to-m4a
//!
//! Command-line front end: converts one PCM16 WAV file into an AAC M4A file
//! and prints the outcome as JSON.
//!
//! Usage: `wav-to-m4a <input.wav> <output.m4a> [config.toml]`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wav_to_m4a::config_file::ConfigFile;
use wav_to_m4a::error::TranscodeError;
use wav_to_m4a::muxer::summarize;
use wav_to_m4a::{ffmpeg, transcode_file_async, Outcome, TranscodeConfig};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "wav-to-m4a";

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!(
            "{} v{}\nusage: {} <input.wav> <output.m4a> [config.toml]",
            APP_NAME, VERSION, APP_NAME
        );
        return ExitCode::from(2);
    }
    let input = PathBuf::from(&args[0]);
    let output = PathBuf::from(&args[1]);

    // Load configuration before logging so the file can choose the format
    let (config, config_file, config_error) = match args.get(2) {
        Some(path) => match ConfigFile::from_file(path) {
            Ok(cf) => (cf.clone().into_transcode_config(), Some(cf), None),
            Err(e) => (
                TranscodeConfig::default(),
                None,
                Some(format!("failed to load config file {}: {}", path, e)),
            ),
        },
        None => (TranscodeConfig::default(), None, None),
    };

    init_logging(config_file.as_ref());
    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    if let Some(message) = config_error {
        return report(Outcome::failure(&TranscodeError::Config(message)), None);
    }
    tracing::debug!("Configuration loaded: {:?}", config);

    if let Err(e) = ffmpeg::init() {
        return report(Outcome::failure(&e.into()), None);
    }
    ffmpeg::install_log_filter();
    tracing::info!("FFmpeg version: {}", ffmpeg::version_info());

    let result = transcode_file_async(input, output, config).await;
    let outcome = Outcome::from_result(&result);
    let report_json = result.ok().and_then(|r| {
        let mut value = serde_json::to_value(&r).ok()?;
        if let (Some(map), Some(container)) =
            (value.as_object_mut(), container_summary(&r.output))
        {
            map.insert("container".to_string(), container);
        }
        Some(value)
    });
    report(outcome, report_json)
}

/// Print the outcome (and report, on success) as one JSON object.
fn report(outcome: Outcome, conversion: Option<serde_json::Value>) -> ExitCode {
    let code = if outcome.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    };
    println!("{}", outcome_json(&outcome, conversion));
    code
}

fn outcome_json(outcome: &Outcome, conversion: Option<serde_json::Value>) -> serde_json::Value {
    let mut value = serde_json::to_value(outcome).unwrap_or_default();
    if let (Some(map), Some(conversion)) = (value.as_object_mut(), conversion) {
        map.insert("report".to_string(), conversion);
    }
    value
}

/// Read the published file back and describe its boxes.
fn container_summary(output: &Path) -> Option<serde_json::Value> {
    let summary = std::fs::read(output)
        .map_err(TranscodeError::from)
        .and_then(|bytes| summarize(&bytes));
    match summary {
        Ok(summary) => serde_json::to_value(summary).ok(),
        Err(e) => {
            tracing::warn!(output = %output.display(), error = %e, "Could not summarize output");
            None
        }
    }
}

/// Initialize logging with tracing
fn init_logging(config: Option<&ConfigFile>) {
    let default_filter = match config.and_then(|c| c.log_level()) {
        Some(level) => format!("wav_to_m4a={}", level),
        None => "wav_to_m4a=info".to_string(),
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let json = config.map(|c| c.json_logs()).unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
