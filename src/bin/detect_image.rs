use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::error;

use emotion_detector::config::{init_logging, ModelConfig};
use emotion_detector::load_model;
use emotion_detector::pipeline::detect_in_bytes;
use emotion_detector::protocol::{write_response, Response};

/// Runs emotion detection on image files and prints one detect response per file.
#[derive(Parser, Debug)]
struct Cli {
    #[command(flatten)]
    model: ModelConfig,

    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut model = load_model(&cli.model)?;
    let mut stdout = io::stdout().lock();
    for path in cli.images {
        let id = Value::from(path.display().to_string());
        let response = match fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))
            .and_then(|bytes| detect_in_bytes(&mut model, &bytes))
        {
            Ok(analysis) => Response::detection(id, analysis),
            Err(err) => Response::detection_failure(id, format!("failed to process image: {err:#}")),
        };
        write_response(&mut stdout, &response)?;
    }
    Ok(())
}
