use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use emotion_detector::config::{init_logging, ModelConfig};
use emotion_detector::load_model;
use emotion_detector::protocol::{write_response, Response, Server};

/// Facial emotion recognition over newline-delimited JSON on stdin/stdout.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    model: ModelConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    let mut stdout = io::stdout().lock();

    let model = match load_model(&cli.model) {
        Ok(model) => model,
        Err(err) => {
            error!("{:#}", err);
            let _ = write_response(&mut stdout, &Response::startup_failure(&err));
            return ExitCode::FAILURE;
        }
    };

    let mut server = Server::new(model);
    if let Err(err) = write_response(&mut stdout, &Response::ready(server.info())) {
        error!("{:#}", err);
        return ExitCode::FAILURE;
    }
    info!("Ready: {:?}", server.info());

    match server.serve(io::stdin().lock(), stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
