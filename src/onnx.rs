use std::fmt::Display;
use std::path::Path;

use anyhow::{anyhow, ensure, Context, Result};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::debug;

/// Runtime knobs shared by every session this process opens.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub intra_threads: usize,
    pub cuda: bool,
}

pub fn load_session(model_path: &Path, options: SessionOptions) -> Result<Session> {
    ensure!(model_path.is_file(), "model file not found: {}", model_path.display());

    let mut execution_providers = vec![];
    if options.cuda {
        execution_providers.push(CUDAExecutionProvider::default().build());
    }
    execution_providers.push(CPUExecutionProvider::default().build());

    let context = || format!("failed to load model {}", model_path.display());
    let session = Session::builder()
        .map_err(runtime_error)
        .and_then(|builder| builder.with_execution_providers(execution_providers).map_err(runtime_error))
        .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3).map_err(runtime_error))
        .and_then(|builder| builder.with_intra_threads(options.intra_threads.max(1)).map_err(runtime_error))
        .and_then(|mut builder| builder.commit_from_file(model_path).map_err(runtime_error))
        .with_context(context)?;
    debug!("Loaded {} ({} inputs, {} outputs)", model_path.display(), session.inputs.len(), session.outputs.len());
    Ok(session)
}

fn runtime_error(err: impl Display) -> anyhow::Error {
    anyhow!("{err}")
}
