pub mod analysis;
pub mod config;
pub mod emotion;
pub mod image_input;
pub mod onnx;
pub mod pipeline;
pub mod protocol;
pub mod retinaface;

use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, Result};

use config::ModelConfig;
use emotion::model::OnnxEmotionModel;

/// Builds the ONNX engine, turning a panic inside the runtime loader into an error.
pub fn load_model(config: &ModelConfig) -> Result<OnnxEmotionModel> {
    match panic::catch_unwind(AssertUnwindSafe(|| OnnxEmotionModel::new(config))) {
        Ok(model) => model,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "ONNX Runtime panicked while loading".to_string());
            Err(anyhow!(message))
        }
    }
}
