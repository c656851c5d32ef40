use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Args;
use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;

use crate::emotion::classifier::TensorLayout;
use crate::retinaface::DetectorSettings;

pub const FACE_MODEL_FILE: &str = "retinaface.onnx";
pub const EMOTION_MODEL_FILE: &str = "emotion.onnx";
const DEFAULT_LOG_FILTER: &str = "warn,ort=error";

#[derive(Args, Debug, Clone)]
pub struct ModelConfig {
    /// RetinaFace ONNX model
    #[arg(long, env = "EMOTION_DETECTOR_FACE_MODEL")]
    pub face_model: Option<PathBuf>,

    /// Facial expression ONNX model (7 classes)
    #[arg(long, env = "EMOTION_DETECTOR_EMOTION_MODEL")]
    pub emotion_model: Option<PathBuf>,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "EMOTION_DETECTOR_THREADS", default_value_t = 1)]
    pub threads: usize,

    /// Longest image side fed to the face detector
    #[arg(long, default_value_t = 640)]
    pub max_image_size: u32,

    #[arg(long, default_value_t = 0.7)]
    pub face_threshold: f32,

    #[arg(long, default_value_t = 0.4)]
    pub nms_threshold: f32,

    /// Side of the square grayscale crop fed to the emotion model
    #[arg(long, default_value_t = 64)]
    pub emotion_input_size: u32,

    #[arg(long, value_enum, default_value_t = TensorLayout::Nhwc)]
    pub emotion_input_layout: TensorLayout,

    /// Try the CUDA execution provider before the CPU one
    #[arg(long)]
    pub cuda: bool,
}

impl ModelConfig {
    pub fn face_model_path(&self) -> Result<PathBuf> {
        resolve(&self.face_model, FACE_MODEL_FILE)
    }

    pub fn emotion_model_path(&self) -> Result<PathBuf> {
        resolve(&self.emotion_model, EMOTION_MODEL_FILE)
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            max_image_size: self.max_image_size,
            confidence_threshold: self.face_threshold,
            nms_threshold: self.nms_threshold,
        }
    }
}

/// `<data dir>/models`, e.g. `~/.local/share/emotion_detector/models` on Linux.
pub fn model_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "emotion_detector").map(|dirs| dirs.data_dir().join("models"))
}

fn resolve(explicit: &Option<PathBuf>, file_name: &str) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.clone()),
        None => model_dir()
            .map(|dir| dir.join(file_name))
            .ok_or_else(|| anyhow!("no home directory to look for {} in; pass the model path explicitly", file_name)),
    }
}

/// Logs go to stderr; stdout carries the protocol.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        model: ModelConfig,
    }

    #[test]
    fn defaults_match_the_detector_tuning() {
        let cli = Cli::try_parse_from(["emotion_detector"]).unwrap();
        let settings = cli.model.detector_settings();
        assert_eq!(settings.max_image_size, 640);
        assert_eq!(settings.confidence_threshold, 0.7);
        assert_eq!(settings.nms_threshold, 0.4);
        assert_eq!(cli.model.emotion_input_layout, TensorLayout::Nhwc);
    }

    #[test]
    fn explicit_paths_win() {
        let cli = Cli::try_parse_from([
            "emotion_detector",
            "--face-model",
            "/tmp/face.onnx",
            "--emotion-input-layout",
            "nchw",
        ])
        .unwrap();
        assert_eq!(cli.model.face_model_path().unwrap(), PathBuf::from("/tmp/face.onnx"));
        assert_eq!(cli.model.emotion_input_layout, TensorLayout::Nchw);
    }
}
