use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info};

use super::classifier::EmotionClassifier;
use super::Emotion;
use crate::config::ModelConfig;
use crate::onnx::SessionOptions;
use crate::retinaface::{BoundingBox, RetinaFaceFaceDetector};

/// Raw engine output for one face: its box and the scores in classifier order.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEmotions {
    pub bounding_box: BoundingBox,
    pub scores: Vec<(Emotion, f32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub detector: String,
    pub backend: String,
}

/// Face detection plus emotion classification over a decoded RGB image.
pub trait EmotionModel {
    fn info(&self) -> ModelInfo;

    fn detect_emotions(&mut self, image: &RgbImage) -> Result<Vec<FaceEmotions>>;
}

impl<M: EmotionModel + ?Sized> EmotionModel for Box<M> {
    fn info(&self) -> ModelInfo {
        (**self).info()
    }

    fn detect_emotions(&mut self, image: &RgbImage) -> Result<Vec<FaceEmotions>> {
        (**self).detect_emotions(image)
    }
}

pub struct OnnxEmotionModel {
    detector: RetinaFaceFaceDetector,
    classifier: EmotionClassifier,
}

impl OnnxEmotionModel {
    pub fn new(config: &ModelConfig) -> Result<OnnxEmotionModel> {
        let options = SessionOptions { intra_threads: config.threads, cuda: config.cuda };
        let face_model = config.face_model_path()?;
        let emotion_model = config.emotion_model_path()?;
        info!("Loading face detector from {}", face_model.display());
        let detector = RetinaFaceFaceDetector::new(&face_model, options, config.detector_settings())
            .context("face detector initialization failed")?;
        info!("Loading emotion classifier from {}", emotion_model.display());
        let classifier = EmotionClassifier::new(&emotion_model, options, config.emotion_input_size, config.emotion_input_layout)
            .context("emotion classifier initialization failed")?;
        Ok(OnnxEmotionModel { detector, classifier })
    }
}

impl EmotionModel for OnnxEmotionModel {
    fn info(&self) -> ModelInfo {
        ModelInfo { detector: "retinaface".to_string(), backend: "onnxruntime".to_string() }
    }

    fn detect_emotions(&mut self, image: &RgbImage) -> Result<Vec<FaceEmotions>> {
        let found = self.detector.infer(image)?;
        debug!("{} face(s) found", found.len());
        let mut faces = Vec::with_capacity(found.len());
        for face in found {
            let bounding_box = face.bounding_box(image.width(), image.height());
            if bounding_box.area() == 0 {
                debug!("Skipping degenerate face {:?}", face);
                continue;
            }
            let scores = self.classifier.classify(image, &bounding_box)?;
            faces.push(FaceEmotions { bounding_box, scores });
        }
        Ok(faces)
    }
}
