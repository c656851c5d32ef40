use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array3, Array4, Ix3};
use ort::inputs;
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use super::found_face::FoundFace;
use super::post_process::{post_process, Thresholds};
use crate::onnx::{load_session, SessionOptions};

const MEAN_BGR: [f32; 3] = [104.0, 117.0, 123.0];

#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    pub max_image_size: u32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
}

pub struct RetinaFaceFaceDetector {
    session: Session,
    settings: DetectorSettings,
}

impl RetinaFaceFaceDetector {
    pub fn new(model_path: &Path, options: SessionOptions, settings: DetectorSettings) -> Result<RetinaFaceFaceDetector> {
        Ok(RetinaFaceFaceDetector { session: load_session(model_path, options)?, settings })
    }

    /// Finds faces in `image`; boxes come back in `image` pixels.
    pub fn infer(&mut self, image: &RgbImage) -> Result<Vec<FoundFace>> {
        let (resized, scale) = fit_within(image, self.settings.max_image_size);
        let input_size = [resized.height() as usize, resized.width() as usize];
        let tensor = Tensor::from_array(transform(&resized))?;

        let now = Instant::now();
        let model_res = self.session.run(inputs!["input" => tensor])?;
        debug!("Inferred time: {:?}", now.elapsed());

        let extract = |label: &str| -> Result<Array3<f32>> {
            let value = model_res.get(label).ok_or_else(|| anyhow!("detector output '{}' is missing", label))?;
            Ok(value.try_extract_array::<f32>()?.into_dimensionality::<Ix3>()?.to_owned())
        };
        let [loc, confidence] = [extract("bbox")?, extract("confidence")?];

        let post_processing_time = Instant::now();
        let thresholds = Thresholds {
            confidence: self.settings.confidence_threshold,
            nms: self.settings.nms_threshold,
        };
        let faces = post_process(loc, confidence, input_size, &thresholds)?
            .into_iter()
            .map(|face| FoundFace { bbox: face.bbox.map(|v| v / scale), score: face.score })
            .collect::<Vec<_>>();
        debug!("Post processed time: {:?}", post_processing_time.elapsed());
        Ok(faces)
    }
}

/// Shrinks `image` so its longest side is at most `max_size`, returning the scale applied.
pub fn fit_within(image: &RgbImage, max_size: u32) -> (RgbImage, f32) {
    let longest = image.width().max(image.height());
    if max_size == 0 || longest <= max_size {
        return (image.clone(), 1.0);
    }
    let scale = max_size as f32 / longest as f32;
    let width = ((image.width() as f32 * scale).round() as u32).max(1);
    let height = ((image.height() as f32 * scale).round() as u32).max(1);
    (image::imageops::resize(image, width, height, FilterType::Triangle), scale)
}

/// NCHW, BGR, mean subtracted.
pub fn transform(image: &RgbImage) -> Array4<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    Array4::from_shape_fn((1, 3, height, width), |(_, c, h, w)| {
        let pixel = image.get_pixel(w as u32, h as u32);
        pixel[2 - c] as f32 - MEAN_BGR[c]
    })
}
