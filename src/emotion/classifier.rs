use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, ensure, Result};
use clap::ValueEnum;
use image::imageops::{crop_imm, grayscale, resize, FilterType};
use image::{GrayImage, RgbImage};
use ndarray::Array4;
use ort::inputs;
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use super::Emotion;
use crate::onnx::{load_session, SessionOptions};
use crate::retinaface::BoundingBox;

/// Pixels added around a detected face before cropping.
pub const CROP_MARGIN: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

pub struct EmotionClassifier {
    session: Session,
    input_name: String,
    output_name: String,
    input_size: u32,
    layout: TensorLayout,
}

impl EmotionClassifier {
    pub fn new(model_path: &Path, options: SessionOptions, input_size: u32, layout: TensorLayout) -> Result<EmotionClassifier> {
        ensure!(input_size > 0, "emotion input size must be positive");
        let session = load_session(model_path, options)?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| anyhow!("emotion model has no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| anyhow!("emotion model has no outputs"))?;
        Ok(EmotionClassifier { session, input_name, output_name, input_size, layout })
    }

    /// Scores one face of `image`, in [`Emotion::ALL`] order.
    pub fn classify(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Vec<(Emotion, f32)>> {
        let region = expand_box(face, CROP_MARGIN, image.width(), image.height());
        ensure!(region.width > 0 && region.height > 0, "face box {:?} is empty", face);
        let crop = crop_imm(image, region.x, region.y, region.width, region.height).to_image();
        let gray = resize(&grayscale(&crop), self.input_size, self.input_size, FilterType::Triangle);
        let tensor = Tensor::from_array(to_tensor(&gray, self.layout))?;

        let now = Instant::now();
        let outputs = self.session.run(inputs![self.input_name.as_str() => tensor])?;
        let scores = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("emotion output '{}' is missing", self.output_name))?
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect::<Vec<_>>();
        debug!("Classified face {:?} in {:?}", face, now.elapsed());

        ensure!(
            scores.len() == Emotion::ALL.len(),
            "emotion model returned {} scores, expected {}",
            scores.len(),
            Emotion::ALL.len()
        );
        Ok(Emotion::ALL.into_iter().zip(normalize(scores)).collect())
    }
}

/// Grows `face` by `margin` on every side, clamped to the image.
pub fn expand_box(face: &BoundingBox, margin: u32, width: u32, height: u32) -> BoundingBox {
    let x = face.x.saturating_sub(margin).min(width);
    let y = face.y.saturating_sub(margin).min(height);
    let right = face.x.saturating_add(face.width).saturating_add(margin).min(width);
    let bottom = face.y.saturating_add(face.height).saturating_add(margin).min(height);
    BoundingBox { x, y, width: right.saturating_sub(x), height: bottom.saturating_sub(y) }
}

/// Maps gray levels to `[-1, 1]`.
pub fn to_tensor(gray: &GrayImage, layout: TensorLayout) -> Array4<f32> {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let value = |x: usize, y: usize| gray.get_pixel(x as u32, y as u32)[0] as f32 / 255.0 * 2.0 - 1.0;
    match layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, height, width, 1), |(_, h, w, _)| value(w, h)),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 1, height, width), |(_, _, h, w)| value(w, h)),
    }
}

/// Leaves probabilities alone and runs softmax over anything else.
pub fn normalize(scores: Vec<f32>) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    if scores.iter().all(|&v| (0.0..=1.0).contains(&v)) && (sum - 1.0).abs() < 1e-3 {
        return scores;
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = scores.iter().map(|v| (v - max).exp()).collect::<Vec<_>>();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn margin_is_clamped_at_the_edges() {
        let face = BoundingBox { x: 5, y: 40, width: 20, height: 50 };
        assert_eq!(
            expand_box(&face, CROP_MARGIN, 100, 95),
            BoundingBox { x: 0, y: 30, width: 35, height: 65 }
        );
    }

    #[test]
    fn tensor_layouts_put_the_channel_in_place() {
        let gray = GrayImage::from_fn(3, 2, |x, _| Luma([if x == 2 { 255 } else { 0 }]));
        let nhwc = to_tensor(&gray, TensorLayout::Nhwc);
        let nchw = to_tensor(&gray, TensorLayout::Nchw);
        assert_eq!(nhwc.shape(), &[1, 2, 3, 1]);
        assert_eq!(nchw.shape(), &[1, 1, 2, 3]);
        assert_eq!(nhwc[[0, 1, 2, 0]], 1.0);
        assert_eq!(nchw[[0, 0, 1, 0]], -1.0);
    }

    #[test]
    fn probabilities_pass_through() {
        let scores = vec![0.1, 0.0, 0.0, 0.6, 0.1, 0.1, 0.1];
        assert_eq!(normalize(scores.clone()), scores);
    }

    #[test]
    fn logits_are_softmaxed() {
        let scores = normalize(vec![2.0, -1.0, 0.0, 5.0, 1.0, 0.0, 3.0]);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(scores[3] > scores[6] && scores[6] > scores[0]);
    }
}
