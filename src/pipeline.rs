use std::time::Instant;

use anyhow::Result;
use image::RgbImage;
use tracing::debug;

use crate::analysis::{analyze, Analysis};
use crate::emotion::model::EmotionModel;
use crate::image_input::decode_image;

pub fn detect_in_image<M: EmotionModel + ?Sized>(model: &mut M, image: &RgbImage) -> Result<Analysis> {
    let now = Instant::now();
    let faces = model.detect_emotions(image)?;
    debug!("Detected {} face(s) in {}x{} image in {:?}", faces.len(), image.width(), image.height(), now.elapsed());
    analyze(faces, image.width(), image.height())
}

pub fn detect_in_bytes<M: EmotionModel + ?Sized>(model: &mut M, bytes: &[u8]) -> Result<Analysis> {
    let image = decode_image(bytes)?;
    detect_in_image(model, &image)
}
