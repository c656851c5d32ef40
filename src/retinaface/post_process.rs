use anyhow::{ensure, Result};
use itertools::iproduct;
use ndarray::{concatenate, s, Array1, Array2, Array3, ArrayView2, Axis};

use super::found_face::FoundFace;
use super::nms::nms;

const MIN_SIZES: [&[usize]; 3] = [&[16, 32], &[64, 128], &[256, 512]];
const STEPS: [usize; 3] = [8, 16, 32];
const VARIANCE: [f32; 2] = [0.1, 0.2];

/// Anchors as `[cx, cy, w, h]`, normalised to the input size.
pub fn prior_box(image_size: [usize; 2]) -> Array2<f32> {
    let [height, width] = image_size;
    let mut anchors: Vec<f32> = vec![];
    for (k, &step) in STEPS.iter().enumerate() {
        let rows = (height as f32 / step as f32).ceil() as usize;
        let cols = (width as f32 / step as f32).ceil() as usize;
        for (i, j, &min_size) in iproduct!(0..rows, 0..cols, MIN_SIZES[k]) {
            let s_kx = min_size as f32 / width as f32;
            let s_ky = min_size as f32 / height as f32;
            let cx = (j as f32 + 0.5) * step as f32 / width as f32;
            let cy = (i as f32 + 0.5) * step as f32 / height as f32;
            anchors.extend_from_slice(&[cx, cy, s_kx, s_ky]);
        }
    }
    let count = anchors.len() / 4;
    Array2::from_shape_vec((count, 4), anchors).unwrap_or_else(|_| Array2::zeros((0, 4)))
}

/// Turns box regressions into xyxy corners, normalised to the input size.
pub fn decode(loc: ArrayView2<f32>, priors: ArrayView2<f32>) -> Result<Array2<f32>> {
    let centers = &priors.slice(s![.., ..2]) + &(&loc.slice(s![.., ..2]) * VARIANCE[0] * &priors.slice(s![.., 2..]));
    let sizes = &priors.slice(s![.., 2..]) * &loc.slice(s![.., 2..]).mapv(|v| (v * VARIANCE[1]).exp());
    let top_left = &centers - &(&sizes / 2.0);
    let bottom_right = &top_left + &sizes;
    Ok(concatenate(Axis(1), &[top_left.view(), bottom_right.view()])?)
}

pub fn softmax(logits: &mut Array3<f32>) {
    for mut lane in logits.lanes_mut(Axis(2)) {
        let max = lane.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        if sum > 0.0 {
            lane.mapv_inplace(|v| v / sum);
        }
    }
}

pub struct Thresholds {
    pub confidence: f32,
    pub nms: f32,
}

/// Decodes one image of RetinaFace output into faces in input-tensor pixels.
///
/// `loc` is `[1, N, 4]` and `confidence` is `[1, N, 2]` raw logits.
pub fn post_process(
    loc: Array3<f32>,
    mut confidence: Array3<f32>,
    input_size: [usize; 2],
    thresholds: &Thresholds,
) -> Result<Vec<FoundFace>> {
    let priors = prior_box(input_size);
    ensure!(
        loc.shape()[1] == priors.nrows() && confidence.shape()[1] == priors.nrows(),
        "detector produced {} boxes for {} priors",
        loc.shape()[1],
        priors.nrows()
    );
    let [height, width] = input_size;

    softmax(&mut confidence);
    let scale = Array1::from(vec![width as f32, height as f32, width as f32, height as f32]);
    let boxes = decode(loc.slice(s![0, .., ..]), priors.view())? * &scale;
    let scores = confidence.slice(s![0, .., 1]).to_owned();

    let valid_index = scores
        .iter()
        .enumerate()
        .filter(|(_, &val)| val > thresholds.confidence)
        .map(|(order, _)| order)
        .collect::<Vec<_>>();
    let boxes = boxes.select(Axis(0), &valid_index);
    let scores = scores.select(Axis(0), &valid_index);

    let keep = nms(&boxes, &scores.mapv(|x| x as f64), thresholds.nms as f64, thresholds.confidence as f64);

    Ok(keep
        .into_iter()
        .map(|index| {
            let row = boxes.row(index);
            FoundFace { bbox: [row[0], row[1], row[2], row[3]], score: scores[index] }
        })
        .collect())
}
