// Largely inspired by lsnms: https://github.com/remydubois/lsnms

use std::cmp::Ordering;

use ndarray::{ArrayView1, ArrayView2, Axis};
use num_traits::{Num, ToPrimitive};

#[inline(always)]
fn min<N: PartialOrd>(a: N, b: N) -> N {
    if a < b { a } else { b }
}

#[inline(always)]
fn max<N: PartialOrd>(a: N, b: N) -> N {
    if a > b { a } else { b }
}

#[inline(always)]
pub fn area<N>(bx: N, by: N, bxx: N, byy: N) -> N
where
    N: Num + PartialOrd + ToPrimitive,
{
    (bxx - bx) * (byy - by)
}

/// Non-maximum suppression over xyxy `boxes`, best score first.
///
/// Boxes scoring below `score_threshold` are dropped before suppression, and a
/// box is suppressed when its IoU with an already kept box exceeds
/// `iou_threshold`. Returns the kept row indices in descending score order.
pub fn nms<'a, N, BA, SA>(boxes: BA, scores: SA, iou_threshold: f64, score_threshold: f64) -> Vec<usize>
where
    N: Num + PartialOrd + ToPrimitive + Copy + 'a,
    BA: Into<ArrayView2<'a, N>>,
    SA: Into<ArrayView1<'a, f64>>,
{
    let boxes = boxes.into();
    let scores = scores.into();
    debug_assert_eq!(boxes.nrows(), scores.len_of(Axis(0)));

    let mut order: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score >= score_threshold)
        .map(|(idx, _)| idx)
        .collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let mut keep = Vec::new();
    let mut suppress = vec![false; order.len()];

    for (i, &idx) in order.iter().enumerate() {
        if suppress[i] {
            continue;
        }
        keep.push(idx);
        let box1 = boxes.row(idx);
        let (b1x, b1y, b1xx, b1yy) = (box1[0], box1[1], box1[2], box1[3]);
        let area1 = area(b1x, b1y, b1xx, b1yy);
        for j in (i + 1)..order.len() {
            if suppress[j] {
                continue;
            }
            let box2 = boxes.row(order[j]);
            let (b2x, b2y, b2xx, b2yy) = (box2[0], box2[1], box2[2], box2[3]);

            let x = max(b1x, b2x);
            let y = max(b1y, b2y);
            let xx = min(b1xx, b2xx);
            let yy = min(b1yy, b2yy);
            if x > xx || y > yy {
                continue;
            }
            let intersection = area(x, y, xx, yy);
            let union = area1 + area(b2x, b2y, b2xx, b2yy) - intersection;
            let (Some(intersection), Some(union)) = (intersection.to_f64(), union.to_f64()) else {
                continue;
            };
            if union > 0.0 && intersection / union > iou_threshold {
                suppress[j] = true;
            }
        }
    }
    keep
}
