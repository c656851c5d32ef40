//! Reshapes raw engine output into the per-face and per-image results sent to clients.

use std::cmp::Ordering;

use anyhow::{bail, Result};
use serde::ser::Serializer;
use serde::Serialize;

use crate::emotion::model::FaceEmotions;
use crate::emotion::Emotion;
use crate::retinaface::BoundingBox;

/// A second-ranked emotion is only reported above this confidence.
pub const SECONDARY_EMOTION_THRESHOLD: f32 = 0.1;

/// Share of the image a face must cover to reach full face confidence.
pub const FULL_CONFIDENCE_AREA_FRACTION: f64 = 0.3;

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct EmotionScore {
    pub emotion: Emotion,
    pub confidence: f32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFace {
    pub face_index: usize,
    pub bounding_box: BoundingBox,
    pub emotions: Vec<EmotionScore>,
    pub dominant_emotion: EmotionScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_emotion: Option<EmotionScore>,
    pub face_confidence: f64,
    pub emotion_intensity: f32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_faces: usize,
    pub dominant_emotion: Emotion,
    #[serde(serialize_with = "serialize_distribution")]
    pub emotion_distribution: Vec<(Emotion, f64)>,
    pub average_face_confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub faces: Vec<DetectedFace>,
    /// `None` exactly when `faces` is empty.
    pub summary: Option<Summary>,
}

/// `min(1, boxArea / (imageArea * 0.3))`; zero for an empty image.
pub fn face_confidence(bounding_box: &BoundingBox, image_width: u32, image_height: u32) -> f64 {
    let image_area = image_width as f64 * image_height as f64;
    if image_area == 0.0 {
        return 0.0;
    }
    f64::min(1.0, bounding_box.area() as f64 / (image_area * FULL_CONFIDENCE_AREA_FRACTION))
}

pub fn rank_emotions(scores: &[(Emotion, f32)]) -> Vec<EmotionScore> {
    let mut ranked = scores
        .iter()
        .map(|&(emotion, confidence)| EmotionScore { emotion, confidence })
        .collect::<Vec<_>>();
    // stable: ties keep classifier order
    ranked.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));
    ranked
}

pub fn analyze(raw_faces: Vec<FaceEmotions>, image_width: u32, image_height: u32) -> Result<Analysis> {
    let mut faces = Vec::with_capacity(raw_faces.len());
    for (face_index, raw) in raw_faces.into_iter().enumerate() {
        let emotions = rank_emotions(&raw.scores);
        let Some(&dominant_emotion) = emotions.first() else {
            bail!("no emotion scores for face {}", face_index);
        };
        let secondary_emotion = emotions
            .get(1)
            .copied()
            .filter(|score| score.confidence > SECONDARY_EMOTION_THRESHOLD);
        faces.push(DetectedFace {
            face_index,
            bounding_box: raw.bounding_box,
            face_confidence: face_confidence(&raw.bounding_box, image_width, image_height),
            emotion_intensity: dominant_emotion.confidence,
            emotions,
            dominant_emotion,
            secondary_emotion,
        });
    }
    let summary = summarize(&faces);
    Ok(Analysis { faces, summary })
}

fn summarize(faces: &[DetectedFace]) -> Option<Summary> {
    if faces.is_empty() {
        return None;
    }

    let mut totals: Vec<(Emotion, f64, usize)> = vec![];
    for score in faces.iter().flat_map(|face| &face.emotions) {
        match totals.iter_mut().find(|(emotion, _, _)| *emotion == score.emotion) {
            Some((_, sum, count)) => {
                *sum += score.confidence as f64;
                *count += 1;
            }
            None => totals.push((score.emotion, score.confidence as f64, 1)),
        }
    }
    let emotion_distribution = totals
        .into_iter()
        .map(|(emotion, sum, count)| (emotion, sum / count as f64))
        .collect::<Vec<_>>();

    // first maximum wins
    let (dominant_emotion, _) = emotion_distribution
        .iter()
        .copied()
        .fold(None, |best: Option<(Emotion, f64)>, candidate| match best {
            Some(best) if best.1 >= candidate.1 => Some(best),
            _ => Some(candidate),
        })?;

    let average_face_confidence = faces.iter().map(|face| face.face_confidence).sum::<f64>() / faces.len() as f64;

    Some(Summary {
        total_faces: faces.len(),
        dominant_emotion,
        emotion_distribution,
        average_face_confidence,
    })
}

fn serialize_distribution<S: Serializer>(distribution: &[(Emotion, f64)], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(distribution.iter().map(|(emotion, mean)| (emotion.as_str(), mean)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(bounding_box: BoundingBox, scores: [f32; 7]) -> FaceEmotions {
        FaceEmotions { bounding_box, scores: Emotion::ALL.into_iter().zip(scores).collect() }
    }

    fn bbox(width: u32, height: u32) -> BoundingBox {
        BoundingBox { x: 0, y: 0, width, height }
    }

    #[test]
    fn face_confidence_is_capped_at_one() {
        assert!((face_confidence(&bbox(10, 10), 100, 100) - 100.0 / 3000.0).abs() < 1e-12);
        assert_eq!(face_confidence(&bbox(80, 80), 100, 100), 1.0);
        assert_eq!(face_confidence(&bbox(10, 10), 0, 100), 0.0);
    }

    #[test]
    fn emotions_are_ranked_and_ties_keep_label_order() {
        let analysis = analyze(vec![raw(bbox(10, 10), [0.05, 0.05, 0.05, 0.6, 0.05, 0.05, 0.15])], 100, 100).unwrap();
        let face = &analysis.faces[0];
        let order = face.emotions.iter().map(|score| score.emotion).collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                Emotion::Happy,
                Emotion::Neutral,
                Emotion::Angry,
                Emotion::Disgust,
                Emotion::Fear,
                Emotion::Sad,
                Emotion::Surprise
            ]
        );
        assert_eq!(face.dominant_emotion, face.emotions[0]);
        assert_eq!(face.emotion_intensity, 0.6);
        assert_eq!(face.secondary_emotion.map(|score| score.emotion), Some(Emotion::Neutral));
    }

    #[test]
    fn secondary_emotion_needs_more_than_the_threshold() {
        let analysis = analyze(vec![raw(bbox(10, 10), [0.0, 0.0, 0.0, 0.9, 0.1, 0.0, 0.0])], 100, 100).unwrap();
        assert_eq!(analysis.faces[0].secondary_emotion, None);
        let json = serde_json::to_value(&analysis.faces[0]).unwrap();
        assert!(json.get("secondaryEmotion").is_none());
    }

    #[test]
    fn no_faces_means_no_summary() {
        let analysis = analyze(vec![], 100, 100).unwrap();
        assert!(analysis.faces.is_empty());
        assert!(analysis.summary.is_none());
    }

    #[test]
    fn summary_averages_across_faces() {
        let analysis = analyze(
            vec![
                raw(bbox(30, 10), [0.0, 0.0, 0.0, 0.8, 0.0, 0.0, 0.2]),
                raw(bbox(10, 10), [0.0, 0.0, 0.0, 0.2, 0.0, 0.0, 0.8]),
                raw(bbox(10, 30), [0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.5]),
            ],
            100,
            100,
        )
        .unwrap();
        let summary = analysis.summary.unwrap();
        assert_eq!(summary.total_faces, 3);
        let happy = summary.emotion_distribution.iter().find(|(e, _)| *e == Emotion::Happy).unwrap().1;
        let neutral = summary.emotion_distribution.iter().find(|(e, _)| *e == Emotion::Neutral).unwrap().1;
        assert!((happy - 0.5).abs() < 1e-6);
        assert!((neutral - 0.5).abs() < 1e-6);
        // tie resolved by first appearance: the first face ranks happy first
        assert_eq!(summary.dominant_emotion, Emotion::Happy);
        let expected = (0.1 + 100.0 / 3000.0 + 0.1) / 3.0;
        assert!((summary.average_face_confidence - expected).abs() < 1e-12);
        assert_eq!(summary.emotion_distribution.len(), 7);
    }

    #[test]
    fn distribution_serializes_as_an_ordered_map() {
        let analysis = analyze(vec![raw(bbox(10, 10), [0.1, 0.0, 0.0, 0.7, 0.0, 0.0, 0.2])], 100, 100).unwrap();
        let json = serde_json::to_value(analysis.summary.unwrap()).unwrap();
        let keys = json["emotionDistribution"].as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys[..3], ["happy", "neutral", "angry"]);
        assert_eq!(json["dominantEmotion"], json!("happy"));
        assert_eq!(json["totalFaces"], json!(1));
    }

    #[test]
    fn face_without_scores_is_an_error() {
        let face = FaceEmotions { bounding_box: bbox(10, 10), scores: vec![] };
        assert!(analyze(vec![face], 100, 100).is_err());
    }
}
