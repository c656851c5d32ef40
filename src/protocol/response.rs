use serde::Serialize;
use serde_json::Value;

use crate::analysis::{Analysis, DetectedFace, Summary};
use crate::emotion::model::ModelInfo;
use crate::emotion::Emotion;

pub const ERROR_ID: &str = "error";
pub const NO_FACE_MESSAGE: &str = "no face detected";
pub const FEATURES: [&str; 3] = ["face_detection", "emotion_recognition", "multi_face"];

/// Everything written to stdout is one of these, serialized on one line.
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum Response {
    Ready(Ready),
    StartupFailure(StartupFailure),
    Reply(Reply),
}

/// An answer to one request: its `id` followed by the command-specific fields.
#[derive(Serialize, Debug, Clone)]
pub struct Reply {
    pub id: Value,
    #[serde(flatten)]
    pub body: Body,
}

#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum Body {
    Status(Status),
    Detection(Detection),
    Failure(Failure),
    Farewell(Farewell),
}

#[derive(Serialize, Debug, Clone)]
pub struct Ready {
    pub status: &'static str,
    pub detector: String,
    pub backend: String,
    pub features: [&'static str; 3],
}

#[derive(Serialize, Debug, Clone)]
pub struct StartupFailure {
    pub status: &'static str,
    pub error: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct Status {
    pub status: &'static str,
    pub detector: String,
    pub initialized: bool,
    pub capabilities: Capabilities,
}

#[derive(Serialize, Debug, Clone)]
pub struct Capabilities {
    pub multiface: bool,
    pub emotions: Vec<&'static str>,
    pub confidence_scores: bool,
    pub bounding_boxes: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct Detection {
    pub success: bool,
    pub faces: Vec<DetectedFace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Failure {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faces: Option<Vec<DetectedFace>>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Farewell {
    pub status: &'static str,
}

impl Response {
    pub fn ready(info: &ModelInfo) -> Response {
        Response::Ready(Ready {
            status: "initialized",
            detector: info.detector.clone(),
            backend: info.backend.clone(),
            features: FEATURES,
        })
    }

    pub fn startup_failure(error: &anyhow::Error) -> Response {
        Response::StartupFailure(StartupFailure {
            status: "error",
            error: format!("initialization failed: {error:#}"),
        })
    }

    pub fn status(id: Value, info: &ModelInfo) -> Response {
        let body = Body::Status(Status {
            status: "alive",
            detector: info.detector.clone(),
            initialized: true,
            capabilities: Capabilities {
                multiface: true,
                emotions: Emotion::labels(),
                confidence_scores: true,
                bounding_boxes: true,
            },
        });
        Response::Reply(Reply { id, body })
    }

    pub fn detection(id: Value, analysis: Analysis) -> Response {
        let message = analysis.faces.is_empty().then_some(NO_FACE_MESSAGE);
        let body = Body::Detection(Detection {
            success: true,
            faces: analysis.faces,
            summary: analysis.summary,
            message,
        });
        Response::Reply(Reply { id, body })
    }

    pub fn failure(id: Value, error: impl Into<String>) -> Response {
        let body = Body::Failure(Failure { success: false, error: error.into(), faces: None });
        Response::Reply(Reply { id, body })
    }

    /// A failed detect keeps the `faces` field so clients can read it unconditionally.
    pub fn detection_failure(id: Value, error: impl Into<String>) -> Response {
        let body = Body::Failure(Failure { success: false, error: error.into(), faces: Some(vec![]) });
        Response::Reply(Reply { id, body })
    }

    pub fn farewell(id: Value) -> Response {
        Response::Reply(Reply { id, body: Body::Farewell(Farewell { status: "goodbye" }) })
    }

    /// For lines that could not be read as a request at all.
    pub fn malformed(error: impl Into<String>) -> Response {
        Response::failure(Value::from(ERROR_ID), error)
    }
}
