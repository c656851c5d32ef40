use std::any::Any;
use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::request::{parse_request, Command};
use super::response::{Response, ERROR_ID};
use crate::analysis::Analysis;
use crate::emotion::model::{EmotionModel, ModelInfo};
use crate::image_input::decode_base64_image;
use crate::pipeline::detect_in_image;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Line-delimited JSON front end around one model handle.
pub struct Server<M> {
    model: M,
    info: ModelInfo,
}

impl<M: EmotionModel> Server<M> {
    pub fn new(model: M) -> Server<M> {
        let info = model.info();
        Server { model, info }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Answers one input line. Never fails: every problem becomes an error response.
    pub fn handle_line(&mut self, line: &str) -> (Response, Flow) {
        let fields = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return (Response::malformed("request must be a JSON object"), Flow::Continue),
            Err(err) => return (Response::malformed(format!("invalid JSON: {err}")), Flow::Continue),
        };
        let request = parse_request(&fields);
        let id = request.id.clone();

        let command = match request.command {
            Ok(command) => command,
            Err(error) => return (Response::failure(id, error), Flow::Continue),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request.id, command)));
        match outcome {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Request {} panicked: {}", id, message);
                let id = if id.is_null() { Value::from(ERROR_ID) } else { id };
                (Response::failure(id, format!("unhandled error: {message}")), Flow::Continue)
            }
        }
    }

    fn dispatch(&mut self, id: Value, command: Command) -> (Response, Flow) {
        match command {
            Command::Ping => (Response::status(id, &self.info), Flow::Continue),
            Command::Exit => (Response::farewell(id), Flow::Stop),
            Command::Detect { image: None } => (Response::failure(id, "no image provided"), Flow::Continue),
            Command::Detect { image: Some(image) } => {
                let response = match self.detect(&image) {
                    Ok(analysis) => Response::detection(id, analysis),
                    Err(err) => {
                        debug!("Detection failed: {:#}", err);
                        Response::detection_failure(id, format!("failed to process image: {err:#}"))
                    }
                };
                (response, Flow::Continue)
            }
        }
    }

    fn detect(&mut self, payload: &str) -> Result<Analysis> {
        let image = decode_base64_image(payload)?;
        detect_in_image(&mut self.model, &image)
    }

    /// Reads requests until `exit` or end of input, answering each on its own line.
    pub fn serve<R: BufRead, W: Write>(&mut self, mut reader: R, mut writer: W) -> Result<()> {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let read = reader.read_until(b'\n', &mut buffer).context("failed to read request")?;
            if read == 0 {
                info!("End of input");
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buffer);
            let (response, flow) = self.handle_line(line.trim());
            write_response(&mut writer, &response)?;
            if flow == Flow::Stop {
                info!("Exit requested");
                return Ok(());
            }
        }
    }
}

pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    serde_json::to_writer(&mut *writer, response).context("failed to serialize response")?;
    writer.write_all(b"\n").context("failed to write response")?;
    writer.flush().context("failed to flush response")?;
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::model::FaceEmotions;
    use image::RgbImage;
    use serde_json::json;

    struct Blind;

    impl EmotionModel for Blind {
        fn info(&self) -> ModelInfo {
            ModelInfo { detector: "blind".to_string(), backend: "none".to_string() }
        }

        fn detect_emotions(&mut self, _image: &RgbImage) -> Result<Vec<FaceEmotions>> {
            Ok(vec![])
        }
    }

    fn answer(line: &str) -> (Value, Flow) {
        let (response, flow) = Server::new(Blind).handle_line(line);
        (serde_json::to_value(response).unwrap(), flow)
    }

    #[test]
    fn invalid_json_is_answered_with_error_id() {
        let (json, flow) = answer("{not json");
        assert_eq!(json["id"], json!("error"));
        assert_eq!(json["success"], json!(false));
        assert!(json["error"].as_str().unwrap().starts_with("invalid JSON"));
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn non_object_json_is_rejected() {
        let (json, _) = answer("[1, 2]");
        assert_eq!(json["error"], json!("request must be a JSON object"));
    }

    #[test]
    fn exit_stops_the_loop() {
        let (json, flow) = answer(r#"{"id": "x", "command": "exit"}"#);
        assert_eq!(json, json!({"id": "x", "status": "goodbye"}));
        assert_eq!(flow, Flow::Stop);
    }

    #[test]
    fn detect_without_image_is_an_error_response() {
        let (json, flow) = answer(r#"{"id": "d", "command": "detect"}"#);
        assert_eq!(json, json!({"id": "d", "success": false, "error": "no image provided"}));
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn undecodable_image_keeps_the_faces_field() {
        let (json, _) = answer(r#"{"id": "d", "command": "detect", "image": "%%%"}"#);
        assert_eq!(json["success"], json!(false));
        assert_eq!(json["faces"], json!([]));
        assert!(json["error"].as_str().unwrap().starts_with("failed to process image"));
    }

    #[test]
    fn panic_payloads_become_text() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&5u8), "panic");
    }
}
