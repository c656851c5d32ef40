use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};

pub const UNKNOWN_ID: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Detect { image: Option<String> },
    Ping,
    Exit,
}

/// One parsed input line. `id` is echoed back untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Value,
    pub command: Result<Command, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CommandName {
    Detect,
    Ping,
    Exit,
}

impl FromStr for CommandName {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "detect" => Ok(Self::Detect),
            "ping" => Ok(Self::Ping),
            "exit" => Ok(Self::Exit),
            other => bail!("unknown command: {}", other),
        }
    }
}

/// Parses a request object. Problems with the command are kept on the request
/// so the caller can still answer with the right `id`.
pub fn parse_request(fields: &Map<String, Value>) -> Request {
    let id = fields.get("id").cloned().unwrap_or_else(|| Value::from(UNKNOWN_ID));
    let command = parse_command(fields).map_err(|err| err.to_string());
    Request { id, command }
}

fn parse_command(fields: &Map<String, Value>) -> Result<Command> {
    let name = match fields.get("command") {
        None | Some(Value::Null) => bail!("missing command"),
        Some(Value::String(name)) => name.parse::<CommandName>()?,
        Some(_) => return Err(anyhow!("command must be a string")),
    };
    Ok(match name {
        CommandName::Detect => Command::Detect {
            image: fields
                .get("image")
                .and_then(Value::as_str)
                .filter(|image| !image.trim().is_empty())
                .map(str::to_owned),
        },
        CommandName::Ping => Command::Ping,
        CommandName::Exit => Command::Exit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Request {
        parse_request(value.as_object().unwrap())
    }

    #[test]
    fn id_defaults_to_unknown() {
        assert_eq!(parse(json!({"command": "ping"})).id, json!("unknown"));
        assert_eq!(parse(json!({"id": 7, "command": "ping"})).id, json!(7));
    }

    #[test]
    fn recognises_commands() {
        assert_eq!(parse(json!({"command": "ping"})).command, Ok(Command::Ping));
        assert_eq!(parse(json!({"command": "exit"})).command, Ok(Command::Exit));
        assert_eq!(
            parse(json!({"command": "detect", "image": "aGk="})).command,
            Ok(Command::Detect { image: Some("aGk=".to_string()) })
        );
    }

    #[test]
    fn blank_or_non_string_image_counts_as_missing() {
        for image in [json!(""), json!("   "), json!(42), Value::Null] {
            assert_eq!(
                parse(json!({"command": "detect", "image": image})).command,
                Ok(Command::Detect { image: None })
            );
        }
    }

    #[test]
    fn command_problems_are_described() {
        assert_eq!(parse(json!({"id": "a"})).command, Err("missing command".to_string()));
        assert_eq!(parse(json!({"command": 3})).command, Err("command must be a string".to_string()));
        assert_eq!(parse(json!({"command": "dance"})).command, Err("unknown command: dance".to_string()));
    }
}
