//! Newline-delimited JSON over stdin/stdout: one request per line, one response per line.

pub mod request;
pub mod response;
pub mod server;

pub use request::{Command, Request};
pub use response::Response;
pub use server::{write_response, Flow, Server};
