//! Wire messages exchanged with the annotation service and their codec.
//!
//! Every frame is a JSON object carrying a `type` discriminator, except the
//! plain-text progress lines the service prefixes with `[log]`. Decoding is
//! total: anything that does not match a known shape comes back as
//! [`Message::RawUnparsed`] so callers never have to handle a decode error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::AnnotatedAction;

/// Prefix of the service's plain-text progress frames.
pub const PROGRESS_PREFIX: &str = "[log]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub url: String,
    pub instruction: String,
    pub max_steps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub log_text: String,
}

/// Full snapshot of the agent log so far. Replaces, never extends, the
/// previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTextUpdate {
    #[serde(rename = "log_text", alias = "text")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    #[serde(rename = "annotated_combined", alias = "annotated_actions")]
    pub annotated_actions: Vec<AnnotatedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    AgentRequest(AgentRequest),
    AnalyzeRequest(AnalyzeRequest),
    LogTextUpdate(LogTextUpdate),
    FinalResult(FinalResult),
    ErrorNotice(ErrorNotice),
    /// `[log] ...` progress line.
    Progress { line: String },
    /// Anything that did not decode into a known variant, verbatim.
    RawUnparsed { payload: String },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::AgentRequest(_) => "agent_request",
            Message::AnalyzeRequest(_) => "analyze_request",
            Message::LogTextUpdate(_) => "agent_log_text",
            Message::FinalResult(_) => "final_result",
            Message::ErrorNotice(_) => "error",
            Message::Progress { .. } => "progress",
            Message::RawUnparsed { .. } => "raw",
        }
    }

    /// `FinalResult` and `ErrorNotice` end the active phase of a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::FinalResult(_) | Message::ErrorNotice(_))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    AgentRequest(AgentRequest),
    AnalyzeRequest(AnalyzeRequest),
    #[serde(rename = "agent_log_text")]
    LogText(LogTextUpdate),
    FinalResult(FinalResult),
    Error(ErrorNotice),
}

const KNOWN_TYPES: &[&str] = &[
    "agent_request",
    "analyze_request",
    "agent_log_text",
    "final_result",
    "error",
];

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::AgentRequest(r) => Message::AgentRequest(r),
            Frame::AnalyzeRequest(r) => Message::AnalyzeRequest(r),
            Frame::LogText(u) => Message::LogTextUpdate(u),
            Frame::FinalResult(r) => Message::FinalResult(r),
            Frame::Error(e) => Message::ErrorNotice(e),
        }
    }
}

/// Serialize a message to its wire frame.
pub fn encode(message: &Message) -> Result<String> {
    let frame = match message {
        Message::AgentRequest(r) => Frame::AgentRequest(r.clone()),
        Message::AnalyzeRequest(r) => Frame::AnalyzeRequest(r.clone()),
        Message::LogTextUpdate(u) => Frame::LogText(u.clone()),
        Message::FinalResult(r) => Frame::FinalResult(r.clone()),
        Message::ErrorNotice(e) => Frame::Error(e.clone()),
        Message::Progress { line } => return Ok(format!("{} {}", PROGRESS_PREFIX, line)),
        Message::RawUnparsed { payload } => return Ok(payload.clone()),
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Parse a wire frame. Never fails.
pub fn decode(frame: &str) -> Message {
    if let Some(line) = frame.strip_prefix(PROGRESS_PREFIX) {
        return Message::Progress {
            line: line.trim().to_string(),
        };
    }

    let value: Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(_) => return raw(frame),
    };

    let known = value
        .get("type")
        .and_then(Value::as_str)
        .map(|t| KNOWN_TYPES.contains(&t))
        .unwrap_or(false);
    if !known {
        debug!(
            msg_type = ?value.get("type"),
            "Frame without a recognised type, keeping it as raw text"
        );
        return raw(frame);
    }

    match serde_json::from_value::<Frame>(value) {
        Ok(frame) => frame.into(),
        Err(e) => {
            warn!(error = %e, "Malformed frame, keeping it as raw text");
            raw(frame)
        }
    }
}

fn raw(frame: &str) -> Message {
    Message::RawUnparsed {
        payload: frame.to_string(),
    }
}
