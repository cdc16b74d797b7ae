//! The session state machine.
//!
//! A [`Session`] is advanced only through [`Session::handle`], one event at a
//! time, and answers with the [`Effect`]s the caller has to carry out on the
//! channel. Once Completed or Failed it ignores everything.

use riskscope_core::message::{FinalResult, LogTextUpdate};
use riskscope_core::{Error, Message, Mode, Result};
use tracing::{debug, info, warn};

use crate::request::SessionRequest;
use crate::result::SessionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The channel finished opening.
    Opened,
    /// A decoded inbound frame.
    Frame(Message),
    /// The transport failed (including a failed open).
    TransportError(String),
    /// The channel was closed by the peer or the network.
    Closed(Option<u16>),
    /// The client ended the session without waiting for a result.
    TornDown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(Message),
    CloseChannel,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Connecting,
    Active,
    Completed(SessionResult),
    Failed,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    request: SessionRequest,
    phase: Phase,
    accumulated_log_text: String,
    error_log: Vec<String>,
    progress: Vec<String>,
    service_session_id: Option<String>,
    log_path: Option<String>,
    combined_path: Option<String>,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    pub fn new(request: SessionRequest) -> Self {
        let id = uuid::Uuid::new_v4()
            .to_string()
            .split('-')
            .next()
            .unwrap_or("session")
            .to_string();
        Self {
            id,
            request,
            phase: Phase::Idle,
            accumulated_log_text: String::new(),
            error_log: Vec::new(),
            progress: Vec::new(),
            service_session_id: None,
            log_path: None,
            combined_path: None,
            started_at: chrono::Utc::now(),
        }
    }

    /// Local identifier, used when the service does not report its own.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The service's session id when known, otherwise the local one.
    pub fn display_id(&self) -> &str {
        self.service_session_id.as_deref().unwrap_or(&self.id)
    }

    pub fn mode(&self) -> Mode {
        self.request.mode()
    }

    pub fn request(&self) -> &SessionRequest {
        &self.request
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Connecting => SessionState::Connecting,
            Phase::Active => SessionState::Active,
            Phase::Completed(_) => SessionState::Completed,
            Phase::Failed => SessionState::Failed,
        }
    }

    /// Present exactly when the state is Completed.
    pub fn result(&self) -> Option<&SessionResult> {
        match &self.phase {
            Phase::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn accumulated_log_text(&self) -> &str {
        &self.accumulated_log_text
    }

    pub fn error_log(&self) -> &[String] {
        &self.error_log
    }

    pub fn progress(&self) -> &[String] {
        &self.progress
    }

    pub fn service_session_id(&self) -> Option<&str> {
        self.service_session_id.as_deref()
    }

    pub fn log_path(&self) -> Option<&str> {
        self.log_path.as_deref()
    }

    pub fn combined_path(&self) -> Option<&str> {
        self.combined_path.as_deref()
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    /// Idle → Connecting, once a channel has been requested for this session.
    pub fn mark_connecting(&mut self) {
        if matches!(self.phase, Phase::Idle) {
            self.phase = Phase::Connecting;
        }
    }

    /// Apply one event and return what must happen on the channel.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        if self.state().is_terminal() {
            debug!(session = %self.id, event = ?event_name(&event), "Session finished, ignoring event");
            return Vec::new();
        }

        match event {
            SessionEvent::Opened => match self.phase {
                Phase::Connecting => {
                    self.phase = Phase::Active;
                    info!(session = %self.id, mode = %self.mode(), "Channel open, sending request");
                    vec![Effect::Send(self.request.initial_message())]
                }
                _ => {
                    debug!(session = %self.id, state = self.state().as_str(), "Unexpected open event");
                    Vec::new()
                }
            },
            SessionEvent::Frame(message) => {
                if matches!(self.phase, Phase::Idle) {
                    debug!(session = %self.id, "Frame before a channel was requested, ignoring");
                    return Vec::new();
                }
                self.on_message(message)
            }
            SessionEvent::TransportError(reason) => {
                self.fail(format!("Connection error: {}", reason))
            }
            SessionEvent::Closed(code) => {
                let detail = match code {
                    Some(code) => format!("code {}", code),
                    None => "no close code".to_string(),
                };
                self.fail(format!(
                    "Connection closed before a result arrived ({})",
                    detail
                ))
            }
            SessionEvent::TornDown => self.fail("Session ended before a result arrived".to_string()),
        }
    }

    fn on_message(&mut self, message: Message) -> Vec<Effect> {
        match message {
            Message::LogTextUpdate(update) => {
                self.on_log_text(update);
                Vec::new()
            }
            Message::FinalResult(result) => self.complete(result),
            Message::ErrorNotice(notice) => {
                warn!(session = %self.id, message = %notice.message, "Service reported an error");
                self.error_log.push(notice.message);
                self.phase = Phase::Failed;
                vec![Effect::CloseChannel]
            }
            Message::Progress { line } => {
                debug!(session = %self.id, line = %line, "Progress");
                self.progress.push(line);
                Vec::new()
            }
            Message::RawUnparsed { payload } => {
                debug!(session = %self.id, "Unrecognised frame recorded as diagnostic");
                self.error_log.push(payload);
                Vec::new()
            }
            other @ (Message::AgentRequest(_) | Message::AnalyzeRequest(_)) => {
                self.error_log
                    .push(format!("Unexpected {} frame from service", other.kind()));
                Vec::new()
            }
        }
    }

    fn on_log_text(&mut self, update: LogTextUpdate) {
        if self.mode() != Mode::Exploration {
            self.error_log
                .push("Ignored a log text update: analysis sessions do not stream logs".to_string());
            return;
        }
        // Each update is a full snapshot.
        self.accumulated_log_text = update.text;
        if update.session_id.is_some() {
            self.service_session_id = update.session_id;
        }
        if update.log_path.is_some() {
            self.log_path = update.log_path;
        }
    }

    fn complete(&mut self, result: FinalResult) -> Vec<Effect> {
        info!(
            session = %self.id,
            actions = result.annotated_actions.len(),
            "Session completed"
        );
        if result.session_id.is_some() {
            self.service_session_id = result.session_id;
        }
        if result.combined_path.is_some() {
            self.combined_path = result.combined_path;
        }
        self.phase = Phase::Completed(SessionResult::new(result.annotated_actions));
        vec![Effect::CloseChannel]
    }

    fn fail(&mut self, diagnostic: String) -> Vec<Effect> {
        warn!(session = %self.id, state = self.state().as_str(), reason = %diagnostic, "Session failed");
        self.error_log.push(diagnostic);
        self.phase = Phase::Failed;
        vec![Effect::CloseChannel]
    }

    /// Annotated actions as pretty JSON. Only available once Completed.
    pub fn export_json(&self) -> Result<String> {
        match self.result() {
            Some(result) => result.to_json(),
            None => Err(Error::Session(format!(
                "Session {} has no result to export (state: {})",
                self.id,
                self.state().as_str()
            ))),
        }
    }

    /// The authoritative log text for the mode: the streamed log for
    /// exploration, the uploaded log for analysis.
    pub fn export_log(&self) -> &str {
        match &self.request {
            SessionRequest::Exploration(_) => &self.accumulated_log_text,
            SessionRequest::Analysis(r) => r.log_text(),
        }
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Opened => "opened",
        SessionEvent::Frame(message) => message.kind(),
        SessionEvent::TransportError(_) => "transport_error",
        SessionEvent::Closed(_) => "closed",
        SessionEvent::TornDown => "torn_down",
    }
}
