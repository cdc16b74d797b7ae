use riskscope_channels::{
    ChannelEnvelope, ChannelEvent, ChannelId, ChannelManager, Connector, ReadyState,
};
use riskscope_core::{decode, encode, Config, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::request::{AnalysisRequest, ExplorationRequest, SessionRequest};
use crate::state::{Effect, Session, SessionEvent, SessionState};
use crate::view::{SessionObserver, SessionView};

/// Drives one session at a time over the channel manager.
///
/// Channel events are applied in arrival order, one at a time. Events from a
/// channel that is no longer current are dropped before they reach the
/// session.
pub struct SessionController {
    config: Config,
    manager: ChannelManager,
    events: mpsc::Receiver<ChannelEnvelope>,
    session: Option<Session>,
    channel: Option<ChannelId>,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl SessionController {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        let (manager, events) = ChannelManager::new(connector, config.channel.event_buffer);
        Self {
            config,
            manager,
            events,
            session: None,
            channel: None,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn view(&self) -> Option<SessionView> {
        self.session.as_ref().map(SessionView::from_session)
    }

    pub fn channel_state(&self) -> Option<ReadyState> {
        self.manager.ready_state()
    }

    /// Validate the exploration inputs, then start the session.
    pub async fn start_exploration(
        &mut self,
        url: &str,
        instruction: &str,
        max_steps: Option<&str>,
    ) -> Result<()> {
        let request = ExplorationRequest::new(url, instruction, max_steps)?;
        self.start(request.into()).await
    }

    /// Validate the uploaded log, then start the session.
    pub async fn start_analysis(&mut self, log_text: impl Into<String>) -> Result<()> {
        let request = AnalysisRequest::new(log_text)?;
        self.start(request.into()).await
    }

    /// Replace any current session with a new one and open its channel.
    pub async fn start(&mut self, request: SessionRequest) -> Result<()> {
        let endpoint = self.config.endpoint(request.mode())?;
        self.teardown().await;

        let mut session = Session::new(request);
        session.mark_connecting();
        info!(session = %session.id(), mode = %session.mode(), endpoint = %endpoint, "Starting session");
        self.session = Some(session);

        let id = self.manager.open(endpoint).await;
        self.channel = Some(id);
        self.notify();
        Ok(())
    }

    /// Wait for the next channel event and apply it.
    ///
    /// Returns `None` once there is no channel left to listen to.
    pub async fn step(&mut self) -> Option<SessionState> {
        let channel = self.channel?;
        let envelope = self.events.recv().await?;

        if envelope.channel != channel {
            debug!(
                channel = envelope.channel,
                current = channel,
                "Dropping event from superseded channel"
            );
            return self.state();
        }

        let event = match envelope.event {
            ChannelEvent::Open => SessionEvent::Opened,
            ChannelEvent::Message(text) => SessionEvent::Frame(decode(&text)),
            ChannelEvent::Error(reason) => SessionEvent::TransportError(reason),
            ChannelEvent::Close(code) => SessionEvent::Closed(code),
        };
        self.apply(event).await;
        self.state()
    }

    /// Process events until the session completes or fails.
    pub async fn run_until_terminal(&mut self) -> Option<SessionState> {
        loop {
            match self.step().await {
                Some(state) if state.is_terminal() => return Some(state),
                Some(_) => continue,
                None => return self.state(),
            }
        }
    }

    /// End the current session and release its channel. A session that had
    /// not finished is marked failed.
    pub async fn teardown(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.manager.close().await;
            self.channel = None;
            return;
        };

        let unfinished = !session.state().is_terminal();
        if unfinished {
            session.handle(SessionEvent::TornDown);
        }
        self.manager.close().await;
        self.channel = None;
        if unfinished {
            self.notify();
        }
    }

    fn state(&self) -> Option<SessionState> {
        self.session.as_ref().map(Session::state)
    }

    async fn apply(&mut self, event: SessionEvent) {
        let mut pending = vec![event];
        while let Some(event) = pending.pop() {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            for effect in session.handle(event) {
                match effect {
                    Effect::Send(message) => {
                        let sent = match (self.channel, encode(&message)) {
                            (Some(id), Ok(frame)) => self.manager.send(id, frame),
                            (None, _) => {
                                debug!(kind = message.kind(), "No channel to send on");
                                continue;
                            }
                            (_, Err(e)) => Err(e),
                        };
                        if let Err(e) = sent {
                            warn!(error = %e, "Failed to send request");
                            pending.push(SessionEvent::TransportError(e.to_string()));
                        }
                    }
                    Effect::CloseChannel => {
                        self.manager.close().await;
                        self.channel = None;
                    }
                }
            }
        }
        self.notify();
    }

    fn notify(&self) {
        if self.observers.is_empty() {
            return;
        }
        if let Some(session) = &self.session {
            let view = SessionView::from_session(session);
            for observer in &self.observers {
                observer.on_update(&view);
            }
        }
    }
}
