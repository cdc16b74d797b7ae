//! Read-only projection of a session for whatever renders it.

use riskscope_core::{AnnotatedAction, Mode};
use serde::Serialize;

use crate::result::ResultSummary;
use crate::state::{Session, SessionState};

/// One row of the annotated actions table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRow {
    pub index: usize,
    pub kind: String,
    pub goal: String,
    pub action_type: String,
    pub action_name: String,
    pub element: String,
    pub sensitive: String,
    pub appropriate: String,
    pub risk_type: String,
    pub reversibility: String,
    pub rollback_effect: String,
    pub impact_scope: String,
}

impl ActionRow {
    pub fn from_action(index: usize, action: &AnnotatedAction) -> Self {
        let a = &action.annotations;
        Self {
            index,
            kind: action.kind.as_str().to_string(),
            goal: action.goal.clone(),
            action_type: action.action.action_type.clone(),
            action_name: action.action.name.clone(),
            element: action.action.element_summary(),
            sensitive: a.is_sensitive_data.clone(),
            appropriate: a.is_contextually_appropriate.clone(),
            risk_type: a.risk_type.clone(),
            reversibility: a.reversibility.clone(),
            rollback_effect: a.rollback_effect.clone(),
            impact_scope: a.impact_scope.clone(),
        }
    }
}

/// Snapshot handed to observers after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub mode: Mode,
    pub state: String,
    pub started_at: String,
    pub log_text: String,
    pub progress: Vec<String>,
    pub errors: Vec<String>,
    /// Empty unless the session completed.
    pub rows: Vec<ActionRow>,
    pub summary: Option<ResultSummary>,
    pub export_available: bool,
    /// Where the service kept its copies, when it said so.
    pub service_log_path: Option<String>,
    pub service_combined_path: Option<String>,
}

impl SessionView {
    pub fn from_session(session: &Session) -> Self {
        let result = session.result();
        let rows = result
            .map(|r| {
                r.actions()
                    .iter()
                    .enumerate()
                    .map(|(i, action)| ActionRow::from_action(i + 1, action))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            session_id: session.display_id().to_string(),
            mode: session.mode(),
            state: session.state().as_str().to_string(),
            started_at: session.started_at().to_rfc3339(),
            log_text: session.export_log().to_string(),
            progress: session.progress().to_vec(),
            errors: session.error_log().to_vec(),
            rows,
            summary: result.map(|r| r.summary()),
            export_available: session.state() == SessionState::Completed,
            service_log_path: session.log_path().map(str::to_string),
            service_combined_path: session.combined_path().map(str::to_string),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Completed.as_str() || self.state == SessionState::Failed.as_str()
    }
}

/// Receives a fresh [`SessionView`] whenever the session changes.
pub trait SessionObserver: Send + Sync {
    fn on_update(&self, view: &SessionView);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ExplorationRequest;
    use crate::state::SessionEvent;
    use riskscope_core::decode;

    #[test]
    fn test_view_of_completed_session() {
        let request = ExplorationRequest::new("http://example.com", "search", None).unwrap();
        let mut session = Session::new(request.into());
        session.mark_connecting();
        session.handle(SessionEvent::Opened);

        let view = SessionView::from_session(&session);
        assert_eq!(view.state, "active");
        assert!(view.rows.is_empty());
        assert!(view.summary.is_none());
        assert!(!view.export_available);

        session.handle(SessionEvent::Frame(decode(
            r#"{"type":"final_result","annotated_combined":[{"kind":"planned","goal":"Search","action":{"type":"input","name":"input_text","interacted_element":{"tag_name":"input","xpath":"/html/body/form/input"}},"annotations":{"is_sensitive_data":"False","is_contextually_appropriate":"True","risk_type":"Unknown","reversibility":"Instantly Reversible","rollback_effect":"Returning to Initial State","impact_scope":"Having Immediate Impact"}}]}"#,
        )));

        let view = SessionView::from_session(&session);
        assert!(view.is_finished());
        assert!(view.export_available);
        assert_eq!(view.rows.len(), 1);
        let row = &view.rows[0];
        assert_eq!(row.index, 1);
        assert_eq!(row.kind, "candidate");
        assert_eq!(row.action_name, "input_text");
        assert!(row.element.starts_with("input"));
        assert_eq!(view.summary.as_ref().unwrap().candidate, 1);
    }
}
