use riskscope_core::{ActionKind, AnnotatedAction, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// The annotated actions of a completed session, in the order the service
/// sent them. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    actions: Vec<AnnotatedAction>,
}

impl SessionResult {
    pub fn new(actions: Vec<AnnotatedAction>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[AnnotatedAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn summary(&self) -> ResultSummary {
        ResultSummary::from_actions(&self.actions)
    }

    /// Pretty JSON of the full sequence.
    pub fn to_json(&self) -> Result<String> {
        export_actions_json(&self.actions)
    }
}

/// Serialize annotated actions for export. Field order follows the struct
/// definitions, so identical results produce identical files.
pub fn export_actions_json(actions: &[AnnotatedAction]) -> Result<String> {
    let mut json = serde_json::to_string_pretty(actions)?;
    json.push('\n');
    Ok(json)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub total: usize,
    pub executed: usize,
    pub candidate: usize,
    pub sensitive: usize,
    pub inappropriate: usize,
    /// Count per risk type, `Unknown` included.
    pub risk_types: BTreeMap<String, usize>,
}

impl ResultSummary {
    pub fn from_actions(actions: &[AnnotatedAction]) -> Self {
        let mut summary = ResultSummary {
            total: actions.len(),
            ..Default::default()
        };
        for action in actions {
            match action.kind {
                ActionKind::Executed => summary.executed += 1,
                ActionKind::Candidate => summary.candidate += 1,
            }
            if action.annotations.is_sensitive() {
                summary.sensitive += 1;
            }
            if !action.annotations.is_appropriate() {
                summary.inappropriate += 1;
            }
            *summary
                .risk_types
                .entry(action.annotations.risk_type.clone())
                .or_insert(0) += 1;
        }
        summary
    }

    /// Actions carrying an identified risk.
    pub fn risky(&self) -> usize {
        self.risk_types
            .iter()
            .filter(|(risk, _)| !risk.eq_ignore_ascii_case("unknown"))
            .map(|(_, n)| n)
            .sum()
    }
}
