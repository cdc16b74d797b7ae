use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// What a session does: drive the agent live, or annotate an uploaded log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Exploration,
    Analysis,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Exploration => "exploration",
            Mode::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the agent actually performed the step or only considered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Executed,
    #[serde(alias = "planned")]
    Candidate,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Executed => "executed",
            ActionKind::Candidate => "candidate",
        }
    }
}

/// Element the action touched: a plain label, a structured descriptor, or
/// whatever else the agent reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InteractedElement {
    Text(String),
    Descriptor(ElementDescriptor),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    /// Remaining descriptor fields, kept as received.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

const SUMMARY_LOCATOR_MAX: usize = 60;

impl InteractedElement {
    /// One-line label for display. Never mutates the element.
    pub fn summary(&self) -> String {
        match self {
            InteractedElement::Text(text) => text.clone(),
            InteractedElement::Descriptor(desc) => desc.summary(),
            InteractedElement::Other(value) => value.to_string(),
        }
    }
}

impl ElementDescriptor {
    pub fn summary(&self) -> String {
        let mut label = self
            .name
            .clone()
            .or_else(|| self.extra_str("tag_name"))
            .unwrap_or_default();

        if let Some(id) = &self.id {
            label.push('#');
            label.push_str(&value_label(id));
        }

        let locator = self
            .locator
            .clone()
            .or_else(|| self.extra_str("xpath"))
            .or_else(|| self.extra_str("css_selector"))
            .or_else(|| self.extra_str("selector"));
        if let Some(loc) = locator {
            let loc = truncate_chars(&loc, SUMMARY_LOCATOR_MAX);
            if label.is_empty() {
                label = loc;
            } else {
                label = format!("{} ({})", label, loc);
            }
        }

        if label.is_empty() {
            "-".to_string()
        } else {
            label
        }
    }

    fn extra_str(&self, key: &str) -> Option<String> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// The concrete step: its type, a short name, and the element it touched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionDetail {
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        alias = "interactedElement",
        skip_serializing_if = "Option::is_none"
    )]
    pub interacted_element: Option<InteractedElement>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ActionDetail {
    pub fn element_summary(&self) -> String {
        self.interacted_element
            .as_ref()
            .map(InteractedElement::summary)
            .unwrap_or_else(|| "-".to_string())
    }
}

/// Classifier output. The values are categorical strings (`"True"`/`"False"`
/// for the two flags); only their presence is checked here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(alias = "isSensitiveData", deserialize_with = "label")]
    pub is_sensitive_data: String,
    #[serde(alias = "isContextuallyAppropriate", deserialize_with = "label")]
    pub is_contextually_appropriate: String,
    #[serde(alias = "riskType", deserialize_with = "label")]
    pub risk_type: String,
    #[serde(deserialize_with = "label")]
    pub reversibility: String,
    #[serde(alias = "rollbackEffect", deserialize_with = "label")]
    pub rollback_effect: String,
    #[serde(alias = "impactScope", deserialize_with = "label")]
    pub impact_scope: String,
    /// Any further labels the classifier produced, kept for export.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Annotations {
    pub fn is_sensitive(&self) -> bool {
        flag_is_true(&self.is_sensitive_data)
    }

    pub fn is_appropriate(&self) -> bool {
        flag_is_true(&self.is_contextually_appropriate)
    }
}

/// One agent step enriched with its risk annotations.
///
/// Records in the older per-step shape (`action_type` + `action_detail`, no
/// `kind`) are read as executed actions. Fields not modelled here are kept in
/// `extra` and written back out on export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAnnotatedAction")]
pub struct AnnotatedAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub goal: String,
    pub action: ActionDetail,
    pub annotations: Annotations,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct RawAnnotatedAction {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    kind: Option<ActionKind>,
    #[serde(default)]
    ts: Option<Value>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    goal: String,
    #[serde(default)]
    action: Option<ActionDetail>,
    #[serde(default)]
    action_type: Option<String>,
    #[serde(default)]
    action_detail: Option<Value>,
    annotations: Annotations,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl From<RawAnnotatedAction> for AnnotatedAction {
    fn from(raw: RawAnnotatedAction) -> Self {
        let mut extra = raw.extra;
        let action = match raw.action {
            Some(action) => action,
            None => {
                let action_type = raw.action_type.clone().unwrap_or_default();
                ActionDetail {
                    name: action_type.clone(),
                    action_type,
                    interacted_element: raw
                        .action_detail
                        .clone()
                        .filter(|v| !v.is_null())
                        .and_then(|v| serde_json::from_value(v).ok()),
                    extra: BTreeMap::new(),
                }
            }
        };
        if let Some(action_type) = raw.action_type {
            extra.insert("action_type".to_string(), Value::String(action_type));
        }
        if let Some(detail) = raw.action_detail {
            extra.insert("action_detail".to_string(), detail);
        }

        Self {
            id: raw.id,
            kind: raw.kind.unwrap_or(ActionKind::Executed),
            ts: raw.ts,
            url: raw.url,
            goal: raw.goal,
            action,
            annotations: raw.annotations,
            extra,
        }
    }
}

fn flag_is_true(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}…", head)
    }
}

/// Categorical labels arrive as strings; classifiers occasionally emit the
/// two flags as JSON booleans, or leave a label null.
fn label<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Flag(bool),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => s,
        Some(Raw::Flag(true)) => "True".to_string(),
        Some(Raw::Flag(false)) => "False".to_string(),
        None => "Unknown".to_string(),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
