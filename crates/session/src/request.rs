//! Request building and validation.
//!
//! Requests can only be built through the constructors here, so anything
//! that reaches the channel has already been checked.

use riskscope_core::message::{AgentRequest, AnalyzeRequest};
use riskscope_core::{Error, Message, Mode, Result};
use tracing::debug;

pub const DEFAULT_MAX_STEPS: u32 = 10;
pub const MIN_MAX_STEPS: u32 = 1;
pub const MAX_MAX_STEPS: u32 = 50;

/// Clamp a step count into `[MIN_MAX_STEPS, MAX_MAX_STEPS]`.
pub fn clamp_max_steps(n: i64) -> u32 {
    n.clamp(MIN_MAX_STEPS as i64, MAX_MAX_STEPS as i64) as u32
}

/// Effective step budget for a raw operator input.
///
/// Absent, blank or unreadable input falls back to the default; numbers out
/// of range are clamped rather than rejected.
pub fn parse_max_steps(raw: Option<&str>) -> u32 {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_MAX_STEPS;
    };

    if let Ok(n) = raw.parse::<i64>() {
        return clamp_max_steps(n);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => clamp_max_steps(f as i64),
        _ => {
            debug!(input = %raw, "Unreadable max steps, using default");
            DEFAULT_MAX_STEPS
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorationRequest {
    url: String,
    instruction: String,
    max_steps: u32,
}

impl ExplorationRequest {
    pub fn new(url: &str, instruction: &str, max_steps: Option<&str>) -> Result<Self> {
        let url = url.trim();
        let instruction = instruction.trim();
        if url.is_empty() {
            return Err(Error::Validation("A target URL is required".to_string()));
        }
        if instruction.is_empty() {
            return Err(Error::Validation("An instruction is required".to_string()));
        }
        Ok(Self {
            url: url.to_string(),
            instruction: instruction.to_string(),
            max_steps: parse_max_steps(max_steps),
        })
    }

    /// Same as [`ExplorationRequest::new`] for callers that already hold a number.
    pub fn with_steps(url: &str, instruction: &str, max_steps: Option<i64>) -> Result<Self> {
        let mut request = Self::new(url, instruction, None)?;
        if let Some(n) = max_steps {
            request.max_steps = clamp_max_steps(n);
        }
        Ok(request)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    log_text: String,
}

impl AnalysisRequest {
    /// The text is sent exactly as given; it only has to contain something.
    pub fn new(log_text: impl Into<String>) -> Result<Self> {
        let log_text = log_text.into();
        if log_text.trim().is_empty() {
            return Err(Error::Validation(
                "No log loaded: upload a log file before starting an analysis".to_string(),
            ));
        }
        Ok(Self { log_text })
    }

    pub fn log_text(&self) -> &str {
        &self.log_text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    Exploration(ExplorationRequest),
    Analysis(AnalysisRequest),
}

impl SessionRequest {
    pub fn mode(&self) -> Mode {
        match self {
            SessionRequest::Exploration(_) => Mode::Exploration,
            SessionRequest::Analysis(_) => Mode::Analysis,
        }
    }

    /// The message sent as soon as the channel opens.
    pub fn initial_message(&self) -> Message {
        match self {
            SessionRequest::Exploration(r) => Message::AgentRequest(AgentRequest {
                url: r.url.clone(),
                instruction: r.instruction.clone(),
                max_steps: r.max_steps,
            }),
            SessionRequest::Analysis(r) => Message::AnalyzeRequest(AnalyzeRequest {
                log_text: r.log_text.clone(),
            }),
        }
    }
}

impl From<ExplorationRequest> for SessionRequest {
    fn from(r: ExplorationRequest) -> Self {
        SessionRequest::Exploration(r)
    }
}

impl From<AnalysisRequest> for SessionRequest {
    fn from(r: AnalysisRequest) -> Self {
        SessionRequest::Analysis(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_steps_when_absent_or_blank() {
        assert_eq!(parse_max_steps(None), 10);
        assert_eq!(parse_max_steps(Some("")), 10);
        assert_eq!(parse_max_steps(Some("   ")), 10);
        assert_eq!(parse_max_steps(Some("many")), 10);
    }

    #[test]
    fn test_max_steps_clamped() {
        assert_eq!(parse_max_steps(Some("75")), 50);
        assert_eq!(parse_max_steps(Some("0")), 1);
        assert_eq!(parse_max_steps(Some("-3")), 1);
        assert_eq!(parse_max_steps(Some(" 25 ")), 25);
        assert_eq!(parse_max_steps(Some("12.9")), 12);
        assert_eq!(parse_max_steps(Some("99999999999999999999")), 50);
        for n in -100..=100 {
            assert_eq!(clamp_max_steps(n), n.clamp(1, 50) as u32);
        }
    }

    #[test]
    fn test_exploration_defaults_to_ten_steps() {
        let request = ExplorationRequest::new("http://example.com", "log in", None).unwrap();
        match SessionRequest::from(request).initial_message() {
            Message::AgentRequest(r) => {
                assert_eq!(r.url, "http://example.com");
                assert_eq!(r.instruction, "log in");
                assert_eq!(r.max_steps, 10);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_exploration_clamps_numeric_input() {
        let request = ExplorationRequest::with_steps("http://example.com", "log in", Some(75)).unwrap();
        assert_eq!(request.max_steps(), 50);
        let request = ExplorationRequest::with_steps("http://example.com", "log in", None).unwrap();
        assert_eq!(request.max_steps(), 10);
    }

    #[test]
    fn test_exploration_requires_url_and_instruction() {
        assert!(matches!(
            ExplorationRequest::new("", "log in", None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            ExplorationRequest::new("http://example.com", "  ", None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_analysis_requires_log_text() {
        assert!(matches!(AnalysisRequest::new(""), Err(Error::Validation(_))));
        assert!(matches!(AnalysisRequest::new("\n\t"), Err(Error::Validation(_))));

        let request = AnalysisRequest::new("  line 1\n").unwrap();
        assert_eq!(request.log_text(), "  line 1\n");
        assert_eq!(SessionRequest::from(request).mode(), Mode::Analysis);
    }
}
