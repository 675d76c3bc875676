use std::fmt;

use serde::Serialize;

/// What the session is doing. Exactly one state is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", content = "label", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Recording(String),
    Predicting,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording(_))
    }

    pub fn is_predicting(&self) -> bool {
        matches!(self, SessionState::Predicting)
    }

    /// Label being recorded, if any.
    pub fn recording_label(&self) -> Option<&str> {
        match self {
            SessionState::Recording(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Recording(label) => write!(f, "recording({})", label),
            SessionState::Predicting => f.write_str("predicting"),
        }
    }
}
