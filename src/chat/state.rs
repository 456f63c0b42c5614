use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interaction state of a chat. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionState {
    Idle,
    Listening,
    Sending,
}

/// Why a submission was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreReason {
    /// Input was empty after trimming
    Blank,
    /// A reply is still streaming
    Busy,
}

/// Result of a `submit` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ignored(IgnoreReason),
    Completed,
    Failed,
}

/// Result of a `toggle_listen` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    Started,
    Stopped,
    /// Host has no speech input; a notice was raised
    Unavailable,
    /// Capture could not start; a notice was raised
    Failed,
    /// Listening is not possible while a reply is streaming
    Busy,
}

/// Snapshot of the controller for status queries
#[derive(Debug, Clone, Serialize)]
pub struct ChatStatus {
    pub session_id: String,
    pub state: InteractionState,
    pub muted: bool,
    pub input: String,
    pub speech_input_available: bool,
    pub notice: Option<String>,
    pub turns: usize,
    pub started_at: DateTime<Utc>,
}
