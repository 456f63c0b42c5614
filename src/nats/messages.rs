use serde::{Deserialize, Serialize};

/// Speech-to-text result received from the STT service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    /// Interim result that may still be revised
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Capture control message published to the STT service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureControlMessage {
    pub session_id: String,
    pub action: CaptureAction,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureAction {
    Start,
    Stop,
}
