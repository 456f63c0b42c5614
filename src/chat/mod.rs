//! Chat session management
//!
//! This module provides the `ChatController` that manages:
//! - The visible transcript and its persistence
//! - The Idle / Listening / Sending interaction state machine
//! - Streaming replies from the remote chat session into the last turn
//! - Speech input capture and muted/unmuted speech output

mod controller;
mod state;
mod turn;

pub use controller::{
    new_session_id, ChatController, ChatEvent, ChatServices, SPEECH_START_FAILED_NOTICE,
    SPEECH_UNSUPPORTED_NOTICE, STREAM_ERROR_MESSAGE,
};
pub use state::{ChatStatus, IgnoreReason, InteractionState, ListenOutcome, SubmitOutcome};
pub use turn::{ChatTurn, Role, Transcript, GREETING};
