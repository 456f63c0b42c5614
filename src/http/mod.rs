//! HTTP API server for driving the chat
//!
//! This module provides a REST API mirroring the chat's user controls:
//! - GET /chat/transcript - Full transcript
//! - GET /chat/status - Interaction state, mute flag, input field
//! - PUT /chat/input - Replace the input field
//! - POST /chat/submit - Send the input field
//! - POST /chat/listen/toggle - Start/stop speech capture
//! - POST /chat/mute/toggle - Mute/unmute speech output
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
