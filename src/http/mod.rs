//! HTTP API for companion calls and session summaries
//!
//! This module provides a REST API. Callers are identified by the `x-user-id`
//! header; without one, call start mints a guest `session_token` that the
//! other call routes expect in `x-session-token` (401 when neither is sent):
//! - POST /companions/:id/call/start - Start a call
//! - POST /companions/:id/call/mute - Toggle the microphone
//! - POST /companions/:id/call/end - End, evaluate and save the call
//! - GET /companions/:id/call/status - Query call state
//! - GET /companions/:id/call/transcript - Get the call transcript
//! - GET /companions - Catalog with latest session per companion
//! - GET /sessions/recent - Companions from the most recent sessions
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{SESSION_HEADER, USER_HEADER};
pub use routes::create_router;
pub use state::{AppState, CallOwner, ControllerKey};
