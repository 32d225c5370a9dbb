//! Session lifecycle control
//!
//! This module provides the `SessionController` that manages:
//! - The call state machine (Idle → Connecting → Active → Finished)
//! - Mute toggling on the live conversation
//! - Transcript capture from transport events
//! - Evaluation and persistence when the call ends
//! - The time-bounded evaluation-complete notice

mod controller;
mod notice;
mod state;

pub use controller::{
    ControllerConfig, ControllerDeps, SessionController, SessionError, DEFAULT_EVALUATION_NOTICE,
};
pub use notice::DeferredTask;
pub use state::{CallStatus, EndOutcome, SessionSnapshot, Transition};
