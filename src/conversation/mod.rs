//! Conversation transcript types and heuristic analysis
//!
//! A transcript is the ordered list of utterances captured while a call is
//! active. The analyzer turns it into counts the scorer works from.

mod analyzer;
mod message;

pub use analyzer::{
    analyze, ConversationAnalysis, ENGAGEMENT_KEYWORDS, SECONDS_PER_MESSAGE,
};
pub use message::{ConversationMessage, Role};
