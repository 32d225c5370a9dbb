use super::message::ConversationMessage;
use serde::{Deserialize, Serialize};

/// Words that signal an engaged learner (affirmation, negation, question stems, enthusiasm)
pub const ENGAGEMENT_KEYWORDS: [&str; 11] = [
    "yes",
    "no",
    "why",
    "how",
    "what",
    "when",
    "where",
    "really",
    "interesting",
    "cool",
    "wow",
];

/// Seconds attributed to each transcript message when estimating duration.
///
/// The estimate is `SECONDS_PER_MESSAGE × total messages`, a proxy and not
/// wall-clock time.
pub const SECONDS_PER_MESSAGE: u32 = 45;

/// Counts derived from one finished transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub total_messages: u32,
    pub user_messages: u32,
    pub assistant_messages: u32,

    /// Mean word count of user messages (0 when the user never spoke)
    pub average_response_length: f64,

    /// Keyword hits summed over user messages, each keyword counted once per message
    pub engagement_keyword_hits: u32,

    /// User messages containing a `?`
    pub question_count: u32,

    /// Synthetic duration, see [`SECONDS_PER_MESSAGE`]
    pub estimated_duration_secs: u32,
}

/// Analyze a transcript. Never fails; an empty transcript yields all zeros.
pub fn analyze(messages: &[ConversationMessage]) -> ConversationAnalysis {
    let mut user_messages = 0u32;
    let mut assistant_messages = 0u32;
    let mut total_words = 0usize;
    let mut engagement_keyword_hits = 0u32;
    let mut question_count = 0u32;

    for message in messages {
        if !message.is_user() {
            assistant_messages += 1;
            continue;
        }

        user_messages += 1;
        total_words += message.content.split_whitespace().count();
        engagement_keyword_hits += keyword_hits(&message.content);
        if message.content.contains('?') {
            question_count += 1;
        }
    }

    let average_response_length = if user_messages > 0 {
        total_words as f64 / user_messages as f64
    } else {
        0.0
    };

    let total_messages = messages.len() as u32;

    ConversationAnalysis {
        total_messages,
        user_messages,
        assistant_messages,
        average_response_length,
        engagement_keyword_hits,
        question_count,
        estimated_duration_secs: total_messages.saturating_mul(SECONDS_PER_MESSAGE),
    }
}

fn keyword_hits(content: &str) -> u32 {
    let lowered = content.to_lowercase();
    ENGAGEMENT_KEYWORDS
        .iter()
        .filter(|keyword| lowered.contains(*keyword))
        .count() as u32
}
