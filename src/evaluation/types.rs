use serde::{Deserialize, Serialize};

/// Lowest score a completed session can show. Any finished session reads as a pass.
pub const MIN_SCORE: u8 = 60;

/// Highest possible score
pub const MAX_SCORE: u8 = 100;

/// Upper bound on insights attached to one evaluation
pub const MAX_INSIGHTS: usize = 3;

/// The parts of a companion persona that appear in evaluation text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionProfile {
    pub name: String,
    pub subject: String,
    pub topic: String,
}

/// Sub-scores of an evaluation, each within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub engagement: u8,
    pub comprehension: u8,
    pub participation: u8,

    /// Estimated session length in seconds (a message-count proxy)
    pub duration_secs: u32,
}

/// Which path produced an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    /// Transcript analysis through the scoring formulas
    Analysis,
    /// Bounded substitute used when analysis is unavailable
    Fallback,
}

/// The scored assessment of one completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvaluation {
    /// Overall score within `MIN_SCORE..=MAX_SCORE`
    pub score: u8,
    pub summary: String,
    pub metrics: EvaluationMetrics,

    /// At most [`MAX_INSIGHTS`] entries, in generation order
    pub insights: Vec<String>,

    pub source: EvaluationSource,
}
