use super::metrics::ProviderMetrics;
use super::types::{
    CompanionProfile, EvaluationMetrics, EvaluationSource, SessionEvaluation, MAX_INSIGHTS,
    MAX_SCORE, MIN_SCORE,
};
use crate::conversation::ConversationAnalysis;
use rand::Rng;
use tracing::debug;

/// Seconds attributed to each message by the fallback evaluation
pub const FALLBACK_SECONDS_PER_MESSAGE: u32 = 30;

/// Insights attached to every fallback evaluation
pub const FALLBACK_INSIGHTS: [&str; 3] = [
    "Active participation throughout the session",
    "Good grasp of the subject matter",
    "Engaged with the learning material",
];

const ENGAGEMENT_WEIGHT: f64 = 0.4;
const COMPREHENSION_WEIGHT: f64 = 0.35;
const PARTICIPATION_WEIGHT: f64 = 0.25;

/// Scoring failed on malformed analysis input
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("analysis field {field} is not a finite non-negative number: {value}")]
    InvalidInput { field: &'static str, value: f64 },
}

/// Score an analyzed transcript.
///
/// Provider metrics are accepted as context only; the local formulas decide
/// every number in the result.
pub fn score(
    analysis: &ConversationAnalysis,
    external: Option<&ProviderMetrics>,
    companion: &CompanionProfile,
) -> Result<SessionEvaluation, ScoringError> {
    let avg_len = analysis.average_response_length;
    if !avg_len.is_finite() || avg_len < 0.0 {
        return Err(ScoringError::InvalidInput {
            field: "average_response_length",
            value: avg_len,
        });
    }

    if let Some(metrics) = external {
        debug!(
            "Provider metrics available (status={:?}, call_duration_secs={:?})",
            metrics.status, metrics.call_duration_secs
        );
    }

    let user_messages = analysis.user_messages as f64;
    let questions = analysis.question_count as f64;
    let duration = analysis.estimated_duration_secs as f64;

    let engagement = clamp_percent(
        10.0 * analysis.engagement_keyword_hits as f64
            + 15.0 * questions
            + (4.0 * user_messages).min(20.0),
    );

    let comprehension = clamp_percent(
        20.0 + bonus(avg_len > 3.0, 25.0)
            + bonus(analysis.user_messages > 3, 25.0)
            + if engagement > 50.0 { 30.0 } else { 20.0 },
    );

    let participation = clamp_percent(8.0 * user_messages + (duration / 6.0).min(30.0) + 10.0);

    let overall = (ENGAGEMENT_WEIGHT * engagement
        + COMPREHENSION_WEIGHT * comprehension
        + PARTICIPATION_WEIGHT * participation)
        .round();
    let score = overall.clamp(MIN_SCORE as f64, MAX_SCORE as f64) as u8;

    Ok(SessionEvaluation {
        score,
        summary: summarize(analysis, score, companion),
        metrics: EvaluationMetrics {
            engagement: engagement.round() as u8,
            comprehension: comprehension.round() as u8,
            participation: participation.round() as u8,
            duration_secs: analysis.estimated_duration_secs,
        },
        insights: insights(analysis, score, &companion.subject),
        source: EvaluationSource::Analysis,
    })
}

/// Bounded substitute evaluation with a score drawn uniformly from 70..=90
pub fn fallback_evaluation<R: Rng + ?Sized>(
    message_count: usize,
    companion: &CompanionProfile,
    rng: &mut R,
) -> SessionEvaluation {
    let message_count = u32::try_from(message_count).unwrap_or(u32::MAX);

    SessionEvaluation {
        score: rng.gen_range(70..=90),
        summary: format!(
            "Completed {} discussion with good engagement",
            companion.topic
        ),
        metrics: EvaluationMetrics {
            engagement: 75,
            comprehension: 80,
            participation: 85,
            duration_secs: message_count.saturating_mul(FALLBACK_SECONDS_PER_MESSAGE),
        },
        insights: FALLBACK_INSIGHTS.iter().map(|s| s.to_string()).collect(),
        source: EvaluationSource::Fallback,
    }
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn bonus(condition: bool, points: f64) -> f64 {
    if condition {
        points
    } else {
        0.0
    }
}

fn insights(analysis: &ConversationAnalysis, score: u8, subject: &str) -> Vec<String> {
    let mut insights = Vec::with_capacity(5);

    let participation = if analysis.user_messages > 8 {
        "Excellent active participation throughout the session"
    } else if analysis.user_messages > 4 {
        "Good level of engagement with the material"
    } else {
        "Consider more active participation in future sessions"
    };
    insights.push(participation.to_string());

    if analysis.question_count > 2 {
        insights.push("Great curiosity shown through thoughtful questions".to_string());
    }

    if analysis.average_response_length > 5.0 {
        insights.push("Detailed responses demonstrate deep thinking".to_string());
    }

    let mastery = if score >= 85 {
        format!("Exceptional understanding of {} concepts", subject)
    } else if score >= 70 {
        format!("Solid grasp of {} fundamentals", subject)
    } else {
        format!("Opportunity to strengthen {} knowledge base", subject)
    };
    insights.push(mastery);

    if analysis.estimated_duration_secs > 300 {
        insights.push("Maintained focus for extended learning session".to_string());
    }

    insights.truncate(MAX_INSIGHTS);
    insights
}

fn summarize(analysis: &ConversationAnalysis, score: u8, companion: &CompanionProfile) -> String {
    let performance = match score {
        85.. => "excellent",
        70..=84 => "good",
        _ => "developing",
    };

    let engagement = match analysis.user_messages {
        7.. => "high",
        4..=6 => "moderate",
        _ => "basic",
    };

    let minutes = (analysis.estimated_duration_secs as f64 / 60.0).round() as u32;

    format!(
        "Completed {} discussion with {} performance. \
         Demonstrated {} engagement through {} interactions. \
         Session duration: {} minutes.",
        companion.topic, performance, engagement, analysis.user_messages, minutes
    )
}
