//! Session evaluation
//!
//! This module turns a finished transcript into a [`SessionEvaluation`]:
//! - Local transcript analysis and heuristic scoring
//! - Best-effort provider metrics fetch, bounded by a timeout
//! - A bounded fallback evaluation whenever analysis is unavailable

mod metrics;
mod scorer;
mod types;

pub use metrics::{HttpMetricsSource, MetricsError, MetricsSource, NoMetrics, ProviderMetrics};
pub use scorer::{
    fallback_evaluation, score, ScoringError, FALLBACK_INSIGHTS, FALLBACK_SECONDS_PER_MESSAGE,
};
pub use types::{
    CompanionProfile, EvaluationMetrics, EvaluationSource, SessionEvaluation, MAX_INSIGHTS,
    MAX_SCORE, MIN_SCORE,
};

use crate::conversation::{analyze, ConversationMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runs analysis, metrics fetch and scoring for a finished call
#[derive(Clone)]
pub struct Evaluator {
    metrics: Arc<dyn MetricsSource>,
    metrics_timeout: Duration,
}

impl Evaluator {
    pub fn new(metrics: Arc<dyn MetricsSource>, metrics_timeout: Duration) -> Self {
        Self {
            metrics,
            metrics_timeout,
        }
    }

    /// Evaluator that never contacts the provider
    pub fn local_only() -> Self {
        Self::new(Arc::new(NoMetrics), Duration::from_secs(1))
    }

    /// Evaluate a transcript. Never fails: every failure degrades to the fallback.
    pub async fn evaluate(
        &self,
        call_id: &str,
        messages: &[ConversationMessage],
        companion: &CompanionProfile,
    ) -> SessionEvaluation {
        if messages.is_empty() {
            warn!("No transcript for call {}, using fallback evaluation", call_id);
            return fallback_evaluation(0, companion, &mut rand::thread_rng());
        }

        let analysis = analyze(messages);
        let external = self.fetch_metrics(call_id).await;

        let evaluation = match score(&analysis, external.as_ref(), companion) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!("Scoring failed for call {}, using fallback: {}", call_id, e);
                fallback_evaluation(messages.len(), companion, &mut rand::thread_rng())
            }
        };

        info!(
            "Evaluated call {} (score={}, source={:?}, insights={})",
            call_id,
            evaluation.score,
            evaluation.source,
            evaluation.insights.len()
        );

        evaluation
    }

    async fn fetch_metrics(&self, call_id: &str) -> Option<ProviderMetrics> {
        let result = match tokio::time::timeout(self.metrics_timeout, self.metrics.fetch(call_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(MetricsError::Timeout(self.metrics_timeout)),
        };

        match result {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(
                    "Could not fetch provider metrics for call {}, using local analysis: {}",
                    call_id, e
                );
                None
            }
        }
    }
}
