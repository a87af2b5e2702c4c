//! Weighted opinion pooling over agent responses.
//!
//! This is a heuristic, not an agreement protocol: there is no quorum, no
//! fault model and no guarantee that participants saw the same inputs. It
//! averages confidences by role weight and ranks suggestions by how many
//! responses mention them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::invoker::AgentResponse;

/// Number of suggestions kept in a consensus result.
pub const TOP_SUGGESTIONS: usize = 5;

/// Pooled opinion across the successful responses of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub consensus_confidence: f64,
    pub consensus_suggestions: Vec<String>,
    pub participant_count: usize,
    pub total_weight: f64,
}

/// Outcome of [`aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConsensusOutcome {
    Reached(ConsensusResult),
    /// No responses, or all weights were zero. Not an error.
    NoValidWeights { consensus: String },
}

impl ConsensusOutcome {
    fn no_valid_weights() -> Self {
        ConsensusOutcome::NoValidWeights {
            consensus: "no valid weights".to_string(),
        }
    }

    pub fn result(&self) -> Option<&ConsensusResult> {
        match self {
            ConsensusOutcome::Reached(result) => Some(result),
            ConsensusOutcome::NoValidWeights { .. } => None,
        }
    }
}

/// Combine `(response, weight)` pairs into one summary opinion.
///
/// Suggestions are ranked by frequency; ties keep first-seen order.
pub fn aggregate(responses: &[(&AgentResponse, f64)]) -> ConsensusOutcome {
    let total_weight: f64 = responses.iter().map(|(_, w)| w).sum();
    if responses.is_empty() || total_weight == 0.0 {
        return ConsensusOutcome::no_valid_weights();
    }

    let consensus_confidence = responses
        .iter()
        .map(|(response, weight)| response.confidence * weight)
        .sum::<f64>()
        / total_weight;

    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for suggestion in responses.iter().flat_map(|(r, _)| r.suggestions.iter()) {
        match index.get(suggestion.as_str()) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(suggestion.as_str(), counts.len());
                counts.push((suggestion.as_str(), 1));
            }
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    ConsensusOutcome::Reached(ConsensusResult {
        consensus_confidence,
        consensus_suggestions: counts
            .into_iter()
            .take(TOP_SUGGESTIONS)
            .map(|(s, _)| s.to_string())
            .collect(),
        participant_count: responses.len(),
        total_weight,
    })
}
