//! Conflict resolution between collected embeddings.
//!
//! Two embeddings conflict when they claim overlapping original nodes; at most one of them
//! can be kept. Choosing the best conflict-free subset is a maximum weight independent set
//! problem. [`GreedyFilter`] approximates it; [`OptimalFilter`] is a placeholder for an
//! exact strategy and refuses to run.

use tracing::{debug, info, instrument};

use crate::collector::CollectorResult;
use crate::embedding::Embedding;
use crate::errors::ConfigError;
use crate::tree::Forest;
use crate::types::EmbeddingId;

pub trait Filter {
    /// Checks that the strategy can run at all. Called before any work is done.
    fn supported(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Removes embeddings from `result` until no two remaining ones conflict. Removed
    /// embeddings are reverted in `forest`.
    fn filter(&self, result: &mut CollectorResult, forest: &mut Forest) -> Result<(), ConfigError>;
}

/// Value of an embedding; lower is better.
pub fn score(embedding: &Embedding) -> i64 {
    -(embedding.instances_count() as i64 * embedding.descendant_count() as i64)
}

/// Accepts embeddings by descending value, skipping every candidate that conflicts with
/// one accepted before.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyFilter;

impl Filter for GreedyFilter {
    #[instrument(skip_all, name = "greedy_filter", fields(candidates = result.len()))]
    fn filter(&self, result: &mut CollectorResult, forest: &mut Forest) -> Result<(), ConfigError> {
        let mut candidates: Vec<(i64, EmbeddingId)> =
            result.embeddings().map(|e| (score(e), e.id())).collect();
        candidates.sort_by_key(|(score, _)| *score);

        let mut accepted: Vec<&Embedding> = Vec::new();
        let mut rejected: Vec<EmbeddingId> = Vec::new();

        for (score, id) in candidates {
            let Some(candidate) = result.get(id) else {
                continue;
            };

            if accepted.iter().any(|a| a.conflicts(candidate, forest)) {
                debug!(embedding = %id, score, "rejected");
                rejected.push(id);
            } else {
                debug!(embedding = %id, score, "accepted");
                accepted.push(candidate);
            }
        }

        let kept = accepted.len();

        for id in &rejected {
            result.remove(forest, *id);
        }

        info!(accepted = kept, rejected = rejected.len(), "filter done");
        Ok(())
    }
}

/// Exact conflict resolution. Not implemented; selecting it is a configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimalFilter;

impl Filter for OptimalFilter {
    fn supported(&self) -> Result<(), ConfigError> {
        Err(ConfigError::UnsupportedFilter("optimal".to_string()))
    }

    fn filter(
        &self,
        _result: &mut CollectorResult,
        _forest: &mut Forest,
    ) -> Result<(), ConfigError> {
        self.supported()
    }
}
