use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::RecallStrategy;
use crate::clients::{ContentIndex, InteractionStore};
use crate::models::{Candidate, ContentId, FeedScope, RecallSource};
use crate::services::scoring;

/// Candidate pool multiplier: score more than we need so exclusions and
/// low-engagement content do not starve the quota.
const POOL_FACTOR: usize = 4;

/// Top-N by engagement-weighted popularity within the scope.
pub struct PopularStrategy {
    index: Arc<dyn ContentIndex>,
    interactions: Arc<dyn InteractionStore>,
}

impl PopularStrategy {
    pub fn new(index: Arc<dyn ContentIndex>, interactions: Arc<dyn InteractionStore>) -> Self {
        Self {
            index,
            interactions,
        }
    }
}

#[async_trait]
impl RecallStrategy for PopularStrategy {
    async fn fetch(
        &self,
        user_id: Option<Uuid>,
        scope: &FeedScope,
        exclude: &HashSet<ContentId>,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let pool = self
            .index
            .recent_in_scope(user_id, scope, limit.saturating_mul(POOL_FACTOR))
            .await?;

        let eligible: Vec<_> = pool
            .into_iter()
            .filter(|entry| !exclude.contains(&entry.content_id))
            .collect();
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ContentId> = eligible.iter().map(|e| e.content_id).collect();
        let counts = self.interactions.interaction_counts(&ids).await?;

        let mut candidates: Vec<Candidate> = eligible
            .into_iter()
            .map(|entry| {
                let score = counts
                    .get(&entry.content_id)
                    .map(scoring::popularity_score)
                    .unwrap_or(0.0);
                Candidate {
                    content_id: entry.content_id,
                    source: RecallSource::Popular,
                    raw_score: score,
                    language: entry.language,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);

        debug!(
            scope = %scope.cache_segment(),
            candidates = candidates.len(),
            "popular recall complete"
        );
        Ok(candidates)
    }

    fn source(&self) -> RecallSource {
        RecallSource::Popular
    }
}
