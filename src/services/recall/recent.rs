use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::RecallStrategy;
use crate::clients::ContentIndex;
use crate::models::{Candidate, ContentId, FeedScope, RecallSource};

/// Newest-first within the scope. Raw score is an exponential freshness
/// decay so recency stays comparable after language weighting.
pub struct RecentStrategy {
    index: Arc<dyn ContentIndex>,
}

impl RecentStrategy {
    pub fn new(index: Arc<dyn ContentIndex>) -> Self {
        Self { index }
    }

    /// Decays to ~0.37 after a day, floored so stale content still ranks
    fn recency_score(created_at: chrono::DateTime<chrono::Utc>) -> f64 {
        let age_hours = (chrono::Utc::now() - created_at).num_seconds() as f64 / 3600.0;
        (-age_hours / 24.0).exp().max(0.1)
    }
}

#[async_trait]
impl RecallStrategy for RecentStrategy {
    async fn fetch(
        &self,
        user_id: Option<Uuid>,
        scope: &FeedScope,
        exclude: &HashSet<ContentId>,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        // Over-fetch so exclusions do not shorten the page
        let pool = self
            .index
            .recent_in_scope(user_id, scope, limit.saturating_add(exclude.len()))
            .await?;

        let candidates: Vec<Candidate> = pool
            .into_iter()
            .filter(|entry| !exclude.contains(&entry.content_id))
            .take(limit)
            .map(|entry| Candidate {
                content_id: entry.content_id,
                source: RecallSource::Recent,
                raw_score: Self::recency_score(entry.created_at),
                language: entry.language,
            })
            .collect();

        debug!(
            scope = %scope.cache_segment(),
            candidates = candidates.len(),
            "recent recall complete"
        );
        Ok(candidates)
    }

    fn source(&self) -> RecallSource {
        RecallSource::Recent
    }
}
