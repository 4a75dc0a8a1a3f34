use anyhow::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::RecallStrategy;
use crate::clients::ContentIndex;
use crate::models::{Candidate, ContentId, FeedScope, RecallSource};

/// Pool drawn from the index before sampling; exclusion happens before the
/// shuffle so sampling stays uniform over eligible content.
const SAMPLE_POOL: usize = 1000;

/// Uniform random sample within the scope. Also serves as the top-up source
/// when the other strategies under-fill a batch.
pub struct RandomStrategy {
    index: Arc<dyn ContentIndex>,
}

impl RandomStrategy {
    pub fn new(index: Arc<dyn ContentIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl RecallStrategy for RandomStrategy {
    async fn fetch(
        &self,
        user_id: Option<Uuid>,
        scope: &FeedScope,
        exclude: &HashSet<ContentId>,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let pool = self
            .index
            .recent_in_scope(user_id, scope, SAMPLE_POOL)
            .await?;

        let mut eligible: Vec<_> = pool
            .into_iter()
            .filter(|entry| !exclude.contains(&entry.content_id))
            .collect();
        eligible.shuffle(&mut rand::thread_rng());

        let candidates: Vec<Candidate> = eligible
            .into_iter()
            .take(limit)
            .map(|entry| Candidate {
                content_id: entry.content_id,
                source: RecallSource::Random,
                raw_score: 1.0,
                language: entry.language,
            })
            .collect();

        debug!(
            scope = %scope.cache_segment(),
            candidates = candidates.len(),
            "random recall complete"
        );
        Ok(candidates)
    }

    fn source(&self) -> RecallSource {
        RecallSource::Random
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::MemoryContentIndex;
    use crate::clients::IndexEntry;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sample_respects_exclusions_and_limit() {
        let index = Arc::new(MemoryContentIndex::new());
        let mut ids = Vec::new();
        for _ in 0..20 {
            let id = Uuid::new_v4();
            index.add(
                IndexEntry {
                    content_id: id,
                    author_id: Uuid::new_v4(),
                    language: "en".into(),
                    created_at: Utc::now(),
                },
                "music",
            );
            ids.push(id);
        }

        let exclude: HashSet<ContentId> = ids[..10].iter().copied().collect();
        let strategy = RandomStrategy::new(index);
        let got = strategy
            .fetch(None, &FeedScope::Main, &exclude, 5)
            .await
            .unwrap();

        assert_eq!(got.len(), 5);
        assert!(got.iter().all(|c| !exclude.contains(&c.content_id)));

        // No duplicates within one sample
        let unique: HashSet<ContentId> = got.iter().map(|c| c.content_id).collect();
        assert_eq!(unique.len(), got.len());
    }

    #[tokio::test]
    async fn test_exhausted_pool_returns_short() {
        let index = Arc::new(MemoryContentIndex::new());
        let id = Uuid::new_v4();
        index.add(
            IndexEntry {
                content_id: id,
                author_id: Uuid::new_v4(),
                language: "en".into(),
                created_at: Utc::now(),
            },
            "music",
        );

        let strategy = RandomStrategy::new(index);
        let got = strategy
            .fetch(None, &FeedScope::Main, &HashSet::new(), 5)
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
    }
}
