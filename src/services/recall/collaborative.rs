use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::RecallStrategy;
use crate::clients::InteractionStore;
use crate::models::{Candidate, ContentId, FeedScope, RecallSource};

/// Item-based collaborative filtering.
///
/// Seeds from the user's recent view history, walks the pre-computed
/// item-similarity matrix, and aggregates per-candidate scores (max across
/// seeds, decayed by seed recency). Users without history get an empty
/// result, not an error; the composer redistributes their quota.
pub struct CollaborativeStrategy {
    interactions: Arc<dyn InteractionStore>,
}

/// Max recent views used as similarity seeds
const SEED_WINDOW: usize = 20;
/// Similar items pulled per seed
const SIMILAR_PER_SEED: usize = 10;
/// Per-seed decay step; older seeds contribute less
const SEED_DECAY_STEP: f64 = 0.05;
const SEED_DECAY_FLOOR: f64 = 0.5;

impl CollaborativeStrategy {
    pub fn new(interactions: Arc<dyn InteractionStore>) -> Self {
        Self { interactions }
    }
}

#[async_trait]
impl RecallStrategy for CollaborativeStrategy {
    async fn fetch(
        &self,
        user_id: Option<Uuid>,
        _scope: &FeedScope,
        exclude: &HashSet<ContentId>,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let Some(user_id) = user_id else {
            return Ok(Vec::new());
        };

        let seeds = self.interactions.recently_viewed(user_id, SEED_WINDOW).await?;
        if seeds.is_empty() {
            debug!(%user_id, "collaborative recall: no interaction history");
            return Ok(Vec::new());
        }

        let seed_set: HashSet<ContentId> = seeds.iter().copied().collect();
        let mut scores: HashMap<ContentId, f64> = HashMap::new();
        let mut languages: HashMap<ContentId, String> = HashMap::new();

        for (seed_idx, seed) in seeds.iter().enumerate() {
            let similar = self
                .interactions
                .similar_items(*seed, SIMILAR_PER_SEED)
                .await?;

            let decay = (1.0 - seed_idx as f64 * SEED_DECAY_STEP).max(SEED_DECAY_FLOOR);
            for item in similar {
                if seed_set.contains(&item.content_id) || exclude.contains(&item.content_id) {
                    continue;
                }
                let weighted = item.similarity * decay;
                let entry = scores.entry(item.content_id).or_insert(weighted);
                if weighted > *entry {
                    *entry = weighted;
                }
                languages.entry(item.content_id).or_insert(item.language);
            }
        }

        let mut ranked: Vec<(ContentId, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let candidates: Vec<Candidate> = ranked
            .into_iter()
            .take(limit)
            .map(|(content_id, score)| Candidate {
                content_id,
                source: RecallSource::Collaborative,
                raw_score: score,
                language: languages.remove(&content_id).unwrap_or_default(),
            })
            .collect();

        debug!(
            %user_id,
            seeds = seeds.len(),
            candidates = candidates.len(),
            "collaborative recall complete"
        );
        Ok(candidates)
    }

    fn source(&self) -> RecallSource {
        RecallSource::Collaborative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::MemoryInteractionStore;
    use crate::clients::SimilarItem;

    #[tokio::test]
    async fn test_empty_history_yields_empty() {
        let store = Arc::new(MemoryInteractionStore::new());
        let strategy = CollaborativeStrategy::new(store);

        let got = strategy
            .fetch(Some(Uuid::new_v4()), &FeedScope::Main, &HashSet::new(), 10)
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_yields_empty() {
        let store = Arc::new(MemoryInteractionStore::new());
        let strategy = CollaborativeStrategy::new(store);

        let got = strategy
            .fetch(None, &FeedScope::Main, &HashSet::new(), 10)
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_similar_items_ranked_and_seeds_excluded() {
        let store = Arc::new(MemoryInteractionStore::new());
        let user = Uuid::new_v4();
        let seed = Uuid::new_v4();
        let strong = Uuid::new_v4();
        let weak = Uuid::new_v4();

        store.record_view(user, seed);
        store.add_similar(
            seed,
            SimilarItem {
                content_id: weak,
                similarity: 0.2,
                language: "en".into(),
            },
        );
        store.add_similar(
            seed,
            SimilarItem {
                content_id: strong,
                similarity: 0.9,
                language: "ko".into(),
            },
        );
        // Self-similarity edges must never resurface the seed
        store.add_similar(
            seed,
            SimilarItem {
                content_id: seed,
                similarity: 1.0,
                language: "ko".into(),
            },
        );

        let strategy = CollaborativeStrategy::new(store);
        let got = strategy
            .fetch(Some(user), &FeedScope::Main, &HashSet::new(), 10)
            .await
            .unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].content_id, strong);
        assert_eq!(got[1].content_id, weak);
        assert!(got.iter().all(|c| c.content_id != seed));
    }
}
