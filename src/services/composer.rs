//! Batch composition: merges the four recall strategies into one
//! deduplicated serving order.
//!
//! Quotas are 40/30/10/20 of the target size. Merge order is strategy
//! priority (collaborative, popular, recent, random) with first-seen-wins
//! dedup; under-filled quotas are redistributed proportionally across the
//! strategies that still have candidates, and any remaining gap is topped
//! up from the random strategy with an expanding exclude set.

use chrono::Utc;
use futures::future;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{ContentIndex, InteractionStore, UserDirectory};
use crate::config::FeedConfig;
use crate::metrics;
use crate::models::{
    BatchKey, Candidate, CompositionStats, ContentId, FeedBatch, RecallSource, ScoredCandidate,
};
use crate::services::recall::{
    CollaborativeStrategy, PopularStrategy, RandomStrategy, RecallStrategy, RecentStrategy,
};
use crate::services::scoring;

/// Attempt cap for the random top-up loop; each pass expands the exclude set
const TOP_UP_ROUNDS: usize = 3;

pub struct BatchComposer {
    /// Merge priority order
    strategies: Vec<Arc<dyn RecallStrategy>>,
    users: Arc<dyn UserDirectory>,
    interactions: Arc<dyn InteractionStore>,
    config: FeedConfig,
}

impl BatchComposer {
    pub fn new(
        strategies: Vec<Arc<dyn RecallStrategy>>,
        users: Arc<dyn UserDirectory>,
        interactions: Arc<dyn InteractionStore>,
        config: FeedConfig,
    ) -> Self {
        Self {
            strategies,
            users,
            interactions,
            config,
        }
    }

    /// The production strategy set in priority order
    pub fn standard(
        index: Arc<dyn ContentIndex>,
        interactions: Arc<dyn InteractionStore>,
        users: Arc<dyn UserDirectory>,
        config: FeedConfig,
    ) -> Self {
        let strategies: Vec<Arc<dyn RecallStrategy>> = vec![
            Arc::new(CollaborativeStrategy::new(interactions.clone())),
            Arc::new(PopularStrategy::new(index.clone(), interactions.clone())),
            Arc::new(RecentStrategy::new(index.clone())),
            Arc::new(RandomStrategy::new(index)),
        ];
        Self::new(strategies, users, interactions, config)
    }

    fn ratio(&self, source: RecallSource) -> f64 {
        match source {
            RecallSource::Collaborative => self.config.collaborative_ratio,
            RecallSource::Popular => self.config.popular_ratio,
            RecallSource::Recent => self.config.recent_ratio,
            RecallSource::Random => self.config.random_ratio,
        }
    }

    fn quota(&self, source: RecallSource) -> usize {
        (self.ratio(source) * self.config.batch_size as f64).round() as usize
    }

    /// Compose a fresh batch for the owner key. Infallible by contract:
    /// every data-source failure degrades to a smaller candidate pool.
    pub async fn compose(&self, key: &BatchKey) -> FeedBatch {
        let started = std::time::Instant::now();
        let target = self.config.batch_size;
        let preferred = key.language.as_deref();

        let suppression = self.suppression_set(key.user_id).await;

        // Fan out to all strategies concurrently; adapter calls are
        // side-effect-free reads.
        let fetches = self.strategies.iter().map(|strategy| {
            let quota = self.quota(strategy.source());
            let fetch_limit = (quota as f64 * self.config.buffer_factor).ceil() as usize;
            let suppression = &suppression;
            async move {
                match strategy
                    .fetch(key.user_id, &key.scope, suppression, fetch_limit)
                    .await
                {
                    Ok(candidates) => candidates,
                    Err(err) => {
                        warn!(
                            source = strategy.source().as_str(),
                            error = %err,
                            "recall strategy failed, degrading to empty"
                        );
                        Vec::new()
                    }
                }
            }
        });
        let fetched: Vec<Vec<Candidate>> = future::join_all(fetches).await;

        // Language weighting happens once, here; each strategy slice is
        // served best-score-first.
        let mut pools: Vec<Vec<ScoredCandidate>> = fetched
            .into_iter()
            .map(|candidates| {
                let mut scored: Vec<ScoredCandidate> = candidates
                    .into_iter()
                    .map(|candidate| ScoredCandidate {
                        final_score: scoring::final_score(
                            candidate.raw_score,
                            preferred,
                            &candidate.language,
                        ),
                        candidate,
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.final_score
                        .partial_cmp(&a.final_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                scored
            })
            .collect();

        let mut merged: Vec<ContentId> = Vec::with_capacity(target);
        let mut seen: HashSet<ContentId> = HashSet::with_capacity(target);
        let mut stats = CompositionStats::default();

        // First pass: each strategy fills its quota, first-seen wins.
        for (idx, strategy) in self.strategies.iter().enumerate() {
            let quota = self.quota(strategy.source());
            Self::drain_into(
                &mut pools[idx],
                quota,
                target,
                &mut merged,
                &mut seen,
                &mut stats,
            );
        }

        // Redistribute the shortfall proportionally across strategies that
        // still have candidates left over from the buffered fetch.
        self.redistribute(&mut pools, target, &mut merged, &mut seen, &mut stats);

        // Final top-up from the random strategy with an expanding exclude set.
        if merged.len() < target {
            self.top_up_random(key, &suppression, target, &mut merged, &mut seen, &mut stats)
                .await;
        }

        let batch = FeedBatch {
            batch_id: Uuid::new_v4(),
            content_ids: merged,
            composed_at: Utc::now(),
            stats,
        };

        info!(
            key = %key,
            batch_id = %batch.batch_id,
            size = batch.len(),
            collaborative = batch.stats.collaborative_count,
            popular = batch.stats.popular_count,
            recent = batch.stats.recent_count,
            random = batch.stats.random_count,
            deduplicated = batch.stats.deduplicated,
            topped_up = batch.stats.topped_up,
            "batch composed"
        );

        metrics::observe_batch_composition(&key.scope.cache_segment(), started.elapsed());
        metrics::record_batch_candidates(
            RecallSource::Collaborative.as_str(),
            batch.stats.collaborative_count as u64,
        );
        metrics::record_batch_candidates(
            RecallSource::Popular.as_str(),
            batch.stats.popular_count as u64,
        );
        metrics::record_batch_candidates(
            RecallSource::Recent.as_str(),
            batch.stats.recent_count as u64,
        );
        metrics::record_batch_candidates(
            RecallSource::Random.as_str(),
            batch.stats.random_count as u64,
        );

        batch
    }

    /// Recently-viewed window plus block list. Either source failing only
    /// weakens duplicate suppression, never the read path.
    async fn suppression_set(&self, user_id: Option<Uuid>) -> HashSet<ContentId> {
        let Some(user_id) = user_id else {
            return HashSet::new();
        };

        let mut suppression = match self
            .interactions
            .recently_viewed(user_id, self.config.history_window)
            .await
        {
            Ok(viewed) => viewed.into_iter().collect::<HashSet<_>>(),
            Err(err) => {
                warn!(%user_id, error = %err, "view history unavailable, skipping suppression");
                HashSet::new()
            }
        };

        match self.users.blocked_content(user_id).await {
            Ok(blocked) => suppression.extend(blocked),
            Err(err) => {
                warn!(%user_id, error = %err, "block list unavailable, skipping suppression");
            }
        }

        suppression
    }

    /// Move up to `take` unseen candidates from the pool into the batch
    fn drain_into(
        pool: &mut Vec<ScoredCandidate>,
        take: usize,
        target: usize,
        merged: &mut Vec<ContentId>,
        seen: &mut HashSet<ContentId>,
        stats: &mut CompositionStats,
    ) -> usize {
        let mut taken = 0;
        while taken < take && merged.len() < target && !pool.is_empty() {
            let scored = pool.remove(0);
            if !seen.insert(scored.candidate.content_id) {
                stats.deduplicated += 1;
                continue;
            }
            stats.record(scored.candidate.source);
            merged.push(scored.candidate.content_id);
            taken += 1;
        }
        taken
    }

    fn redistribute(
        &self,
        pools: &mut [Vec<ScoredCandidate>],
        target: usize,
        merged: &mut Vec<ContentId>,
        seen: &mut HashSet<ContentId>,
        stats: &mut CompositionStats,
    ) {
        loop {
            let deficit = target.saturating_sub(merged.len());
            if deficit == 0 {
                break;
            }

            let remaining: Vec<usize> = (0..self.strategies.len())
                .filter(|&idx| !pools[idx].is_empty())
                .collect();
            if remaining.is_empty() {
                break;
            }

            let ratio_sum: f64 = remaining
                .iter()
                .map(|&idx| self.ratio(self.strategies[idx].source()))
                .sum();

            let mut progressed = false;
            for &idx in &remaining {
                let ratio = self.ratio(self.strategies[idx].source());
                let share = ((deficit as f64 * ratio / ratio_sum).ceil() as usize).max(1);
                if Self::drain_into(&mut pools[idx], share, target, merged, seen, stats) > 0 {
                    progressed = true;
                }
                if merged.len() >= target {
                    break;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    async fn top_up_random(
        &self,
        key: &BatchKey,
        suppression: &HashSet<ContentId>,
        target: usize,
        merged: &mut Vec<ContentId>,
        seen: &mut HashSet<ContentId>,
        stats: &mut CompositionStats,
    ) {
        let Some(random) = self
            .strategies
            .iter()
            .find(|s| s.source() == RecallSource::Random)
        else {
            return;
        };

        for _ in 0..TOP_UP_ROUNDS {
            let deficit = target.saturating_sub(merged.len());
            if deficit == 0 {
                return;
            }

            let mut exclude: HashSet<ContentId> = suppression.clone();
            exclude.extend(seen.iter().copied());

            let extra = match random.fetch(key.user_id, &key.scope, &exclude, deficit).await {
                Ok(extra) => extra,
                Err(err) => {
                    warn!(error = %err, "random top-up failed, leaving batch short");
                    return;
                }
            };
            if extra.is_empty() {
                return;
            }

            for candidate in extra {
                if merged.len() >= target {
                    return;
                }
                if !seen.insert(candidate.content_id) {
                    continue;
                }
                stats.record(candidate.source);
                stats.topped_up += 1;
                merged.push(candidate.content_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::{MemoryInteractionStore, MemoryUserDirectory};
    use crate::models::FeedScope;
    use crate::services::recall::MockRecallStrategy;
    use mockall::predicate::always;

    fn candidates(source: RecallSource, count: usize, language: &str) -> Vec<Candidate> {
        (0..count)
            .map(|i| Candidate {
                content_id: Uuid::new_v4(),
                source,
                raw_score: (count - i) as f64,
                language: language.to_string(),
            })
            .collect()
    }

    fn mock_strategy(source: RecallSource, supply: Vec<Candidate>) -> Arc<dyn RecallStrategy> {
        let mut mock = MockRecallStrategy::new();
        mock.expect_source().return_const(source);
        mock.expect_fetch()
            .with(always(), always(), always(), always())
            .returning(move |_, _, exclude, limit| {
                Ok(supply
                    .iter()
                    .filter(|c| !exclude.contains(&c.content_id))
                    .take(limit)
                    .cloned()
                    .collect())
            });
        Arc::new(mock)
    }

    fn failing_strategy(source: RecallSource) -> Arc<dyn RecallStrategy> {
        let mut mock = MockRecallStrategy::new();
        mock.expect_source().return_const(source);
        mock.expect_fetch()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("upstream timeout")));
        Arc::new(mock)
    }

    fn composer_with(strategies: Vec<Arc<dyn RecallStrategy>>, batch_size: usize) -> BatchComposer {
        let config = FeedConfig {
            batch_size,
            ..Default::default()
        };
        BatchComposer::new(
            strategies,
            Arc::new(MemoryUserDirectory::new()),
            Arc::new(MemoryInteractionStore::new()),
            config,
        )
    }

    fn main_key() -> BatchKey {
        BatchKey::new(Some(Uuid::new_v4()), FeedScope::Main, None)
    }

    #[tokio::test]
    async fn test_quota_split_with_ample_supply() {
        let strategies = vec![
            mock_strategy(
                RecallSource::Collaborative,
                candidates(RecallSource::Collaborative, 100, "en"),
            ),
            mock_strategy(
                RecallSource::Popular,
                candidates(RecallSource::Popular, 100, "en"),
            ),
            mock_strategy(
                RecallSource::Recent,
                candidates(RecallSource::Recent, 100, "en"),
            ),
            mock_strategy(
                RecallSource::Random,
                candidates(RecallSource::Random, 100, "en"),
            ),
        ];
        let composer = composer_with(strategies, 100);

        let batch = composer.compose(&main_key()).await;

        assert_eq!(batch.len(), 100);
        assert_eq!(batch.stats.collaborative_count, 40);
        assert_eq!(batch.stats.popular_count, 30);
        assert_eq!(batch.stats.recent_count, 10);
        assert_eq!(batch.stats.random_count, 20);
    }

    #[tokio::test]
    async fn test_no_duplicate_content_ids() {
        let shared = candidates(RecallSource::Collaborative, 60, "en");
        let mut popular_supply: Vec<Candidate> = shared
            .iter()
            .map(|c| Candidate {
                source: RecallSource::Popular,
                ..c.clone()
            })
            .collect();
        popular_supply.extend(candidates(RecallSource::Popular, 60, "en"));

        let strategies = vec![
            mock_strategy(RecallSource::Collaborative, shared),
            mock_strategy(RecallSource::Popular, popular_supply),
            mock_strategy(RecallSource::Recent, candidates(RecallSource::Recent, 60, "en")),
            mock_strategy(RecallSource::Random, candidates(RecallSource::Random, 60, "en")),
        ];
        let composer = composer_with(strategies, 100);

        let batch = composer.compose(&main_key()).await;

        let unique: HashSet<ContentId> = batch.content_ids.iter().copied().collect();
        assert_eq!(unique.len(), batch.len());
        assert_eq!(batch.len(), 100);
    }

    #[tokio::test]
    async fn test_underflow_redistributes_to_full_batch() {
        // Collaborative has no history; others have plenty.
        let strategies = vec![
            mock_strategy(RecallSource::Collaborative, Vec::new()),
            mock_strategy(
                RecallSource::Popular,
                candidates(RecallSource::Popular, 200, "en"),
            ),
            mock_strategy(
                RecallSource::Recent,
                candidates(RecallSource::Recent, 200, "en"),
            ),
            mock_strategy(
                RecallSource::Random,
                candidates(RecallSource::Random, 200, "en"),
            ),
        ];
        let composer = composer_with(strategies, 100);

        let batch = composer.compose(&main_key()).await;

        assert_eq!(batch.len(), 100);
        assert_eq!(batch.stats.collaborative_count, 0);
        assert!(batch.stats.popular_count > 30);
    }

    #[tokio::test]
    async fn test_adapter_failure_degrades_not_fails() {
        let strategies = vec![
            failing_strategy(RecallSource::Collaborative),
            mock_strategy(
                RecallSource::Popular,
                candidates(RecallSource::Popular, 200, "en"),
            ),
            mock_strategy(
                RecallSource::Recent,
                candidates(RecallSource::Recent, 200, "en"),
            ),
            mock_strategy(
                RecallSource::Random,
                candidates(RecallSource::Random, 200, "en"),
            ),
        ];
        let composer = composer_with(strategies, 100);

        let batch = composer.compose(&main_key()).await;
        assert_eq!(batch.len(), 100);
    }

    #[tokio::test]
    async fn test_all_sources_empty_yields_empty_batch() {
        let strategies = vec![
            mock_strategy(RecallSource::Collaborative, Vec::new()),
            mock_strategy(RecallSource::Popular, Vec::new()),
            mock_strategy(RecallSource::Recent, Vec::new()),
            mock_strategy(RecallSource::Random, Vec::new()),
        ];
        let composer = composer_with(strategies, 100);

        let batch = composer.compose(&main_key()).await;
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_preferred_language_ranks_first_on_equal_raw_score() {
        let en_id = Uuid::new_v4();
        let ko_id = Uuid::new_v4();
        let supply = vec![
            Candidate {
                content_id: en_id,
                source: RecallSource::Popular,
                raw_score: 10.0,
                language: "en".into(),
            },
            Candidate {
                content_id: ko_id,
                source: RecallSource::Popular,
                raw_score: 10.0,
                language: "ko".into(),
            },
        ];
        let strategies = vec![
            mock_strategy(RecallSource::Collaborative, Vec::new()),
            mock_strategy(RecallSource::Popular, supply),
            mock_strategy(RecallSource::Recent, Vec::new()),
            mock_strategy(RecallSource::Random, Vec::new()),
        ];
        let composer = composer_with(strategies, 10);

        let key = BatchKey::new(Some(Uuid::new_v4()), FeedScope::Main, Some("ko".into()));
        let batch = composer.compose(&key).await;

        assert_eq!(batch.content_ids[0], ko_id);
        assert_eq!(batch.content_ids[1], en_id);
    }
}
