//! In-memory collaborator implementations.
//!
//! Used as dev-mode stand-ins when the service runs without its upstream
//! services, and as seedable fixtures in integration tests. The index keeps
//! a call counter so tests can assert how many recall passes actually hit
//! the data source.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use super::{ContentCatalog, ContentIndex, IndexEntry, InteractionStore, SimilarItem, UserDirectory};
use crate::models::{ContentId, ContentSummary, FeedScope, InteractionCounts, InteractionFlags};

#[derive(Default)]
pub struct MemoryUserDirectory {
    languages: DashMap<Uuid, String>,
    blocks: DashMap<Uuid, HashSet<ContentId>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_language(&self, user_id: Uuid, language: &str) {
        self.languages.insert(user_id, language.to_string());
    }

    pub fn block_content(&self, user_id: Uuid, content_id: ContentId) {
        self.blocks.entry(user_id).or_default().insert(content_id);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn preferred_language(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.languages.get(&user_id).map(|l| l.clone()))
    }

    async fn blocked_content(&self, user_id: Uuid) -> Result<HashSet<ContentId>> {
        Ok(self
            .blocks
            .get(&user_id)
            .map(|set| set.clone())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryInteractionStore {
    views: DashMap<Uuid, Vec<ContentId>>,
    counts: DashMap<ContentId, InteractionCounts>,
    similar: DashMap<ContentId, Vec<SimilarItem>>,
    likes: DashMap<Uuid, HashSet<ContentId>>,
    saves: DashMap<Uuid, HashSet<ContentId>>,
}

impl MemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a view, most recent first
    pub fn record_view(&self, user_id: Uuid, content_id: ContentId) {
        self.views.entry(user_id).or_default().insert(0, content_id);
    }

    pub fn set_counts(&self, content_id: ContentId, counts: InteractionCounts) {
        self.counts.insert(content_id, counts);
    }

    pub fn add_similar(&self, seed: ContentId, item: SimilarItem) {
        let mut entry = self.similar.entry(seed).or_default();
        entry.push(item);
        entry.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    pub fn like(&self, user_id: Uuid, content_id: ContentId) {
        self.likes.entry(user_id).or_default().insert(content_id);
    }

    pub fn save(&self, user_id: Uuid, content_id: ContentId) {
        self.saves.entry(user_id).or_default().insert(content_id);
    }
}

#[async_trait]
impl InteractionStore for MemoryInteractionStore {
    async fn recently_viewed(&self, user_id: Uuid, window: usize) -> Result<Vec<ContentId>> {
        Ok(self
            .views
            .get(&user_id)
            .map(|v| v.iter().take(window).copied().collect())
            .unwrap_or_default())
    }

    async fn interaction_counts(
        &self,
        ids: &[ContentId],
    ) -> Result<HashMap<ContentId, InteractionCounts>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.counts.get(id).map(|c| (*id, *c)))
            .collect())
    }

    async fn similar_items(&self, content_id: ContentId, limit: usize) -> Result<Vec<SimilarItem>> {
        Ok(self
            .similar
            .get(&content_id)
            .map(|items| items.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn interaction_flags(
        &self,
        user_id: Uuid,
        ids: &[ContentId],
    ) -> Result<HashMap<ContentId, InteractionFlags>> {
        let likes = self.likes.get(&user_id);
        let saves = self.saves.get(&user_id);
        Ok(ids
            .iter()
            .map(|id| {
                let flags = InteractionFlags {
                    liked: likes.as_ref().map(|s| s.contains(id)).unwrap_or(false),
                    saved: saves.as_ref().map(|s| s.contains(id)).unwrap_or(false),
                };
                (*id, flags)
            })
            .collect())
    }
}

struct IndexedItem {
    entry: IndexEntry,
    category: String,
}

/// Creation-time ordered index over seeded content, with a follow graph
/// backing the following scope
#[derive(Default)]
pub struct MemoryContentIndex {
    items: RwLock<Vec<IndexedItem>>,
    follows: DashMap<Uuid, HashSet<Uuid>>,
    recent_calls: AtomicUsize,
}

impl MemoryContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, entry: IndexEntry, category: &str) {
        let mut items = self.items.write().expect("index lock poisoned");
        items.push(IndexedItem {
            entry,
            category: category.to_string(),
        });
        items.sort_by(|a, b| b.entry.created_at.cmp(&a.entry.created_at));
    }

    pub fn follow(&self, user_id: Uuid, author_id: Uuid) {
        self.follows.entry(user_id).or_default().insert(author_id);
    }

    /// Number of recall passes that hit this index
    pub fn recent_calls(&self) -> usize {
        self.recent_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentIndex for MemoryContentIndex {
    async fn recent_in_scope(
        &self,
        user_id: Option<Uuid>,
        scope: &FeedScope,
        limit: usize,
    ) -> Result<Vec<IndexEntry>> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);

        let followed: Option<HashSet<Uuid>> = match scope {
            FeedScope::Following => Some(
                user_id
                    .and_then(|user_id| self.follows.get(&user_id).map(|set| set.clone()))
                    .unwrap_or_default(),
            ),
            _ => None,
        };

        let items = self.items.read().expect("index lock poisoned");
        Ok(items
            .iter()
            .filter(|item| match scope {
                FeedScope::Main => true,
                FeedScope::Following => followed
                    .as_ref()
                    .map(|set| set.contains(&item.entry.author_id))
                    .unwrap_or(false),
                FeedScope::Category(category) => item.category == *category,
            })
            .take(limit)
            .map(|item| item.entry.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryContentCatalog {
    summaries: DashMap<ContentId, ContentSummary>,
}

impl MemoryContentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, summary: ContentSummary) {
        self.summaries.insert(summary.id, summary);
    }
}

#[async_trait]
impl ContentCatalog for MemoryContentCatalog {
    async fn content_summaries(&self, ids: &[ContentId]) -> Result<Vec<ContentSummary>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.summaries.get(id).map(|s| s.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_index_scope_filtering() {
        let index = MemoryContentIndex::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        index.add(
            IndexEntry {
                content_id: a,
                author_id: Uuid::new_v4(),
                language: "ko".into(),
                created_at: Utc::now(),
            },
            "music",
        );
        index.add(
            IndexEntry {
                content_id: b,
                author_id: Uuid::new_v4(),
                language: "en".into(),
                created_at: Utc::now(),
            },
            "dance",
        );

        let music = index
            .recent_in_scope(None, &FeedScope::Category("music".into()), 10)
            .await
            .unwrap();
        assert_eq!(music.len(), 1);
        assert_eq!(music[0].content_id, a);

        let main = index
            .recent_in_scope(None, &FeedScope::Main, 10)
            .await
            .unwrap();
        assert_eq!(main.len(), 2);
        assert_eq!(index.recent_calls(), 2);
    }

    #[tokio::test]
    async fn test_index_following_scope_uses_follow_graph() {
        let index = MemoryContentIndex::new();
        let user = Uuid::new_v4();
        let followed_author = Uuid::new_v4();
        let other_author = Uuid::new_v4();
        let followed_item = Uuid::new_v4();
        index.add(
            IndexEntry {
                content_id: followed_item,
                author_id: followed_author,
                language: "en".into(),
                created_at: Utc::now(),
            },
            "music",
        );
        index.add(
            IndexEntry {
                content_id: Uuid::new_v4(),
                author_id: other_author,
                language: "en".into(),
                created_at: Utc::now(),
            },
            "music",
        );
        index.follow(user, followed_author);

        let following = index
            .recent_in_scope(Some(user), &FeedScope::Following, 10)
            .await
            .unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].content_id, followed_item);

        // No follow edges: nothing to serve
        let stranger = index
            .recent_in_scope(Some(Uuid::new_v4()), &FeedScope::Following, 10)
            .await
            .unwrap();
        assert!(stranger.is_empty());
    }

    #[tokio::test]
    async fn test_recently_viewed_order_and_window() {
        let store = MemoryInteractionStore::new();
        let user = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.record_view(user, first);
        store.record_view(user, second);

        let viewed = store.recently_viewed(user, 1).await.unwrap();
        assert_eq!(viewed, vec![second]);
    }
}
