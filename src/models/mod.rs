use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ContentId = Uuid;

/// Which recall strategy produced a candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecallSource {
    Collaborative,
    Popular,
    Recent,
    Random,
}

impl RecallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallSource::Collaborative => "collaborative",
            RecallSource::Popular => "popular",
            RecallSource::Recent => "recent",
            RecallSource::Random => "random",
        }
    }
}

/// Feed context: main feed, following-only feed, or a single category
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedScope {
    Main,
    Following,
    Category(String),
}

impl FeedScope {
    /// Stable segment for cache keys and logging
    pub fn cache_segment(&self) -> String {
        match self {
            FeedScope::Main => "main".to_string(),
            FeedScope::Following => "following".to_string(),
            FeedScope::Category(category) => format!("category:{}", category),
        }
    }

    /// Main and following feeds are meaningless without a user
    pub fn requires_user(&self) -> bool {
        matches!(self, FeedScope::Main | FeedScope::Following)
    }
}

/// Cache owner key: one batch lineage per (user, scope, language)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub user_id: Option<Uuid>,
    pub scope: FeedScope,
    pub language: Option<String>,
}

impl BatchKey {
    pub fn new(user_id: Option<Uuid>, scope: FeedScope, language: Option<String>) -> Self {
        Self {
            user_id,
            scope,
            language,
        }
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let user = self
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "anon".to_string());
        let language = self.language.as_deref().unwrap_or("-");
        write!(f, "batch:{}:{}:{}", user, self.scope.cache_segment(), language)
    }
}

/// Raw candidate produced by a recall strategy; ephemeral, never persisted
#[derive(Debug, Clone)]
pub struct Candidate {
    pub content_id: ContentId,
    pub source: RecallSource,
    pub raw_score: f64,
    pub language: String,
}

/// Candidate after language weighting at composition time
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub final_score: f64,
}

/// Per-strategy accounting for one composition pass
#[derive(Debug, Clone, Default)]
pub struct CompositionStats {
    pub collaborative_count: usize,
    pub popular_count: usize,
    pub recent_count: usize,
    pub random_count: usize,
    pub deduplicated: usize,
    pub topped_up: usize,
}

impl CompositionStats {
    pub fn record(&mut self, source: RecallSource) {
        match source {
            RecallSource::Collaborative => self.collaborative_count += 1,
            RecallSource::Popular => self.popular_count += 1,
            RecallSource::Recent => self.recent_count += 1,
            RecallSource::Random => self.random_count += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.collaborative_count + self.popular_count + self.recent_count + self.random_count
    }
}

/// Composed batch: the serving order for all pages until TTL expiry.
/// Immutable once composed; content ids are unique.
#[derive(Debug, Clone)]
pub struct FeedBatch {
    pub batch_id: Uuid,
    pub content_ids: Vec<ContentId>,
    pub composed_at: DateTime<Utc>,
    pub stats: CompositionStats,
}

impl FeedBatch {
    pub fn len(&self) -> usize {
        self.content_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content_ids.is_empty()
    }
}

/// Interaction counters feeding the popularity formula
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InteractionCounts {
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub save_count: u64,
    pub share_count: u64,
}

/// Per-user flags attached to hydrated feed items
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionFlags {
    pub liked: bool,
    pub saved: bool,
}

/// Display metadata from the content catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSummary {
    pub id: ContentId,
    pub title: String,
    pub thumbnail_url: String,
    pub language: String,
    pub category: String,
    pub created_at: i64,
}

/// Hydrated feed entry returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: ContentId,
    pub title: String,
    pub thumbnail_url: String,
    pub language: String,
    pub category: String,
    pub created_at: i64,
    pub is_liked: bool,
    pub is_saved: bool,
}

/// Feed page response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub content: Vec<FeedItem>,
    pub next_cursor: Option<String>,
    pub has_next: bool,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_key_format() {
        let user = Uuid::new_v4();
        let key = BatchKey::new(Some(user), FeedScope::Main, Some("ko".to_string()));
        assert_eq!(key.to_string(), format!("batch:{}:main:ko", user));

        let anon = BatchKey::new(None, FeedScope::Category("music".to_string()), None);
        assert_eq!(anon.to_string(), "batch:anon:category:music:-");
    }

    #[test]
    fn test_scope_requires_user() {
        assert!(FeedScope::Main.requires_user());
        assert!(FeedScope::Following.requires_user());
        assert!(!FeedScope::Category("dance".to_string()).requires_user());
    }

    #[test]
    fn test_composition_stats_record() {
        let mut stats = CompositionStats::default();
        stats.record(RecallSource::Collaborative);
        stats.record(RecallSource::Collaborative);
        stats.record(RecallSource::Random);
        assert_eq!(stats.collaborative_count, 2);
        assert_eq!(stats.random_count, 1);
        assert_eq!(stats.total(), 3);
    }
}
