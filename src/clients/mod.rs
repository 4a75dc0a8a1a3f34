//! External collaborator interfaces.
//!
//! The feed core only reads from these stores; production implementations
//! live in other services and are wired in at startup. [`memory`] provides
//! seedable in-process implementations for local development and tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{ContentId, ContentSummary, FeedScope, InteractionCounts, InteractionFlags};

/// Entry in the creation-time / per-category content index
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub content_id: ContentId,
    pub author_id: Uuid,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

/// Pre-computed item similarity edge (co-interaction based)
#[derive(Debug, Clone)]
pub struct SimilarItem {
    pub content_id: ContentId,
    pub similarity: f64,
    pub language: String,
}

/// User/block service: language preference and block-list reads
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn preferred_language(&self, user_id: Uuid) -> Result<Option<String>>;

    /// Content ids the user must never see (blocked creators' content)
    async fn blocked_content(&self, user_id: Uuid) -> Result<HashSet<ContentId>>;
}

/// Interaction history store: view history, engagement counters, similarity
/// matrix lookups, and per-user interaction flags
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Most-recent-first view history, capped at `window`
    async fn recently_viewed(&self, user_id: Uuid, window: usize) -> Result<Vec<ContentId>>;

    async fn interaction_counts(
        &self,
        ids: &[ContentId],
    ) -> Result<HashMap<ContentId, InteractionCounts>>;

    /// Top similar items for a seed, similarity descending
    async fn similar_items(&self, content_id: ContentId, limit: usize) -> Result<Vec<SimilarItem>>;

    async fn interaction_flags(
        &self,
        user_id: Uuid,
        ids: &[ContentId],
    ) -> Result<HashMap<ContentId, InteractionFlags>>;
}

/// Content-for-category / creation-time index used by the recall strategies
#[async_trait]
pub trait ContentIndex: Send + Sync {
    /// Newest-first entries within a scope. The following scope restricts
    /// to the user's followed creators, so the requesting user comes along.
    async fn recent_in_scope(
        &self,
        user_id: Option<Uuid>,
        scope: &FeedScope,
        limit: usize,
    ) -> Result<Vec<IndexEntry>>;
}

/// Content metadata store used for page hydration
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn content_summaries(&self, ids: &[ContentId]) -> Result<Vec<ContentSummary>>;
}
