//! Public feed API: cursor pagination over cached batches plus hydration.

use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clients::{ContentCatalog, InteractionStore, UserDirectory};
use crate::error::{AppError, Result};
use crate::models::{
    BatchKey, ContentId, FeedItem, FeedResponse, FeedScope, InteractionFlags,
};
use crate::services::cache::BatchCache;

pub const MAX_PAGE_LIMIT: usize = 100;

/// Opaque page cursor: base64 of the batch-relative offset
pub fn encode_cursor(offset: usize) -> String {
    general_purpose::STANDARD.encode(offset.to_string())
}

/// Lenient by contract: malformed or negative cursors read as offset 0
/// rather than failing the request.
pub fn decode_cursor(cursor: Option<&str>) -> usize {
    match cursor {
        Some(cursor) if !cursor.is_empty() => general_purpose::STANDARD
            .decode(cursor)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .and_then(|text| text.parse::<usize>().ok())
            .unwrap_or(0),
        _ => 0,
    }
}

pub struct FeedService {
    cache: Arc<BatchCache>,
    users: Arc<dyn UserDirectory>,
    interactions: Arc<dyn InteractionStore>,
    catalog: Arc<dyn ContentCatalog>,
}

impl FeedService {
    pub fn new(
        cache: Arc<BatchCache>,
        users: Arc<dyn UserDirectory>,
        interactions: Arc<dyn InteractionStore>,
        catalog: Arc<dyn ContentCatalog>,
    ) -> Self {
        Self {
            cache,
            users,
            interactions,
            catalog,
        }
    }

    /// One paginated read. Serves a slice of the cached batch, advances the
    /// consumption cursor, and hydrates the slice with display metadata and
    /// per-user interaction flags.
    pub async fn get_page(
        &self,
        user_id: Option<Uuid>,
        scope: FeedScope,
        language: Option<String>,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<FeedResponse> {
        if scope.requires_user() && user_id.is_none() {
            return Err(AppError::Unauthorized(format!(
                "{} feed requires an authenticated user",
                scope.cache_segment()
            )));
        }

        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let key = self.owner_key(user_id, scope, language).await;
        let batch = self.cache.get_or_compose(&key).await?;

        let offset = decode_cursor(cursor.as_deref());
        let len = batch.len();
        let start = offset.min(len);
        let end = offset.saturating_add(limit).min(len);
        let slice = &batch.content_ids[start..end];
        let has_next = end < len;

        debug!(
            key = %key,
            batch_id = %batch.batch_id,
            offset,
            page = slice.len(),
            has_next,
            "feed page served"
        );

        self.cache.maybe_prefetch_next(&key, end);

        let content = self.hydrate(user_id, slice).await?;
        Ok(FeedResponse {
            count: content.len(),
            content,
            next_cursor: has_next.then(|| encode_cursor(end)),
            has_next,
        })
    }

    /// Explicit user-triggered refresh: drops the cached batch (and its
    /// prefetched successor); the next read recomposes from scratch.
    pub async fn refresh(
        &self,
        user_id: Option<Uuid>,
        scope: FeedScope,
        language: Option<String>,
    ) -> Result<()> {
        if scope.requires_user() && user_id.is_none() {
            return Err(AppError::Unauthorized(format!(
                "{} feed refresh requires an authenticated user",
                scope.cache_segment()
            )));
        }

        let key = self.owner_key(user_id, scope, language).await;
        self.cache.invalidate(&key);
        Ok(())
    }

    /// Owner key derivation. The following feed skips language weighting,
    /// so its key carries no language; elsewhere an explicit request
    /// language wins over the stored preference.
    async fn owner_key(
        &self,
        user_id: Option<Uuid>,
        scope: FeedScope,
        language: Option<String>,
    ) -> BatchKey {
        let language = if scope == FeedScope::Following {
            None
        } else {
            match (language, user_id) {
                (Some(language), _) => Some(language),
                (None, Some(user_id)) => match self.users.preferred_language(user_id).await {
                    Ok(preferred) => preferred,
                    Err(err) => {
                        warn!(%user_id, error = %err, "preferred language lookup failed");
                        None
                    }
                },
                (None, None) => None,
            }
        };
        BatchKey::new(user_id, scope, language)
    }

    /// Metadata hydration. The content catalog is required (its outage is a
    /// service error; the batch stays cached and reusable), while missing
    /// interaction flags degrade to false.
    async fn hydrate(&self, user_id: Option<Uuid>, ids: &[ContentId]) -> Result<Vec<FeedItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let summaries = self
            .catalog
            .content_summaries(ids)
            .await
            .map_err(|err| AppError::Unavailable(format!("content catalog: {}", err)))?;
        let by_id: HashMap<ContentId, _> = summaries.into_iter().map(|s| (s.id, s)).collect();

        let flags: HashMap<ContentId, InteractionFlags> = match user_id {
            Some(user_id) => match self.interactions.interaction_flags(user_id, ids).await {
                Ok(flags) => flags,
                Err(err) => {
                    warn!(%user_id, error = %err, "interaction flags unavailable, defaulting");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        // Batch order is the serving order; ids whose metadata vanished
        // between composition and read are dropped from the page.
        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id).cloned())
            .map(|summary| {
                let flag = flags.get(&summary.id).copied().unwrap_or_default();
                FeedItem {
                    id: summary.id,
                    title: summary.title,
                    thumbnail_url: summary.thumbnail_url,
                    language: summary.language,
                    category: summary.category,
                    created_at: summary.created_at,
                    is_liked: flag.liked,
                    is_saved: flag.saved,
                }
            })
            .collect())
    }
}
