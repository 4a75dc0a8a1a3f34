//! Candidate recall strategies.
//!
//! Four independent retrieval strategies feed the batch composer. Every
//! strategy is a side-effect-free read and degrades to an empty candidate
//! list on data-source failure; the composer compensates by redistribution.

mod collaborative;
mod popular;
mod random;
mod recent;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{Candidate, ContentId, FeedScope, RecallSource};

pub use collaborative::CollaborativeStrategy;
pub use popular::PopularStrategy;
pub use random::RandomStrategy;
pub use recent::RecentStrategy;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecallStrategy: Send + Sync {
    /// Ranked candidates for a user/scope, skipping everything in `exclude`.
    /// Anonymous reads pass `user_id = None`.
    async fn fetch(
        &self,
        user_id: Option<Uuid>,
        scope: &FeedScope,
        exclude: &HashSet<ContentId>,
        limit: usize,
    ) -> Result<Vec<Candidate>>;

    fn source(&self) -> RecallSource;
}
