//! Merges per-category feed fetches into one freshness-ordered sequence.

use std::collections::HashSet;

use futures::future::try_join_all;

use crate::error::FeedError;
use crate::models::{ALL_CATEGORIES, JobItem};

/// One feed request for a single category selector. `None` selects the
/// unfiltered feed. Implemented by `FeedClient`; stubbed in tests.
#[allow(async_fn_in_trait)]
pub trait FetchCategory {
    async fn fetch(&self, category: Option<&str>, exp_levels: &[String]) -> Result<Vec<JobItem>, FeedError>;
}

/// The merged view a dispatch cycle works from. Implemented by `Aggregator`.
#[allow(async_fn_in_trait)]
pub trait JobSource {
    async fn fetch_merged(&self, categories: &[String], exp_levels: &[String]) -> Result<Vec<JobItem>, FeedError>;
}

pub struct Aggregator<C> {
    client: C,
}

impl<C: FetchCategory> Aggregator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: FetchCategory> JobSource for Aggregator<C> {
    /// Empty filter set means no polling at all. The `all` sentinel collapses
    /// to a single unfiltered request; otherwise categories are fetched
    /// concurrently and any failure fails the whole merge.
    async fn fetch_merged(
        &self,
        categories: &[String],
        exp_levels: &[String],
    ) -> Result<Vec<JobItem>, FeedError> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let merged = if categories.iter().any(|c| c == ALL_CATEGORIES) {
            self.client.fetch(None, exp_levels).await?
        } else {
            let fetches = categories
                .iter()
                .map(|category| self.client.fetch(Some(category), exp_levels));
            // try_join_all keeps request order, so the dedup survivor below
            // never depends on completion timing.
            try_join_all(fetches).await?.into_iter().flatten().collect()
        };

        Ok(order_and_dedup(merged))
    }
}

/// Freshest first across all categories; undated items sink to the end.
/// Duplicates by normalized link keep the first (freshest) occurrence.
fn order_and_dedup(mut items: Vec<JobItem>) -> Vec<JobItem> {
    items.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.normalized_link()));
    items
}
