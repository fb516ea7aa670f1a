use std::time::Duration;

use anyhow::Result;
use feed_rs::parser;
use log::debug;
use reqwest::{Client, Url};

use crate::aggregate::FetchCategory;
use crate::error::FeedError;
use crate::models::JobItem;
use crate::render::strip_html;

const USER_AGENT: &str = "jobfeed-bot/0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Fetches and parses one category's worth of the remote RSS feed.
/// Stateless apart from the HTTP client; all-or-nothing per request.
pub struct FeedClient {
    client: Client,
    base_url: Url,
}

impl FeedClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url: Url::parse(base_url)? })
    }

    /// Request URL for one (category, experience set) combination. No category
    /// parameter means the unfiltered feed; each experience level is a
    /// repeated query parameter.
    pub fn build_url(&self, category: Option<&str>, exp_levels: &[String]) -> Url {
        let mut url = self.base_url.clone();
        if category.is_some() || !exp_levels.is_empty() {
            let mut pairs = url.query_pairs_mut();
            if let Some(category) = category {
                pairs.append_pair("primary_keyword", category);
            }
            for level in exp_levels {
                pairs.append_pair("exp_level", level);
            }
        }
        url
    }

    pub async fn fetch(
        &self,
        category: Option<&str>,
        exp_levels: &[String],
    ) -> Result<Vec<JobItem>, FeedError> {
        let url = self.build_url(category, exp_levels);
        debug!("fetching feed: {url}");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }
        let bytes = response.bytes().await?;
        parse_items(&bytes)
    }
}

impl FetchCategory for FeedClient {
    async fn fetch(&self, category: Option<&str>, exp_levels: &[String]) -> Result<Vec<JobItem>, FeedError> {
        FeedClient::fetch(self, category, exp_levels).await
    }
}

/// Parse a syndication document into normalized items, provider order kept.
/// Entries without a link cannot be delivered or watermarked and are dropped.
pub(crate) fn parse_items(bytes: &[u8]) -> Result<Vec<JobItem>, FeedError> {
    let feed = parser::parse(bytes)?;
    Ok(feed.entries.into_iter().filter_map(entry_to_item).collect())
}

fn entry_to_item(entry: feed_rs::model::Entry) -> Option<JobItem> {
    let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
    if link.is_empty() {
        return None;
    }

    let title = entry
        .title
        .map(|t| t.content)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let published_at = entry.published;

    // Stable identity: provider guid, falling back to the link.
    let id = if entry.id.trim().is_empty() { link.clone() } else { entry.id };

    let category = entry
        .categories
        .iter()
        .find(|c| !c.term.trim().is_empty())
        .map(|c| c.term.trim().to_string())
        .unwrap_or_else(|| "N/A".to_string());

    let summary = entry.summary.map(|t| strip_html(&t.content)).unwrap_or_default();

    Some(JobItem { id, title, link, category, summary, published_at })
}
