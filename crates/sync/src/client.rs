//! HTTP client for the inventory feed.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::item::FeedItem;

/// Page size used for the listing endpoint.
pub const PAGE_SIZE: usize = 100;

/// Hard cap on pagination rounds; a guard against a feed that never shortens.
pub const MAX_PAGES: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SyncError {
    /// The API key was rejected.
    #[error("inventory API authentication failed (401); check the API key")]
    Unauthorized,

    #[error("inventory API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("inventory API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inventory API response could not be decoded: {0}")]
    Decode(String),

    /// Client construction failed (bad base URL, TLS setup, ...).
    #[error("inventory client configuration error: {0}")]
    Config(String),
}

/// The listing body: either wrapped in `inventoryItems` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingBody {
    Wrapped {
        #[serde(rename = "inventoryItems")]
        inventory_items: Vec<FeedItem>,
    },
    Bare(Vec<FeedItem>),
}

impl ListingBody {
    fn into_items(self) -> Vec<FeedItem> {
        match self {
            ListingBody::Wrapped { inventory_items } => inventory_items,
            ListingBody::Bare(items) => items,
        }
    }
}

/// One page of the paginated listing.
///
/// Abstracting the page fetch keeps the pagination loop and the sync runner
/// testable without HTTP.
pub trait PageSource {
    fn fetch_page(
        &self,
        skip: usize,
        page_size: usize,
    ) -> impl Future<Output = Result<Vec<FeedItem>, SyncError>> + Send;
}

/// Client for the external inventory API.
///
/// Authenticates with a static key in the `X-API-KEY` header; all calls carry
/// a 30 second timeout.
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl InventoryClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Probe the API with a single-item listing to validate credentials.
    pub async fn test_connection(&self) -> Result<(), SyncError> {
        self.fetch_page(0, 1).await.map(|_| ())
    }

    /// Fetch every item via [`fetch_all_items`] pagination.
    pub async fn fetch_all(&self) -> Result<Vec<FeedItem>, SyncError> {
        fetch_all_items(self).await
    }
}

impl PageSource for InventoryClient {
    async fn fetch_page(&self, skip: usize, page_size: usize) -> Result<Vec<FeedItem>, SyncError> {
        let url = format!("{}/inventory-items", self.base_url);
        tracing::debug!(%url, skip, page_size, "fetching inventory page");

        let response = self
            .http
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("pageSize", page_size), ("skip", skip)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_slice::<ListingBody>(&bytes)
            .map(ListingBody::into_items)
            .map_err(|e| SyncError::Decode(e.to_string()))
    }
}

/// Page through the listing until it runs dry.
///
/// Stops on an empty page, a short page (fewer than `PAGE_SIZE` items), or
/// after `MAX_PAGES` rounds.
pub async fn fetch_all_items<S: PageSource>(source: &S) -> Result<Vec<FeedItem>, SyncError> {
    let mut all_items = Vec::new();
    let mut skip = 0;

    for page in 0..MAX_PAGES {
        let items = source.fetch_page(skip, PAGE_SIZE).await?;
        if items.is_empty() {
            tracing::debug!(page, "empty page, stopping pagination");
            break;
        }

        let short = items.len() < PAGE_SIZE;
        tracing::debug!(page, count = items.len(), "fetched inventory page");
        all_items.extend(items);

        if short {
            break;
        }
        skip += PAGE_SIZE;
    }

    tracing::info!(total = all_items.len(), "inventory listing complete");
    Ok(all_items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        total: usize,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(total: usize) -> Self {
            Self {
                total,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PageSource for FakeSource {
        async fn fetch_page(
            &self,
            skip: usize,
            page_size: usize,
        ) -> Result<Vec<FeedItem>, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.total.saturating_sub(skip);
            let count = remaining.min(page_size);
            Ok((0..count).map(|_| FeedItem::default()).collect())
        }
    }

    #[tokio::test]
    async fn short_page_ends_pagination() {
        let source = FakeSource::new(250);
        let items = fetch_all_items(&source).await.unwrap();
        assert_eq!(items.len(), 250);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_trailing_empty_page() {
        let source = FakeSource::new(200);
        let items = fetch_all_items(&source).await.unwrap();
        assert_eq!(items.len(), 200);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn iteration_cap_bounds_a_bottomless_feed() {
        let source = FakeSource::new(usize::MAX);
        let items = fetch_all_items(&source).await.unwrap();
        assert_eq!(items.len(), MAX_PAGES * PAGE_SIZE);
        assert_eq!(source.calls.load(Ordering::SeqCst), MAX_PAGES);
    }

    #[tokio::test]
    async fn empty_feed_returns_no_items() {
        let source = FakeSource::new(0);
        let items = fetch_all_items(&source).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
