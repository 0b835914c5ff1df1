//! Page source abstraction used by the page walker.
//!
//! Production code fetches pages over HTTP through [`TalkClient`]; tests
//! script pages and failures with [`MockPageFetcher`].

mod mock;

pub use mock::{MockPageFetcher, listing_body};

use async_trait::async_trait;

use super::{
    pagination::{Page, PageKey},
    talk_client::{TalkClient, TalkClientError},
};

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a single page of a listing.
    async fn fetch_page(&self, key: &PageKey) -> Result<Page, TalkClientError>;
}

#[async_trait]
impl PageFetcher for TalkClient {
    async fn fetch_page(&self, key: &PageKey) -> Result<Page, TalkClientError> {
        self.get_page(key).await
    }
}
