//! Scripted implementation of PageFetcher for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::PageFetcher;
use crate::services::{
    pagination::{Page, PageKey},
    talk_client::{TalkClientError, parse_page},
};

/// Serves canned listing bodies keyed by request target.
///
/// Unknown keys answer with HTTP 404. Failures queued with
/// [`MockPageFetcher::fail_next`] are returned before the canned body.
#[derive(Clone, Default)]
pub struct MockPageFetcher {
    pages: Arc<Mutex<HashMap<String, Value>>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<TalkClientError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `key`, replacing any previous body.
    pub fn insert_page(&self, key: &PageKey, body: Value) {
        let mut pages = self.pages.lock().unwrap();
        pages.insert(key.cache_key(), body);
    }

    /// Fail the next request for `key` with `error`. Calls queue up.
    pub fn fail_next(&self, key: &PageKey, error: TalkClientError) {
        let mut failures = self.failures.lock().unwrap();
        failures.entry(key.cache_key()).or_default().push_back(error);
    }

    /// Request targets in the order they were fetched, failures included.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch_page(&self, key: &PageKey) -> Result<Page, TalkClientError> {
        let cache_key = key.cache_key();
        self.calls.lock().unwrap().push(cache_key.clone());

        let failure = {
            let mut failures = self.failures.lock().unwrap();
            failures.get_mut(&cache_key).and_then(VecDeque::pop_front)
        };
        if let Some(error) = failure {
            return Err(error);
        }

        let body = {
            let pages = self.pages.lock().unwrap();
            pages.get(&cache_key).cloned()
        };
        match body {
            Some(body) => parse_page(key.collection, body),
            None => Err(TalkClientError::Http {
                status: 404,
                body: format!("no scripted page for {cache_key}"),
            }),
        }
    }
}

/// Build a listing response body the way the API shapes it.
pub fn listing_body(
    collection: &str,
    items: Vec<Value>,
    page: u32,
    page_size: u32,
    count: u64,
    page_count: u32,
    next_page: Option<u32>,
) -> Value {
    let previous_page = if page > 1 { Some(page - 1) } else { None };
    let envelope = json!({
        "page": page,
        "page_size": page_size,
        "count": count,
        "page_count": page_count,
        "previous_page": previous_page,
        "next_page": next_page,
    });
    let mut meta = serde_json::Map::new();
    meta.insert(collection.to_string(), envelope);

    let mut body = serde_json::Map::new();
    body.insert(collection.to_string(), Value::Array(items));
    body.insert("meta".to_string(), Value::Object(meta));
    Value::Object(body)
}
