//! Listing descriptors and canonical page identities.
//!
//! A [`PageKey`] renders to the relative request target of one page, e.g.
//! `comments?http_cache=true&discussion_id=42&page_size=50&page=3`. The same
//! string is appended to the API base URL for the request and used as the
//! checkpoint key, so changing hosts never invalidates checkpoints.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pagination metadata the API returns under `meta.<collection>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEnvelope {
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    pub count: u64,
    pub page_count: u32,
    #[serde(default)]
    pub previous_page: Option<u32>,
    #[serde(default)]
    pub next_page: Option<u32>,
}

/// One fetched page: raw items plus the envelope.
///
/// Items stay as JSON so a single malformed record fails on its own instead
/// of taking the whole page with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub meta: PageEnvelope,
}

/// Static description of a paginated child listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Request path, relative to the API base
    pub path: &'static str,
    /// Name of the items array and of the `meta` entry in the response
    pub collection: &'static str,
    /// Query parameter selecting the parent
    pub parent_param: &'static str,
    /// Prepended to the parent external id, e.g. `project-`
    pub parent_prefix: &'static str,
    /// Extra `limit` query parameter some listings expect
    pub limit: Option<u32>,
    pub page_size: u32,
    /// Stop after this many pages even if the API reports more
    pub page_limit: Option<u32>,
}

impl Listing {
    pub fn boards(page_size: u32) -> Self {
        Self {
            path: "boards",
            collection: "boards",
            parent_param: "section",
            parent_prefix: "project-",
            limit: None,
            page_size,
            page_limit: None,
        }
    }

    pub fn discussions(page_size: u32) -> Self {
        Self {
            path: "discussions",
            collection: "discussions",
            parent_param: "board_id",
            parent_prefix: "",
            limit: None,
            page_size,
            page_limit: None,
        }
    }

    pub fn comments(page_size: u32) -> Self {
        Self {
            path: "comments",
            collection: "comments",
            parent_param: "discussion_id",
            parent_prefix: "",
            limit: None,
            page_size,
            page_limit: None,
        }
    }

    pub fn popular_tags(page_size: u32, page_limit: Option<u32>) -> Self {
        Self {
            path: "tags/popular",
            collection: "popular",
            parent_param: "section",
            parent_prefix: "project-",
            limit: Some(page_size),
            page_size,
            page_limit,
        }
    }

    /// Key of `page` of the listing for `parent_external_id`.
    pub fn page_key(&self, parent_external_id: &str, page: u32) -> PageKey {
        PageKey {
            path: self.path,
            collection: self.collection,
            parent_param: self.parent_param,
            parent_value: format!("{}{}", self.parent_prefix, parent_external_id),
            limit: self.limit,
            page_size: self.page_size,
            page,
        }
    }

    /// Prefix shared by the keys of every page of one parent's listing.
    ///
    /// Ends with `&` so that parent `12` never matches parent `123`.
    pub fn parent_key_prefix(&self, parent_external_id: &str) -> String {
        format!(
            "{}?http_cache=true&{}={}{}&",
            self.path, self.parent_param, self.parent_prefix, parent_external_id
        )
    }
}

/// Identity of one page of one parent's listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub path: &'static str,
    pub collection: &'static str,
    pub parent_param: &'static str,
    pub parent_value: String,
    pub limit: Option<u32>,
    pub page_size: u32,
    pub page: u32,
}

impl PageKey {
    /// Relative request target, also used as the checkpoint key.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }

    /// The same listing at another page.
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}?http_cache=true&{}={}",
            self.path, self.parent_param, self.parent_value
        )?;
        if let Some(limit) = self.limit {
            write!(f, "&limit={limit}")?;
        }
        write!(f, "&page_size={}&page={}", self.page_size, self.page)
    }
}
