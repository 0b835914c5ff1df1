//! Import pipeline for Talk data.
//!
//! Leaf first: [`rate_limiter`], [`retry`] and [`talk_client`] talk to the
//! API, [`checkpoint_cache`] remembers finished pages, [`page_walker`] drives
//! one parent's listing through a [`kinds::ChildKind`], and [`importer`]
//! runs the walker over every parent. [`project_seed`] and [`export`] move
//! data in and out of the local store.

pub mod checkpoint_cache;
pub mod config;
pub mod export;
pub mod importer;
pub mod kinds;
pub mod page_fetcher;
pub mod page_walker;
pub mod pagination;
pub mod project_seed;
pub mod rate_limiter;
pub mod retry;
pub mod talk_client;
pub mod upsert_sink;
