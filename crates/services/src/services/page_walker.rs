//! Resumable pagination over one parent's child listing.
//!
//! For every page the walker first consults the checkpoint cache, which lets
//! a rerun skip straight past pages that were fully processed before. Pages
//! that do need fetching go through the rate limiter and retry policy, their
//! records are upserted one by one, and only then is the page checkpointed.
//! A page that dies halfway is therefore fetched again on the next run, and
//! record-level dedup keeps that from producing duplicates.

use std::collections::HashSet;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    checkpoint_cache::{CheckpointCache, CheckpointError},
    kinds::{ChildKind, ParentRef},
    page_fetcher::PageFetcher,
    rate_limiter::RateLimiter,
    retry::{FetchError, RetryPolicy},
    upsert_sink::{UpsertOutcome, UpsertSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every page was imported or already checkpointed
    Done,
    /// The upstream no longer lists the parent's children; it was removed
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkReport {
    pub outcome: WalkOutcome,
    pub pages_fetched: u32,
    /// Pages passed over because a checkpoint said they were done
    pub pages_skipped: u32,
    pub inserted: u64,
    pub already_present: u64,
    /// Records that could not be stored
    pub failed: u64,
}

impl WalkReport {
    fn new() -> Self {
        Self {
            outcome: WalkOutcome::Done,
            pages_fetched: 0,
            pages_skipped: 0,
            inserted: 0,
            already_present: 0,
            failed: 0,
        }
    }

    fn finish(mut self, outcome: WalkOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

#[derive(Debug, Error)]
pub enum WalkError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct PageWalker<'a, K: ChildKind, F: PageFetcher + ?Sized> {
    pool: &'a SqlitePool,
    kind: &'a K,
    fetcher: &'a F,
    checkpoints: &'a mut CheckpointCache,
    limiter: &'a mut RateLimiter,
    retry: &'a RetryPolicy,
}

impl<'a, K: ChildKind, F: PageFetcher + ?Sized> PageWalker<'a, K, F> {
    pub fn new(
        pool: &'a SqlitePool,
        kind: &'a K,
        fetcher: &'a F,
        checkpoints: &'a mut CheckpointCache,
        limiter: &'a mut RateLimiter,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            pool,
            kind,
            fetcher,
            checkpoints,
            limiter,
            retry,
        }
    }

    /// Import every page of `parent`'s listing that is not checkpointed yet.
    pub async fn walk(&mut self, parent: &ParentRef) -> Result<WalkReport, WalkError> {
        let kind = self.kind;
        let listing = kind.listing();
        let mut report = WalkReport::new();
        let mut visited = HashSet::new();
        let mut page = 1u32;

        loop {
            let key = listing.page_key(&parent.external_id, page);

            if let Some(checkpoint) = self.checkpoints.get(&key).await? {
                let last_page = match listing.page_limit {
                    Some(limit) => checkpoint.page_count.min(limit),
                    None => checkpoint.page_count,
                };
                report.pages_skipped += 1;

                if page >= last_page {
                    debug!(kind = K::NAME, parent = %parent.external_id, page, "Listing already imported");
                    return Ok(report.finish(WalkOutcome::Done));
                }
                if self.checkpoints.get(&key.with_page(last_page)).await?.is_some() {
                    debug!(kind = K::NAME, parent = %parent.external_id, last_page, "Last page already imported");
                    return Ok(report.finish(WalkOutcome::Done));
                }

                let mut resume_at = None;
                for candidate in page + 1..=last_page {
                    if self.checkpoints.get(&key.with_page(candidate)).await?.is_none() {
                        resume_at = Some(candidate);
                        break;
                    }
                    report.pages_skipped += 1;
                }
                match resume_at {
                    Some(next) => {
                        debug!(kind = K::NAME, parent = %parent.external_id, page = next, "Skipping to first unimported page");
                        page = next;
                        continue;
                    }
                    None => return Ok(report.finish(WalkOutcome::Done)),
                }
            }

            self.limiter.wait().await;
            let fetcher = self.fetcher;
            let request_key = &key;
            let fetched = self
                .retry
                .execute(&key.cache_key(), || fetcher.fetch_page(request_key))
                .await?;
            let meta = fetched.meta;
            report.pages_fetched += 1;
            visited.insert(page);

            info!(
                kind = K::NAME,
                parent = %parent.external_id,
                page,
                page_count = meta.page_count,
                count = meta.count,
                "Fetched page {} of {} for {}",
                page,
                meta.page_count,
                parent.name
            );

            let local_count = self.kind.count_for_parent(self.pool, parent).await?;

            if meta.count == 0
                && K::PURGES_PARENT
                && (parent.expected_children > 0 || local_count > 0)
            {
                warn!(
                    kind = K::NAME,
                    parent = %parent.external_id,
                    name = %parent.name,
                    "Parent has no children upstream any more, deleting it locally"
                );
                let purge = self.kind.purge_parent(self.pool, parent).await?;
                let mut invalidated = self
                    .checkpoints
                    .invalidate(&listing.parent_key_prefix(&parent.external_id))
                    .await?;
                for prefix in &purge.stale_prefixes {
                    invalidated += self.checkpoints.invalidate(prefix).await?;
                }
                info!(
                    parent = %parent.external_id,
                    rows_removed = purge.rows,
                    checkpoints_removed = invalidated,
                    "Removed deleted parent"
                );
                return Ok(report.finish(WalkOutcome::Deleted));
            }

            if local_count.max(0) as u64 >= meta.count {
                debug!(
                    kind = K::NAME,
                    parent = %parent.external_id,
                    local_count,
                    count = meta.count,
                    "All records already stored"
                );
                self.checkpoints.put(&key, &meta).await?;
                return Ok(report.finish(WalkOutcome::Done));
            }

            let sink = UpsertSink::new(self.pool, self.kind);
            for item in fetched.items {
                match sink.upsert_value(item).await {
                    Ok(UpsertOutcome::Inserted) => report.inserted += 1,
                    Ok(UpsertOutcome::AlreadyExists) => report.already_present += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            kind = K::NAME,
                            parent = %parent.external_id,
                            page,
                            error = %e,
                            "Failed to import record, continuing"
                        );
                    }
                }
            }
            self.checkpoints.put(&key, &meta).await?;

            let next = match meta.next_page {
                None | Some(0) => return Ok(report.finish(WalkOutcome::Done)),
                Some(next) => next,
            };
            if next <= page || visited.contains(&next) || next > meta.page_count {
                warn!(
                    kind = K::NAME,
                    parent = %parent.external_id,
                    page,
                    next_page = next,
                    page_count = meta.page_count,
                    "Malformed pagination envelope, stopping"
                );
                return Ok(report.finish(WalkOutcome::Done));
            }
            if listing.page_limit.is_some_and(|limit| next > limit) {
                debug!(kind = K::NAME, parent = %parent.external_id, page, "Page limit reached");
                return Ok(report.finish(WalkOutcome::Done));
            }
            page = next;
        }
    }
}
