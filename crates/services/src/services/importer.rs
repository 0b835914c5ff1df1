//! Runs the page walker over every stored parent of a kind.
//!
//! Each stage reads its parents from the local store (projects for boards
//! and popular tags, boards for discussions, discussions for comments) and
//! walks their listings one after another. A parent whose fetch fails is
//! logged and counted, and the stage moves on; store and checkpoint errors
//! stop the run.

use std::{path::Path, time::Duration};

use db::models::{board::Board, discussion::Discussion, project::Project};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info};

use super::{
    checkpoint_cache::{CheckpointCache, CheckpointError},
    config::ImporterConfig,
    kinds::{BoardKind, ChildKind, CommentKind, DiscussionKind, ParentRef, PopularTagKind},
    page_fetcher::PageFetcher,
    page_walker::{PageWalker, WalkError, WalkOutcome, WalkReport},
    project_seed::{SeedError, SeedStats, seed_projects},
    rate_limiter::RateLimiter,
    retry::RetryPolicy,
    talk_client::{TalkClient, TalkClientError},
};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to create API client: {0}")]
    Client(#[from] TalkClientError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Totals for one import stage, or for several merged together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub parents: usize,
    pub parents_done: usize,
    pub parents_deleted: usize,
    /// Parents whose walk was aborted by a fetch failure
    pub parents_failed: usize,
    pub pages_fetched: u64,
    pub pages_skipped: u64,
    pub inserted: u64,
    pub already_present: u64,
    pub failed_records: u64,
}

impl ImportStats {
    fn record(&mut self, report: &WalkReport) {
        match report.outcome {
            WalkOutcome::Done => self.parents_done += 1,
            WalkOutcome::Deleted => self.parents_deleted += 1,
        }
        self.pages_fetched += u64::from(report.pages_fetched);
        self.pages_skipped += u64::from(report.pages_skipped);
        self.inserted += report.inserted;
        self.already_present += report.already_present;
        self.failed_records += report.failed;
    }

    pub fn merge(&mut self, other: &ImportStats) {
        self.parents += other.parents;
        self.parents_done += other.parents_done;
        self.parents_deleted += other.parents_deleted;
        self.parents_failed += other.parents_failed;
        self.pages_fetched += other.pages_fetched;
        self.pages_skipped += other.pages_skipped;
        self.inserted += other.inserted;
        self.already_present += other.already_present;
        self.failed_records += other.failed_records;
    }

    pub fn has_failures(&self) -> bool {
        self.parents_failed > 0
    }
}

/// Summary of a full `run_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub projects: SeedStats,
    pub boards: ImportStats,
    pub discussions: ImportStats,
    pub comments: ImportStats,
    pub popular_tags: ImportStats,
}

impl RunSummary {
    pub fn total(&self) -> ImportStats {
        let mut total = ImportStats::default();
        for stage in [&self.boards, &self.discussions, &self.comments, &self.popular_tags] {
            total.merge(stage);
        }
        total
    }
}

pub struct Importer<F: PageFetcher> {
    pool: SqlitePool,
    fetcher: F,
    checkpoints: CheckpointCache,
    limiter: RateLimiter,
    retry: RetryPolicy,
    config: ImporterConfig,
}

impl Importer<TalkClient> {
    /// Build an importer that talks to the configured API and resumes from
    /// the checkpoints already in `pool`.
    pub async fn from_config(pool: SqlitePool, config: ImporterConfig) -> Result<Self, ImportError> {
        let client = TalkClient::from_config(&config)?;
        let checkpoints = CheckpointCache::load(pool.clone()).await?;
        info!(
            checkpoints = checkpoints.mirrored_len(),
            api = %config.api_base_url,
            "Loaded checkpoints"
        );
        Ok(Self::new(pool, client, checkpoints, config))
    }
}

impl<F: PageFetcher> Importer<F> {
    pub fn new(
        pool: SqlitePool,
        fetcher: F,
        checkpoints: CheckpointCache,
        config: ImporterConfig,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(Duration::from_millis(config.request_interval_ms)),
            retry: RetryPolicy::from(&config.retry),
            pool,
            fetcher,
            checkpoints,
            config,
        }
    }

    /// Replace the retry policy, e.g. to attach an observer.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn checkpoints(&self) -> &CheckpointCache {
        &self.checkpoints
    }

    pub async fn import_projects(&self, dir: &Path) -> Result<SeedStats, ImportError> {
        Ok(seed_projects(&self.pool, dir).await?)
    }

    pub async fn import_boards(&mut self) -> Result<ImportStats, ImportError> {
        let kind = BoardKind::new(self.config.page_sizes.boards);
        let parents = project_parents(&self.pool).await?;
        self.import_children(&kind, parents).await
    }

    pub async fn import_discussions(&mut self) -> Result<ImportStats, ImportError> {
        let kind = DiscussionKind::new(
            self.config.page_sizes.discussions,
            self.config.page_sizes.comments,
        );
        let parents = Board::find_all(&self.pool)
            .await?
            .iter()
            .map(ParentRef::from)
            .collect();
        self.import_children(&kind, parents).await
    }

    pub async fn import_comments(&mut self) -> Result<ImportStats, ImportError> {
        let kind = CommentKind::new(self.config.page_sizes.comments);
        let parents = Discussion::find_all(&self.pool)
            .await?
            .iter()
            .map(ParentRef::from)
            .collect();
        self.import_children(&kind, parents).await
    }

    pub async fn import_popular_tags(&mut self) -> Result<ImportStats, ImportError> {
        let kind = PopularTagKind::new(self.config.page_sizes.tags, self.config.tag_page_limit);
        let parents = project_parents(&self.pool).await?;
        self.import_children(&kind, parents).await
    }

    /// Seed projects, then import boards, discussions, comments and popular
    /// tags in that order.
    pub async fn run_all(&mut self, projects_dir: &Path) -> Result<RunSummary, ImportError> {
        let projects = self.import_projects(projects_dir).await?;
        let boards = self.import_boards().await?;
        let discussions = self.import_discussions().await?;
        let comments = self.import_comments().await?;
        let popular_tags = self.import_popular_tags().await?;

        Ok(RunSummary {
            projects,
            boards,
            discussions,
            comments,
            popular_tags,
        })
    }

    async fn import_children<K: ChildKind>(
        &mut self,
        kind: &K,
        parents: Vec<ParentRef>,
    ) -> Result<ImportStats, ImportError> {
        let total = parents.len();
        let mut stats = ImportStats {
            parents: total,
            ..Default::default()
        };
        info!(kind = K::NAME, total, "Starting import");

        for (index, parent) in parents.iter().enumerate() {
            info!(
                kind = K::NAME,
                index = index + 1,
                total,
                parent = %parent.external_id,
                "Importing {} listing for {} ({} of {})",
                K::NAME,
                parent.name,
                index + 1,
                total
            );

            let mut walker = PageWalker::new(
                &self.pool,
                kind,
                &self.fetcher,
                &mut self.checkpoints,
                &mut self.limiter,
                &self.retry,
            );
            match walker.walk(parent).await {
                Ok(report) => stats.record(&report),
                Err(WalkError::Fetch(e)) => {
                    stats.parents_failed += 1;
                    error!(
                        kind = K::NAME,
                        parent = %parent.external_id,
                        name = %parent.name,
                        error = %e,
                        "Giving up on parent, continuing with the next one"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            kind = K::NAME,
            parents = stats.parents,
            deleted = stats.parents_deleted,
            failed = stats.parents_failed,
            pages_fetched = stats.pages_fetched,
            pages_skipped = stats.pages_skipped,
            inserted = stats.inserted,
            failed_records = stats.failed_records,
            "Finished import"
        );
        Ok(stats)
    }
}

async fn project_parents(pool: &SqlitePool) -> Result<Vec<ParentRef>, sqlx::Error> {
    Ok(Project::find_all(pool)
        .await?
        .iter()
        .map(ParentRef::from)
        .collect())
}
