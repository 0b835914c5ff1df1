//! The record kinds the importer walks, and how each is stored.
//!
//! Each kind names its listing, knows how to identify and persist its
//! records, and how to count (and, for kinds that can detect upstream
//! deletion, purge) them by parent.

use async_trait::async_trait;
use db::models::{
    board::{Board, CreateBoard},
    comment::{Comment, CreateComment},
    discussion::{CreateDiscussion, Discussion},
    popular_tag::{CreatePopularTag, PopularTag},
    project::Project,
};
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;

use super::{
    pagination::Listing,
    upsert_sink::{strip_newlines, strip_newlines_opt},
};

/// An already imported entity whose children are being listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub local_id: i64,
    pub external_id: String,
    /// Human readable label for logs
    pub name: String,
    /// Child count the upstream reported when the parent was imported
    pub expected_children: i64,
}

impl From<&Project> for ParentRef {
    fn from(project: &Project) -> Self {
        Self {
            local_id: project.id,
            external_id: project.external_id.clone(),
            name: project.display_name.clone(),
            expected_children: 0,
        }
    }
}

impl From<&Board> for ParentRef {
    fn from(board: &Board) -> Self {
        Self {
            local_id: board.id,
            external_id: board.external_id.clone(),
            name: board.title.clone(),
            expected_children: board.discussions_count,
        }
    }
}

impl From<&Discussion> for ParentRef {
    fn from(discussion: &Discussion) -> Self {
        Self {
            local_id: discussion.id,
            external_id: discussion.external_id.clone(),
            name: discussion.title.clone(),
            expected_children: discussion.comments_count,
        }
    }
}

/// What a parent purge removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Purge {
    pub rows: u64,
    /// Checkpoint key prefixes of descendant listings that were emptied
    /// along with the parent.
    pub stale_prefixes: Vec<String>,
}

#[async_trait]
pub trait ChildKind: Send + Sync {
    /// Record as decoded from a listing item.
    type Item: DeserializeOwned + Send + Sync;

    /// Singular name used in logs.
    const NAME: &'static str;

    /// Whether an empty listing for a known non-empty parent removes the
    /// parent and its children.
    const PURGES_PARENT: bool = false;

    fn listing(&self) -> &Listing;

    fn external_id<'a>(&self, item: &'a Self::Item) -> &'a str;

    async fn exists(&self, pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error>;

    async fn insert(&self, pool: &SqlitePool, item: &Self::Item) -> Result<(), sqlx::Error>;

    async fn count_for_parent(
        &self,
        pool: &SqlitePool,
        parent: &ParentRef,
    ) -> Result<i64, sqlx::Error>;

    /// Delete `parent` and everything imported under it.
    async fn purge_parent(&self, _pool: &SqlitePool, _parent: &ParentRef) -> Result<Purge, sqlx::Error> {
        Ok(Purge::default())
    }
}

/// Boards of a project.
pub struct BoardKind {
    listing: Listing,
}

impl BoardKind {
    pub fn new(page_size: u32) -> Self {
        Self {
            listing: Listing::boards(page_size),
        }
    }
}

#[async_trait]
impl ChildKind for BoardKind {
    type Item = CreateBoard;
    const NAME: &'static str = "board";

    fn listing(&self) -> &Listing {
        &self.listing
    }

    fn external_id<'a>(&self, item: &'a CreateBoard) -> &'a str {
        &item.external_id
    }

    async fn exists(&self, pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        Board::exists(pool, external_id).await
    }

    async fn insert(&self, pool: &SqlitePool, item: &CreateBoard) -> Result<(), sqlx::Error> {
        let data = CreateBoard {
            title: strip_newlines(&item.title),
            description: strip_newlines_opt(&item.description),
            ..item.clone()
        };
        Board::create(pool, &data).await.map(|_| ())
    }

    async fn count_for_parent(
        &self,
        pool: &SqlitePool,
        parent: &ParentRef,
    ) -> Result<i64, sqlx::Error> {
        Board::count_by_project(pool, &parent.external_id).await
    }
}

/// Discussions of a board. An emptied board is removed together with its
/// discussions, their comments and the comment listings' checkpoints.
pub struct DiscussionKind {
    listing: Listing,
    comments: Listing,
}

impl DiscussionKind {
    pub fn new(page_size: u32, comment_page_size: u32) -> Self {
        Self {
            listing: Listing::discussions(page_size),
            comments: Listing::comments(comment_page_size),
        }
    }
}

#[async_trait]
impl ChildKind for DiscussionKind {
    type Item = CreateDiscussion;
    const NAME: &'static str = "discussion";
    const PURGES_PARENT: bool = true;

    fn listing(&self) -> &Listing {
        &self.listing
    }

    fn external_id<'a>(&self, item: &'a CreateDiscussion) -> &'a str {
        &item.external_id
    }

    async fn exists(&self, pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        Discussion::exists(pool, external_id).await
    }

    async fn insert(&self, pool: &SqlitePool, item: &CreateDiscussion) -> Result<(), sqlx::Error> {
        let data = CreateDiscussion {
            title: strip_newlines(&item.title),
            board_description: strip_newlines_opt(&item.board_description),
            ..item.clone()
        };
        Discussion::create(pool, &data).await.map(|_| ())
    }

    async fn count_for_parent(
        &self,
        pool: &SqlitePool,
        parent: &ParentRef,
    ) -> Result<i64, sqlx::Error> {
        Discussion::count_by_board(pool, &parent.external_id).await
    }

    async fn purge_parent(&self, pool: &SqlitePool, parent: &ParentRef) -> Result<Purge, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let discussions = Discussion::external_ids_by_board(&mut *tx, &parent.external_id).await?;
        let mut rows = Comment::delete_by_board(&mut *tx, &parent.external_id).await?;
        rows += Discussion::delete_by_board(&mut *tx, &parent.external_id).await?;
        rows += Board::delete(&mut *tx, &parent.external_id).await?;
        tx.commit().await?;

        Ok(Purge {
            rows,
            stale_prefixes: discussions
                .iter()
                .map(|id| self.comments.parent_key_prefix(id))
                .collect(),
        })
    }
}

/// Comments of a discussion. An emptied discussion is removed.
pub struct CommentKind {
    listing: Listing,
}

impl CommentKind {
    pub fn new(page_size: u32) -> Self {
        Self {
            listing: Listing::comments(page_size),
        }
    }
}

#[async_trait]
impl ChildKind for CommentKind {
    type Item = CreateComment;
    const NAME: &'static str = "comment";
    const PURGES_PARENT: bool = true;

    fn listing(&self) -> &Listing {
        &self.listing
    }

    fn external_id<'a>(&self, item: &'a CreateComment) -> &'a str {
        &item.external_id
    }

    async fn exists(&self, pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        Comment::exists(pool, external_id).await
    }

    async fn insert(&self, pool: &SqlitePool, item: &CreateComment) -> Result<(), sqlx::Error> {
        let data = CreateComment {
            body: strip_newlines_opt(&item.body),
            board_description: strip_newlines_opt(&item.board_description),
            ..item.clone()
        };
        Comment::create(pool, &data).await.map(|_| ())
    }

    async fn count_for_parent(
        &self,
        pool: &SqlitePool,
        parent: &ParentRef,
    ) -> Result<i64, sqlx::Error> {
        Comment::count_by_discussion(pool, &parent.external_id).await
    }

    async fn purge_parent(&self, pool: &SqlitePool, parent: &ParentRef) -> Result<Purge, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut rows = Comment::delete_by_discussion(&mut *tx, &parent.external_id).await?;
        rows += Discussion::delete(&mut *tx, &parent.external_id).await?;
        tx.commit().await?;
        Ok(Purge {
            rows,
            stale_prefixes: Vec::new(),
        })
    }
}

/// Popular tags of a project.
pub struct PopularTagKind {
    listing: Listing,
}

impl PopularTagKind {
    pub fn new(page_size: u32, page_limit: Option<u32>) -> Self {
        Self {
            listing: Listing::popular_tags(page_size, page_limit),
        }
    }
}

#[async_trait]
impl ChildKind for PopularTagKind {
    type Item = CreatePopularTag;
    const NAME: &'static str = "popular tag";

    fn listing(&self) -> &Listing {
        &self.listing
    }

    fn external_id<'a>(&self, item: &'a CreatePopularTag) -> &'a str {
        &item.external_id
    }

    async fn exists(&self, pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        PopularTag::exists(pool, external_id).await
    }

    async fn insert(&self, pool: &SqlitePool, item: &CreatePopularTag) -> Result<(), sqlx::Error> {
        PopularTag::create(pool, item).await.map(|_| ())
    }

    async fn count_for_parent(
        &self,
        pool: &SqlitePool,
        parent: &ParentRef,
    ) -> Result<i64, sqlx::Error> {
        PopularTag::count_by_project(pool, &parent.external_id).await
    }
}
