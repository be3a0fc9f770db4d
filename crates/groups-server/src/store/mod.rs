//! Persistence seam for groups and articles.
//!
//! Every method is a single-document (or single bulk statement) operation.
//! Nothing here spans documents; multi-step consistency lives in
//! [`crate::groups::GroupService`].

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use groups_shared::{Article, Group};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Error, expected `{field}` to be unique. Value: `{value}`")]
    Duplicate {
        model: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A field a list can be ordered by.
pub trait SortField: Copy + Sized {
    /// Parses the JSON field name (`_id` is accepted for `id`).
    fn parse(name: &str) -> Option<Self>;
    fn column(self) -> &'static str;
    fn id() -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey<F> {
    pub field: F,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// `None` returns every match.
    pub limit: Option<u32>,
    pub skip: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Some(20),
            skip: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery<Filter, Field> {
    pub filter: Filter,
    pub sort: Vec<SortKey<Field>>,
    pub pagination: Pagination,
}

impl<Filter: Default, Field: SortField> Default for ListQuery<Filter, Field> {
    fn default() -> Self {
        Self {
            filter: Filter::default(),
            sort: vec![SortKey {
                field: Field::id(),
                descending: false,
            }],
            pagination: Pagination::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Id,
    Name,
    Parent,
    CreatedAt,
    UpdatedAt,
}

impl SortField for GroupField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" | "_id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "parent" => Some(Self::Parent),
            "createdAt" => Some(Self::CreatedAt),
            "updatedAt" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Parent => "parent",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn id() -> Self {
        Self::Id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    pub name: Option<String>,
    /// `Some(None)` selects roots.
    pub parent: Option<Option<Uuid>>,
    /// Selects every group in the subtree below this id.
    pub ancestor: Option<Uuid>,
}

impl GroupFilter {
    pub fn matches(&self, group: &Group) -> bool {
        self.name.as_ref().map_or(true, |name| &group.name == name)
            && match self.parent {
                None => true,
                Some(None) => group.is_root(),
                Some(parent) => group.parent == parent,
            }
            && self
                .ancestor
                .map_or(true, |ancestor| group.ancestors.contains(&ancestor))
    }
}

pub type GroupQuery = ListQuery<GroupFilter, GroupField>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleField {
    Id,
    Slug,
    Title,
    CreatedAt,
    UpdatedAt,
}

impl SortField for ArticleField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" | "_id" => Some(Self::Id),
            "slug" => Some(Self::Slug),
            "title" => Some(Self::Title),
            "createdAt" => Some(Self::CreatedAt),
            "updatedAt" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Slug => "slug",
            Self::Title => "title",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn id() -> Self {
        Self::Id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub slug: Option<String>,
    pub title: Option<String>,
}

impl ArticleFilter {
    pub fn matches(&self, article: &Article) -> bool {
        self.slug.as_ref().map_or(true, |slug| &article.slug == slug)
            && self.title.as_ref().map_or(true, |title| &article.title == title)
    }
}

pub type ArticleQuery = ListQuery<ArticleFilter, ArticleField>;

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>>;

    /// Groups with any of `ids`, in no particular order. Missing ids are skipped.
    async fn find_groups(&self, ids: &[Uuid]) -> StoreResult<Vec<Group>>;

    /// One page of matches plus the total match count ignoring pagination.
    async fn list_groups(&self, query: &GroupQuery) -> StoreResult<(Vec<Group>, u64)>;

    async fn insert_group(&self, group: &Group) -> StoreResult<()>;

    /// Writes `name`, `parent`, `ancestors` and `updated_at`. Returns `false`
    /// if no such group exists.
    async fn update_group(&self, group: &Group) -> StoreResult<bool>;

    /// Adds `child` to `parent.children` unless it is already there.
    async fn add_child(&self, parent: Uuid, child: Uuid) -> StoreResult<()>;

    async fn remove_child(&self, parent: Uuid, child: Uuid) -> StoreResult<()>;

    /// For every group below `id`, replaces the part of its `ancestors` that
    /// precedes `id` with `prefix`. Returns the number of groups rewritten.
    async fn rebase_descendants(&self, id: Uuid, prefix: &[Uuid]) -> StoreResult<u64>;

    /// Deletes every group whose `ancestors` contain `id`.
    async fn delete_descendants(&self, id: Uuid) -> StoreResult<u64>;

    async fn delete_group(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn find_article(&self, id: Uuid) -> StoreResult<Option<Article>>;

    async fn list_articles(&self, query: &ArticleQuery) -> StoreResult<(Vec<Article>, u64)>;

    /// Fails with [`StoreError::Duplicate`] if the slug is taken.
    async fn insert_article(&self, article: &Article) -> StoreResult<()>;

    /// Writes every mutable field. Fails with [`StoreError::Duplicate`] if the
    /// new slug belongs to another article.
    async fn update_article(&self, article: &Article) -> StoreResult<bool>;

    async fn delete_article(&self, id: Uuid) -> StoreResult<bool>;
}

/// The backends the server runs against.
#[derive(Clone)]
pub struct Stores {
    pub groups: Arc<dyn GroupStore>,
    pub articles: Arc<dyn ArticleStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            groups: store.clone(),
            articles: store,
        }
    }

    pub fn postgres(pool: DbPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            groups: store.clone(),
            articles: store,
        }
    }
}
