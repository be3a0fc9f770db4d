use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use groups_shared::{Article, Group};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ArticleField, ArticleQuery, ArticleStore, GroupField, GroupQuery, GroupStore, Pagination,
    SortKey, StoreError, StoreResult,
};

/// Process-local backend used when no database is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<Uuid, Group>>,
    articles: RwLock<HashMap<Uuid, Article>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare_groups(a: &Group, b: &Group, keys: &[SortKey<GroupField>]) -> Ordering {
    keys.iter()
        .map(|key| {
            let ord = match key.field {
                GroupField::Id => a.id.cmp(&b.id),
                GroupField::Name => a.name.cmp(&b.name),
                GroupField::Parent => a.parent.cmp(&b.parent),
                GroupField::CreatedAt => a.created_at.cmp(&b.created_at),
                GroupField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            if key.descending {
                ord.reverse()
            } else {
                ord
            }
        })
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.id.cmp(&b.id))
}

fn compare_articles(a: &Article, b: &Article, keys: &[SortKey<ArticleField>]) -> Ordering {
    keys.iter()
        .map(|key| {
            let ord = match key.field {
                ArticleField::Id => a.id.cmp(&b.id),
                ArticleField::Slug => a.slug.cmp(&b.slug),
                ArticleField::Title => a.title.cmp(&b.title),
                ArticleField::CreatedAt => a.created_at.cmp(&b.created_at),
                ArticleField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            if key.descending {
                ord.reverse()
            } else {
                ord
            }
        })
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.id.cmp(&b.id))
}

fn paginate<T>(items: Vec<T>, pagination: Pagination) -> Vec<T> {
    let skipped = items.into_iter().skip(pagination.skip as usize);
    match pagination.limit {
        Some(limit) => skipped.take(limit as usize).collect(),
        None => skipped.collect(),
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>> {
        Ok(self.groups.read().await.get(&id).cloned())
    }

    async fn find_groups(&self, ids: &[Uuid]) -> StoreResult<Vec<Group>> {
        let groups = self.groups.read().await;
        Ok(ids.iter().filter_map(|id| groups.get(id).cloned()).collect())
    }

    async fn list_groups(&self, query: &GroupQuery) -> StoreResult<(Vec<Group>, u64)> {
        let groups = self.groups.read().await;
        let mut matches: Vec<Group> = groups
            .values()
            .filter(|group| query.filter.matches(group))
            .cloned()
            .collect();
        matches.sort_by(|a, b| compare_groups(a, b, &query.sort));

        let total = matches.len() as u64;
        Ok((paginate(matches, query.pagination), total))
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<()> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Err(StoreError::Duplicate {
                model: Group::MODEL_NAME,
                field: "id",
                value: group.id.to_string(),
            });
        }
        groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn update_group(&self, group: &Group) -> StoreResult<bool> {
        let mut groups = self.groups.write().await;
        let Some(stored) = groups.get_mut(&group.id) else {
            return Ok(false);
        };
        stored.name = group.name.clone();
        stored.parent = group.parent;
        stored.ancestors = group.ancestors.clone();
        stored.updated_at = group.updated_at;
        Ok(true)
    }

    async fn add_child(&self, parent: Uuid, child: Uuid) -> StoreResult<()> {
        if let Some(group) = self.groups.write().await.get_mut(&parent) {
            if !group.children.contains(&child) {
                group.children.push(child);
            }
        }
        Ok(())
    }

    async fn remove_child(&self, parent: Uuid, child: Uuid) -> StoreResult<()> {
        if let Some(group) = self.groups.write().await.get_mut(&parent) {
            group.children.retain(|id| *id != child);
        }
        Ok(())
    }

    async fn rebase_descendants(&self, id: Uuid, prefix: &[Uuid]) -> StoreResult<u64> {
        let mut groups = self.groups.write().await;
        let mut rewritten = 0;
        for group in groups.values_mut() {
            if let Some(position) = group.ancestors.iter().position(|ancestor| *ancestor == id) {
                let mut ancestors = prefix.to_vec();
                ancestors.extend_from_slice(&group.ancestors[position..]);
                group.ancestors = ancestors;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    async fn delete_descendants(&self, id: Uuid) -> StoreResult<u64> {
        let mut groups = self.groups.write().await;
        let before = groups.len();
        groups.retain(|_, group| !group.ancestors.contains(&id));
        Ok((before - groups.len()) as u64)
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.groups.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn find_article(&self, id: Uuid) -> StoreResult<Option<Article>> {
        Ok(self.articles.read().await.get(&id).cloned())
    }

    async fn list_articles(&self, query: &ArticleQuery) -> StoreResult<(Vec<Article>, u64)> {
        let articles = self.articles.read().await;
        let mut matches: Vec<Article> = articles
            .values()
            .filter(|article| query.filter.matches(article))
            .cloned()
            .collect();
        matches.sort_by(|a, b| compare_articles(a, b, &query.sort));

        let total = matches.len() as u64;
        Ok((paginate(matches, query.pagination), total))
    }

    async fn insert_article(&self, article: &Article) -> StoreResult<()> {
        let mut articles = self.articles.write().await;
        if articles.values().any(|other| other.slug == article.slug) {
            return Err(StoreError::Duplicate {
                model: Article::MODEL_NAME,
                field: "slug",
                value: article.slug.clone(),
            });
        }
        articles.insert(article.id, article.clone());
        Ok(())
    }

    async fn update_article(&self, article: &Article) -> StoreResult<bool> {
        let mut articles = self.articles.write().await;
        if articles
            .values()
            .any(|other| other.id != article.id && other.slug == article.slug)
        {
            return Err(StoreError::Duplicate {
                model: Article::MODEL_NAME,
                field: "slug",
                value: article.slug.clone(),
            });
        }
        let Some(stored) = articles.get_mut(&article.id) else {
            return Ok(false);
        };
        stored.slug = article.slug.clone();
        stored.title = article.title.clone();
        stored.body = article.body.clone();
        stored.updated_at = article.updated_at;
        Ok(true)
    }

    async fn delete_article(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.articles.write().await.remove(&id).is_some())
    }
}
