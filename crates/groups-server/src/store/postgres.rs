use async_trait::async_trait;
use groups_shared::{Article, Group};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::QueryAs;
use uuid::Uuid;

use super::{
    ArticleFilter, ArticleQuery, ArticleStore, GroupFilter, GroupQuery, GroupStore, Pagination,
    SortField, SortKey, StoreError, StoreResult,
};
use crate::DbPool;

const GROUP_COLUMNS: &str = "id, name, parent, children, ancestors, created_at, updated_at";
const ARTICLE_COLUMNS: &str = "id, slug, title, body, created_at, updated_at";

/// Postgres backend. `children` and `ancestors` are `uuid[]` columns.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn order_clause<F: SortField>(keys: &[SortKey<F>]) -> String {
    keys.iter()
        .map(|key| {
            if key.descending {
                format!("{} DESC NULLS LAST", key.field.column())
            } else {
                format!("{} ASC NULLS FIRST", key.field.column())
            }
        })
        .chain(std::iter::once("id ASC".to_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn page_clause(pagination: Pagination) -> String {
    match pagination.limit {
        Some(limit) => format!("LIMIT {} OFFSET {}", limit, pagination.skip),
        None => format!("OFFSET {}", pagination.skip),
    }
}

fn group_conditions(filter: &GroupFilter) -> Vec<String> {
    let mut conditions = Vec::new();
    let mut param_idx = 1;

    if filter.name.is_some() {
        conditions.push(format!("name = ${}", param_idx));
        param_idx += 1;
    }
    match filter.parent {
        Some(None) => conditions.push("parent IS NULL".to_string()),
        Some(Some(_)) => {
            conditions.push(format!("parent = ${}", param_idx));
            param_idx += 1;
        }
        None => {}
    }
    if filter.ancestor.is_some() {
        conditions.push(format!("${} = ANY(ancestors)", param_idx));
    }

    conditions
}

// Binds in the same order `group_conditions` numbers the parameters.
fn bind_group_filter<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    filter: &'q GroupFilter,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    if let Some(ref name) = filter.name {
        query = query.bind(name);
    }
    if let Some(Some(parent)) = filter.parent {
        query = query.bind(parent);
    }
    if let Some(ancestor) = filter.ancestor {
        query = query.bind(ancestor);
    }
    query
}

fn article_conditions(filter: &ArticleFilter) -> Vec<String> {
    let mut conditions = Vec::new();
    let mut param_idx = 1;

    if filter.slug.is_some() {
        conditions.push(format!("slug = ${}", param_idx));
        param_idx += 1;
    }
    if filter.title.is_some() {
        conditions.push(format!("title = ${}", param_idx));
    }

    conditions
}

fn bind_article_filter<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    filter: &'q ArticleFilter,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    if let Some(ref slug) = filter.slug {
        query = query.bind(slug);
    }
    if let Some(ref title) = filter.title {
        query = query.bind(title);
    }
    query
}

fn slug_conflict(err: sqlx::Error, slug: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StoreError::Duplicate {
                model: Article::MODEL_NAME,
                field: "slug",
                value: slug.to_string(),
            };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl GroupStore for PgStore {
    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM groups WHERE id = $1",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn find_groups(&self, ids: &[Uuid]) -> StoreResult<Vec<Group>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let groups = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM groups WHERE id = ANY($1)",
            GROUP_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    async fn list_groups(&self, query: &GroupQuery) -> StoreResult<(Vec<Group>, u64)> {
        let where_clause = where_clause(&group_conditions(&query.filter));

        let count_query = format!("SELECT COUNT(*) FROM groups {}", where_clause);
        let (total,) = bind_group_filter(sqlx::query_as::<_, (i64,)>(&count_query), &query.filter)
            .fetch_one(&self.pool)
            .await?;

        let list_query = format!(
            "SELECT {} FROM groups {} ORDER BY {} {}",
            GROUP_COLUMNS,
            where_clause,
            order_clause(&query.sort),
            page_clause(query.pagination)
        );
        let groups = bind_group_filter(sqlx::query_as::<_, Group>(&list_query), &query.filter)
            .fetch_all(&self.pool)
            .await?;

        Ok((groups, total.max(0) as u64))
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO groups (id, name, parent, children, ancestors, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.parent)
        .bind(&group.children)
        .bind(&group.ancestors)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_group(&self, group: &Group) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE groups
            SET name = $2, parent = $3, ancestors = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.parent)
        .bind(&group.ancestors)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_child(&self, parent: Uuid, child: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE groups SET children = array_append(children, $2) WHERE id = $1 AND $2 <> ALL(children)",
        )
        .bind(parent)
        .bind(child)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_child(&self, parent: Uuid, child: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE groups SET children = array_remove(children, $2) WHERE id = $1")
            .bind(parent)
            .bind(child)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn rebase_descendants(&self, id: Uuid, prefix: &[Uuid]) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE groups
            SET ancestors = $2::uuid[] || ancestors[array_position(ancestors, $1):]
            WHERE $1 = ANY(ancestors)
            "#,
        )
        .bind(id)
        .bind(prefix)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_descendants(&self, id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM groups WHERE $1 = ANY(ancestors)")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ArticleStore for PgStore {
    async fn find_article(&self, id: Uuid) -> StoreResult<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(&format!(
            "SELECT {} FROM articles WHERE id = $1",
            ARTICLE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(article)
    }

    async fn list_articles(&self, query: &ArticleQuery) -> StoreResult<(Vec<Article>, u64)> {
        let where_clause = where_clause(&article_conditions(&query.filter));

        let count_query = format!("SELECT COUNT(*) FROM articles {}", where_clause);
        let (total,) =
            bind_article_filter(sqlx::query_as::<_, (i64,)>(&count_query), &query.filter)
                .fetch_one(&self.pool)
                .await?;

        let list_query = format!(
            "SELECT {} FROM articles {} ORDER BY {} {}",
            ARTICLE_COLUMNS,
            where_clause,
            order_clause(&query.sort),
            page_clause(query.pagination)
        );
        let articles = bind_article_filter(sqlx::query_as::<_, Article>(&list_query), &query.filter)
            .fetch_all(&self.pool)
            .await?;

        Ok((articles, total.max(0) as u64))
    }

    async fn insert_article(&self, article: &Article) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO articles (id, slug, title, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(article.id)
        .bind(&article.slug)
        .bind(&article.title)
        .bind(&article.body)
        .bind(article.created_at)
        .bind(article.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| slug_conflict(e, &article.slug))?;

        Ok(())
    }

    async fn update_article(&self, article: &Article) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET slug = $2, title = $3, body = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(article.id)
        .bind(&article.slug)
        .bind(&article.title)
        .bind(&article.body)
        .bind(article.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| slug_conflict(e, &article.slug))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_article(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
