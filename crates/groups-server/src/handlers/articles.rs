use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use groups_shared::{
    api::{UpdateArticleRequest, TOTAL_COUNT_HEADER},
    Article,
};
use serde_json::Value;

use super::{parse_id, to_json};
use crate::error::AppError;
use crate::query::{ListParams, Selection};
use crate::routes::AppState;
use crate::sanitize;
use crate::store::{ArticleField, ArticleFilter, ArticleQuery};
use crate::validation::{required, ValidationErrors};

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!(
        "{} with `id` matching `{}` not found.",
        Article::MODEL_NAME,
        id
    ))
}

fn apply_update(article: &mut Article, req: UpdateArticleRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new(Article::MODEL_NAME);

    if let Some(slug) = req.slug {
        if slug.is_empty() {
            errors.push(required("slug"));
        }
        article.slug = slug;
    }
    if let Some(title) = req.title {
        if title.is_empty() {
            errors.push(required("title"));
        }
        article.title = title;
    }
    if req.body.is_some() {
        article.body = req.body;
    }

    errors.into_result()
}

/// GET /api/v1/articles
pub async fn list_articles(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let params = ListParams::<ArticleField>::parse(
        &raw,
        Article::FILTER_FIELDS,
        &[],
        state.config.default_page_limit,
    )?;

    let query = ArticleQuery {
        filter: ArticleFilter {
            slug: params.filters.get("slug").cloned(),
            title: params.filters.get("title").cloned(),
        },
        sort: params.sort,
        pagination: params.pagination,
    };
    let (articles, total) = state.articles.list_articles(&query).await?;

    let body = articles
        .iter()
        .map(|article| -> Result<Value, AppError> {
            Ok(params.selection.apply(to_json(article)?))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(([(TOTAL_COUNT_HEADER, total.to_string())], Json(body)))
}

/// POST /api/v1/articles
pub async fn create_article(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Article>), AppError> {
    let Json(body) = payload?;
    let req = sanitize::create_article(body)?;

    let article = Article::new(req.slug, req.title, req.body);
    state.articles.insert_article(&article).await?;
    tracing::info!(article_id = %article.id, slug = %article.slug, "Created article");

    Ok((StatusCode::CREATED, Json(article)))
}

/// GET /api/v1/articles/:id
pub async fn get_article(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&raw_id)?;
    let selection = Selection::parse(raw.get("select"))?;

    let article = state
        .articles
        .find_article(id)
        .await?
        .ok_or_else(|| not_found(&raw_id))?;

    Ok(Json(selection.apply(to_json(&article)?)))
}

/// PATCH /api/v1/articles/:id
pub async fn update_article(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&raw_id)?;
    let Json(body) = payload?;
    let req = sanitize::update_article(body)?;

    let mut article = state
        .articles
        .find_article(id)
        .await?
        .ok_or_else(|| not_found(&raw_id))?;
    apply_update(&mut article, req)?;
    article.updated_at = Utc::now();

    if !state.articles.update_article(&article).await? {
        return Err(not_found(&raw_id));
    }
    tracing::info!(article_id = %id, "Updated article");

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/articles/:id
pub async fn delete_article(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&raw_id)?;

    if !state.articles.delete_article(id).await? {
        return Err(not_found(&raw_id));
    }
    tracing::info!(article_id = %id, "Deleted article");

    Ok(StatusCode::NO_CONTENT)
}
