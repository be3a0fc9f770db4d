use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use groups_shared::{api::TOTAL_COUNT_HEADER, Group};
use serde_json::Value;
use uuid::Uuid;

use super::{parse_id, to_json};
use crate::error::AppError;
use crate::query::{filter_id, ListParams, Populate, Selection, ViewParams};
use crate::routes::AppState;
use crate::sanitize;
use crate::store::{GroupField, GroupFilter, GroupQuery};

fn group_filter(filters: &BTreeMap<String, String>) -> Result<GroupFilter, AppError> {
    let parent = filters
        .get("parent")
        .map(|raw| match raw.as_str() {
            "null" => Ok(None),
            raw => filter_id("parent", raw).map(Some),
        })
        .transpose()?;
    let ancestor = filters
        .get("ancestor")
        .map(|raw| filter_id("ancestor", raw))
        .transpose()?;

    Ok(GroupFilter {
        name: filters.get("name").cloned(),
        parent,
        ancestor,
    })
}

/// Serializes groups, expanding populated references and applying the selection.
async fn render(
    state: &AppState,
    groups: Vec<Group>,
    selection: &Selection,
    populate: &Populate,
) -> Result<Vec<Value>, AppError> {
    let mut found = HashMap::new();
    if !populate.is_empty() {
        let ids = populate.referenced_ids(&groups);
        for group in state.groups.find_many(&ids).await? {
            found.insert(group.id, to_json(&group)?);
        }
    }

    groups
        .iter()
        .map(|group| -> Result<Value, AppError> {
            Ok(selection.apply(populate.apply(to_json(group)?, &found)))
        })
        .collect()
}

/// GET /api/v1/groups
pub async fn list_groups(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let params = ListParams::<GroupField>::parse(
        &raw,
        Group::FILTER_FIELDS,
        Group::REFERENCE_FIELDS,
        state.config.default_page_limit,
    )?;

    let query = GroupQuery {
        filter: group_filter(&params.filters)?,
        sort: params.sort,
        pagination: params.pagination,
    };
    let (groups, total) = state.groups.list(&query).await?;
    let body = render(&state, groups, &params.selection, &params.populate).await?;

    Ok(([(TOTAL_COUNT_HEADER, total.to_string())], Json(body)))
}

/// POST /api/v1/groups
pub async fn create_group(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Group>), AppError> {
    let Json(body) = payload?;
    let req = sanitize::create_group(body)?;

    let group = state.groups.create(req).await?;

    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /api/v1/groups/:id
pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let id: Uuid = parse_id(&id)?;
    let params = ViewParams::parse(&raw, Group::REFERENCE_FIELDS)?;

    let group = state.groups.get(id).await?;
    let mut rendered = render(&state, vec![group], &params.selection, &params.populate).await?;

    Ok(Json(rendered.pop().unwrap_or(Value::Null)))
}

/// PUT /api/v1/groups/:id
pub async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let Json(body) = payload?;
    let req = sanitize::update_group(body)?;

    state.groups.update(id, req).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/groups/:id
pub async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;

    state.groups.remove(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
