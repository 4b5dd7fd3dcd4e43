use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    correction::{CorrectionResult, SourceType},
    history::{self, FilterKeyword, HistoryEntry, store},
    web::{
        AppState,
        identity::client_identity,
        json_error,
        responses::{ActionResponse, ApiError, internal_error},
    },
};

const NOT_FOUND_MESSAGE: &str = "历史记录不存在。";

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    filter: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct HistoryItem {
    id: Uuid,
    content: String,
    preview: String,
    result: CorrectionResult,
    source_type: SourceType,
    created_at: String,
}

impl From<HistoryEntry> for HistoryItem {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            id: entry.id,
            preview: history::preview(&entry.content),
            content: entry.content,
            result: entry.result,
            source_type: entry.source_type,
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct HistoryListResponse {
    success: bool,
    history: Vec<HistoryItem>,
    filter: &'static str,
    count: usize,
}

#[derive(Serialize)]
pub(crate) struct HistoryDetailResponse {
    success: bool,
    history: HistoryItem,
}

pub async fn list_history(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<HistoryQuery>,
) -> Result<(CookieJar, Json<HistoryListResponse>), ApiError> {
    let (jar, owner) = client_identity(jar);
    let filter = FilterKeyword::parse(query.filter.as_deref().unwrap_or("all"));

    let entries = store::load_history(state.pool_ref(), owner, filter, &Local::now())
        .await
        .map_err(|err| internal_error(err, "failed to load history entries"))?;

    let history: Vec<HistoryItem> = entries.into_iter().map(HistoryItem::from).collect();

    Ok((
        jar,
        Json(HistoryListResponse {
            success: true,
            count: history.len(),
            history,
            filter: filter.as_str(),
        }),
    ))
}

pub async fn history_detail(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<(CookieJar, Json<HistoryDetailResponse>), ApiError> {
    let (jar, owner) = client_identity(jar);
    let entry = owned_entry(&state, owner, id).await?;

    Ok((
        jar,
        Json(HistoryDetailResponse {
            success: true,
            history: entry.into(),
        }),
    ))
}

pub async fn export_history(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (jar, owner) = client_identity(jar);
    let entry = owned_entry(&state, owner, id).await?;

    Ok((
        jar,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        entry.result.to_plain_text(),
    ))
}

pub async fn delete_history(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<(CookieJar, Json<ActionResponse>), ApiError> {
    let (jar, owner) = client_identity(jar);

    let removed = store::delete_entry(state.pool_ref(), owner, id)
        .await
        .map_err(|err| internal_error(err, "failed to delete history entry"))?;
    if !removed {
        return Err(json_error(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE));
    }

    info!(%owner, %id, "history entry deleted");
    Ok((jar, Json(ActionResponse::done("历史记录已删除。"))))
}

pub async fn clear_history(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ActionResponse>), ApiError> {
    let (jar, owner) = client_identity(jar);

    let removed = store::clear_entries(state.pool_ref(), owner)
        .await
        .map_err(|err| internal_error(err, "failed to clear history"))?;

    info!(%owner, removed, "history cleared");
    Ok((
        jar,
        Json(ActionResponse::done("历史记录已清空。").with_removed(removed)),
    ))
}

async fn owned_entry(state: &AppState, owner: Uuid, id: Uuid) -> Result<HistoryEntry, ApiError> {
    store::fetch_entry(state.pool_ref(), owner, id)
        .await
        .map_err(|err| internal_error(err, "failed to load history entry"))?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE))
}
