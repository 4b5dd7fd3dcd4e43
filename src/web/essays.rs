use std::path::PathBuf;

use axum::{
    Json,
    extract::{Multipart, State, rejection::JsonRejection},
    http::StatusCode,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tokio::fs as tokio_fs;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    correction::{self, CorrectionResult, SourceType, documents},
    history::store,
    web::{
        AppState,
        identity::client_identity,
        json_error,
        responses::ApiError,
        uploads::{FileFieldConfig, receive_single_file},
    },
};

const UPLOAD_ROOT: &str = "storage/uploads";

#[derive(Deserialize)]
pub struct CheckEssayRequest {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
pub struct CheckEssayResponse {
    success: bool,
    result: CorrectionResult,
    content: String,
    history_id: Option<Uuid>,
}

pub async fn check_essay(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<CheckEssayRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<CheckEssayResponse>), ApiError> {
    let (jar, owner) = client_identity(jar);
    let content = essay_content(payload)?;

    let response = correct_and_record(&state, owner, content, SourceType::Text).await?;
    Ok((jar, Json(response)))
}

pub async fn upload_file(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<(CookieJar, Json<CheckEssayResponse>), ApiError> {
    let (jar, owner) = client_identity(jar);

    let upload_dir = PathBuf::from(UPLOAD_ROOT).join(Uuid::new_v4().to_string());
    let config = FileFieldConfig {
        field_name: "file",
        allowed_extensions: documents::SUPPORTED_EXTENSIONS,
        prefix: "source_",
    };

    let saved = match receive_single_file(multipart, &upload_dir, config).await {
        Ok(saved) => saved,
        Err(err) => {
            let _ = tokio_fs::remove_dir_all(&upload_dir).await;
            return Err(json_error(StatusCode::BAD_REQUEST, err.message()));
        }
    };

    info!(
        %owner,
        file = %saved.original_name,
        extension = %saved.extension,
        size = saved.file_size,
        "essay file received"
    );

    let extracted = read_upload(saved.stored_path.clone()).await;
    let _ = tokio_fs::remove_dir_all(&upload_dir).await;

    let content = extracted.map_err(|err| {
        error!(?err, file = %saved.original_name, "failed to extract essay text");
        json_error(StatusCode::BAD_REQUEST, "无法读取上传文件的内容。")
    })?;

    if content.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "上传的文件中没有可批改的文字。"));
    }

    let response = correct_and_record(&state, owner, content, SourceType::File).await?;
    Ok((jar, Json(response)))
}

/// Malformed bodies get the same JSON 400 as a missing essay.
fn essay_content(
    payload: Result<Json<CheckEssayRequest>, JsonRejection>,
) -> Result<String, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!(error = %rejection.body_text(), "rejected essay request body");
        json_error(StatusCode::BAD_REQUEST, "请求格式无效，请提交作文内容。")
    })?;

    request
        .content
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "请输入作文内容。"))
}

async fn read_upload(path: PathBuf) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || documents::read_document_text(&path))
        .await
        .map_err(|err| anyhow::anyhow!("text extraction task failed: {err}"))?
}

async fn correct_and_record(
    state: &AppState,
    owner: Uuid,
    content: String,
    source_type: SourceType,
) -> Result<CheckEssayResponse, ApiError> {
    let settings = state.correction_settings();

    let result = correction::check_essay(state.llm_client(), &settings, &content)
        .await
        .map_err(|err| {
            error!(?err, %owner, "essay correction failed");
            json_error(StatusCode::BAD_GATEWAY, "作文批改服务暂时不可用，请稍后再试。")
        })?;

    let history_id =
        match store::insert_entry(state.pool_ref(), owner, &content, &result, source_type).await {
            Ok(entry) => Some(entry.id),
            Err(err) => {
                error!(?err, %owner, "failed to record essay history");
                None
            }
        };

    Ok(CheckEssayResponse {
        success: true,
        result,
        content,
        history_id,
    })
}
