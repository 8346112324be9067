use crate::common::response::ApiError;
use crate::infrastructure::storage::BlobDownload;
use crate::modules::transcode::dto::{
    FileStatusQuery, FileStatusResponse, ListResponse, SubmitResponse, TaskStatusResponse,
    TranscodeRequest,
};
use crate::modules::transcode::error::{StorageError, SubmitError};
use crate::modules::transcode::model::TranscodeConfig;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/v1/videos/transcode/{file_id}",
    params(
        ("file_id" = String, Path, description = "Source video object name")
    ),
    request_body = TranscodeRequest,
    responses(
        (status = 202, description = "Transcode task accepted", body = SubmitResponse),
        (status = 400, description = "Invalid transcode configuration"),
        (status = 404, description = "Source video not found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn submit_transcode(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    body: Option<Json<TranscodeRequest>>,
) -> impl IntoResponse {
    let Json(req) = body.unwrap_or_default();
    let config = TranscodeConfig {
        resolution: req.resolution,
        format: req.format,
    };

    match state.dispatcher.submit(&file_id, config).await {
        Ok(submission) => {
            (StatusCode::ACCEPTED, Json(SubmitResponse::from(submission))).into_response()
        }
        Err(e) => submit_error(e).into_response(),
    }
}

fn submit_error(e: SubmitError) -> ApiError {
    let status = match &e {
        SubmitError::Config(_) => StatusCode::BAD_REQUEST,
        SubmitError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ApiError(e.to_string(), status)
}

#[utoipa::path(
    get,
    path = "/api/v1/videos/tasks/{task_id}",
    params(
        ("task_id" = Uuid, Path, description = "Task ID returned by submit")
    ),
    responses(
        (status = 200, description = "Task status", body = TaskStatusResponse),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.resolver.task_status(task_id).await {
        Ok(Some(task)) => Json(TaskStatusResponse::from(task)).into_response(),
        Ok(None) => ApiError("Task not found".to_string(), StatusCode::NOT_FOUND).into_response(),
        Err(e) => ApiError(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Legacy status endpoint: infers completion from output existence
/// only, so it cannot distinguish "never started" from "failed". The
/// by-task endpoint is the authoritative interface.
#[utoipa::path(
    get,
    path = "/api/v1/videos/status/{file_id}",
    params(
        ("file_id" = String, Path, description = "Source video object name"),
        ("format" = String, Query, description = "Output format, defaults to mp4")
    ),
    responses(
        (status = 200, description = "Inferred file status", body = FileStatusResponse),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn file_status(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(query): Query<FileStatusQuery>,
) -> impl IntoResponse {
    match state.resolver.file_status(&file_id, query.format).await {
        Ok(status) => Json(FileStatusResponse::from(status)).into_response(),
        Err(e) => ApiError(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/videos/stream/{filename}",
    params(
        ("filename" = String, Path, description = "Output object name")
    ),
    responses(
        (status = 200, description = "Stream Content"),
        (status = 206, description = "Partial Content"),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn stream_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    serve_blob(&state, &filename, &headers, None).await
}

#[utoipa::path(
    get,
    path = "/api/v1/videos/download/{filename}",
    params(
        ("filename" = String, Path, description = "Output object name")
    ),
    responses(
        (status = 200, description = "Download Content"),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn download_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let disposition = format!("attachment; filename={filename}");
    serve_blob(&state, &filename, &headers, Some(disposition)).await
}

#[utoipa::path(
    get,
    path = "/api/v1/videos",
    responses(
        (status = 200, description = "List stored videos", body = ListResponse),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn list_videos(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.list().await {
        Ok(files) => Json(ListResponse {
            count: files.len(),
            files,
        })
        .into_response(),
        Err(e) => ApiError(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Proxy a blob read to the client, passing the Range header through to
/// the gateway so partial requests stay partial end to end.
async fn serve_blob(
    state: &AppState,
    filename: &str,
    headers: &HeaderMap,
    disposition: Option<String>,
) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let download = match state.storage.download(filename, range).await {
        Ok(download) => download,
        Err(StorageError::NotFound(_)) => {
            return ApiError("Video not found".to_string(), StatusCode::NOT_FOUND).into_response();
        }
        Err(e) => {
            tracing::error!(object = filename, error = %e, "Blob read failed");
            return ApiError(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
        }
    };

    let BlobDownload {
        content_type,
        content_length,
        content_range,
        reader,
    } = download;

    let mut builder = Response::builder().header(
        header::CONTENT_TYPE,
        content_type.unwrap_or_else(|| "video/mp4".to_string()),
    );

    if let Some(length) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    if let Some(range) = content_range {
        builder = builder
            .header(header::CONTENT_RANGE, range)
            .status(StatusCode::PARTIAL_CONTENT);
    } else {
        builder = builder
            .header(header::ACCEPT_RANGES, "bytes")
            .status(StatusCode::OK);
    }

    if let Some(disposition) = disposition {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }

    let body = Body::from_stream(ReaderStream::new(reader));
    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
