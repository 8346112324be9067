use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub mod dto;
pub mod error;
pub mod events;
pub mod executor;
pub mod handler;
pub mod model;
pub mod service;
pub mod store;
pub mod tool;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::list_videos))
        .route("/transcode/{file_id}", post(handler::submit_transcode))
        .route("/tasks/{task_id}", get(handler::task_status))
        .route("/status/{file_id}", get(handler::file_status))
        .route("/stream/{filename}", get(handler::stream_video))
        .route("/download/{filename}", get(handler::download_video))
}
