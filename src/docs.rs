use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::transcode::handler::submit_transcode,
        crate::modules::transcode::handler::task_status,
        crate::modules::transcode::handler::file_status,
        crate::modules::transcode::handler::stream_video,
        crate::modules::transcode::handler::download_video,
        crate::modules::transcode::handler::list_videos,
    ),
    components(
        schemas(
            crate::modules::transcode::dto::TranscodeRequest,
            crate::modules::transcode::dto::SubmitResponse,
            crate::modules::transcode::dto::TaskStatusResponse,
            crate::modules::transcode::dto::FileStatusResponse,
            crate::modules::transcode::dto::ListResponse,
            crate::modules::transcode::model::TaskState,
            crate::modules::transcode::model::Resolution,
            crate::modules::transcode::model::OutputFormat,
            crate::modules::transcode::model::TranscodeConfig,
            crate::modules::transcode::model::TaskResult,
            crate::modules::transcode::model::TaskError,
            crate::infrastructure::storage::BlobInfo,
            crate::common::response::ErrorBody,
        )
    ),
    tags(
        (name = "Videos", description = "Video transcode dispatch and delivery")
    )
)]
pub struct ApiDoc;
