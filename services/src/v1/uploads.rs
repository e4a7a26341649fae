//! Handlers for `/v1/uploads/*` endpoints.

use crate::auth::RequireAuth;
use crate::database::SqlStorage;
use crate::images::{ImageUploadRequest, UPLOAD_URL_TTL};
use crate::state::AppState;
use crate::users::storage::UserStorage;
use crate::v1::types::V1ErrorResponse;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

/// POST /v1/uploads/images
///
/// Returns a presigned PUT URL. The client uploads the file there and keeps
/// `public_url` as the inventory image.
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id(), filename = %payload.filename))]
pub async fn image<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Json(payload): Json<ImageUploadRequest>,
) -> Response
where
    S: SqlStorage,
    U: UserStorage,
{
    if let Err(e) = payload.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(V1ErrorResponse::bad_request(e.to_string())),
        )
            .into_response();
    }

    let key = payload.storage_key(Uuid::new_v4());
    match state
        .integrations
        .images
        .presign_upload(&key, &payload.content_type, UPLOAD_URL_TTL)
        .await
    {
        Ok(upload) => (StatusCode::CREATED, Json(upload)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to presign image upload");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(V1ErrorResponse::internal_error(
                    "Failed to prepare image upload",
                )),
            )
                .into_response()
        }
    }
}
