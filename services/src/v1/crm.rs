//! Handlers for `/v1/crm/*` and the admin CRM endpoints.

use crate::auth::RequireAuth;
use crate::crm::{CrmClient, CrmStatus, CrmSyncError, CrmSyncInput, CrmSyncResult, sync_user};
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::{StoredUser, UserStorage};
use crate::v1::admin::admin;
use crate::v1::types::V1ErrorResponse;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

type ApiError = (StatusCode, Json<V1ErrorResponse>);

fn not_configured() -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(V1ErrorResponse::service_unavailable(
            "Salesforce integration is not configured",
        )),
    )
}

fn crm_client<S, U>(state: &AppState<S, U>) -> Result<Arc<dyn CrmClient>, ApiError> {
    state.integrations.crm.clone().ok_or_else(not_configured)
}

async fn load_user<U: UserStorage>(users: &U, id: Uuid) -> Result<StoredUser, ApiError> {
    match users.get_user(id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(V1ErrorResponse::not_found("User not found")),
        )),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load user");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(V1ErrorResponse::internal_error("Internal server error")),
            ))
        }
    }
}

fn sync_response(result: Result<CrmSyncResult, CrmSyncError>) -> Response {
    match result {
        Ok(result) if result.success => (StatusCode::CREATED, Json(result)).into_response(),
        Ok(result) => (StatusCode::BAD_GATEWAY, Json(result)).into_response(),
        Err(CrmSyncError::AlreadySynced) => (
            StatusCode::BAD_REQUEST,
            Json(V1ErrorResponse::bad_request(
                CrmSyncError::AlreadySynced.to_string(),
            )),
        )
            .into_response(),
        Err(CrmSyncError::Storage(e)) => {
            tracing::error!(error = %e, "Failed to store CRM ids");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(V1ErrorResponse::internal_error("Internal server error")),
            )
                .into_response()
        }
    }
}

/// POST /v1/crm/accounts
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn sync_self<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Json(payload): Json<CrmSyncInput>,
) -> Result<Response, ApiError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let crm = crm_client(&state)?;
    let user = load_user(&state.user_storage, auth.user_id()).await?;
    let result = sync_user(crm.as_ref(), &state.user_storage, &user, &payload).await;
    Ok(sync_response(result))
}

/// GET /v1/crm/status
pub async fn status_self<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> Result<Json<CrmStatus>, ApiError>
where
    S: SqlStorage,
    U: UserStorage,
{
    crm_client(&state)?;
    let user = load_user(&state.user_storage, auth.user_id()).await?;
    Ok(Json(CrmStatus::from(&user)))
}

/// GET /v1/admin/users/{id}/crm
pub async fn admin_status<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<CrmStatus>, Response>
where
    S: SqlStorage,
    U: UserStorage,
{
    let admin = admin(&state, &auth).await.map_err(IntoResponse::into_response)?;
    crm_client(&state).map_err(IntoResponse::into_response)?;
    let user = admin.get_user(id).await.map_err(IntoResponse::into_response)?;
    Ok(Json(CrmStatus::from(&user)))
}

/// POST /v1/admin/users/{id}/crm
#[tracing::instrument(skip_all, fields(target_user_id = %id))]
pub async fn admin_sync<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<CrmSyncInput>,
) -> Result<Response, Response>
where
    S: SqlStorage,
    U: UserStorage,
{
    let admin = admin(&state, &auth).await.map_err(IntoResponse::into_response)?;
    let crm = crm_client(&state).map_err(IntoResponse::into_response)?;
    let user = admin.get_user(id).await.map_err(IntoResponse::into_response)?;
    let result = sync_user(crm.as_ref(), &state.user_storage, &user, &payload).await;
    Ok(sync_response(result))
}
