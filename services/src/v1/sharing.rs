//! Access grants and comments on an inventory.

use crate::auth::RequireAuth;
use crate::catalog::CatalogError;
use crate::catalog::access::{AccessEntry, GrantAccessRequest};
use crate::catalog::comments::{CommentDto, CommentRequest};
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::UserStorage;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// GET /v1/inventories/{id}/access
pub async fn list_access<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AccessEntry>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().list_access(auth.user_id(), id).await?))
}

/// POST /v1/inventories/{id}/access
pub async fn grant_access<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<GrantAccessRequest>,
) -> Result<impl IntoResponse, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let entry = state
        .catalog()
        .grant_access(auth.user_id(), id, &payload.email_or_username)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// DELETE /v1/inventories/{id}/access/{user_id}
pub async fn revoke_access<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    state
        .catalog()
        .revoke_access(auth.user_id(), id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/inventories/{id}/comments
pub async fn list_comments<S, U>(
    State(state): State<AppState<S, U>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommentDto>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().list_comments(id).await?))
}

/// POST /v1/inventories/{id}/comments
pub async fn add_comment<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> Result<impl IntoResponse, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let comment = state
        .catalog()
        .add_comment(auth.user_id(), id, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
