//! Handlers for item endpoints under `/v1/inventories/{id}/items` and
//! `/v1/items/*`.

use crate::auth::{OptionalAuth, RequireAuth};
use crate::catalog::CatalogError;
use crate::catalog::items::{ItemDto, ItemInput, ItemUpdate};
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

/// GET /v1/inventories/{id}/items
pub async fn list<S, U>(
    State(state): State<AppState<S, U>>,
    auth: OptionalAuth,
    Path(inventory_id): Path<Uuid>,
) -> Result<Json<Vec<ItemDto>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(
        state
            .catalog()
            .list_items(auth.user_id(), inventory_id)
            .await?,
    ))
}

/// POST /v1/inventories/{id}/items
pub async fn create<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(inventory_id): Path<Uuid>,
    Json(payload): Json<ItemInput>,
) -> Result<impl IntoResponse, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let item = state
        .catalog()
        .create_item(auth.user_id(), inventory_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /v1/items/{id}
pub async fn get<S, U>(
    State(state): State<AppState<S, U>>,
    auth: OptionalAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<ItemDto>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().get_item(auth.user_id(), id).await?))
}

/// PUT /v1/items/{id}
pub async fn update<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<ItemUpdate>,
) -> Result<Json<ItemDto>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let item = state
        .catalog()
        .update_item(auth.user_id(), id, payload)
        .await?;
    Ok(Json(item))
}

/// DELETE /v1/items/{id}
pub async fn delete<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    state.catalog().delete_item(auth.user_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/items/{id}/like
pub async fn like<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    state.catalog().like_item(auth.user_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/items/{id}/like
pub async fn unlike<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    state.catalog().unlike_item(auth.user_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
