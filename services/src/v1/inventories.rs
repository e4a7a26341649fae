//! Handlers for `/v1/inventories/*` endpoints.

use crate::aggregation::InventoryStats;
use crate::auth::{OptionalAuth, RequireAuth};
use crate::catalog::CatalogError;
use crate::catalog::inventories::{
    InventoryDetail, InventoryInput, InventoryListItem, InventoryUpdate, LATEST_LIMIT,
    POPULAR_LIMIT, PUBLIC_LIMIT,
};
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::UserStorage;
use crate::v1::types::SearchQuery;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// GET /v1/inventories
pub async fn latest<S, U>(
    State(state): State<AppState<S, U>>,
    _auth: OptionalAuth,
) -> Result<Json<Vec<InventoryListItem>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().latest(LATEST_LIMIT).await?))
}

/// POST /v1/inventories
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn create<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Json(payload): Json<InventoryInput>,
) -> Result<impl IntoResponse, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let created = state
        .catalog()
        .create_inventory(auth.user_id(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /v1/inventories/my
pub async fn my<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> Result<Json<Vec<InventoryListItem>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().my_inventories(auth.user_id()).await?))
}

/// GET /v1/inventories/shared
pub async fn shared<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> Result<Json<Vec<InventoryListItem>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().shared_inventories(auth.user_id()).await?))
}

/// GET /v1/inventories/public
pub async fn public<S, U>(
    State(state): State<AppState<S, U>>,
) -> Result<Json<Vec<InventoryListItem>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().public_inventories(PUBLIC_LIMIT).await?))
}

/// GET /v1/inventories/popular
pub async fn popular<S, U>(
    State(state): State<AppState<S, U>>,
) -> Result<Json<Vec<InventoryListItem>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().popular(POPULAR_LIMIT).await?))
}

/// GET /v1/inventories/search?q=
pub async fn search<S, U>(
    State(state): State<AppState<S, U>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<InventoryListItem>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().search(&query.q).await?))
}

/// GET /v1/inventories/{id}
pub async fn get<S, U>(
    State(state): State<AppState<S, U>>,
    auth: OptionalAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<InventoryDetail>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().get_inventory(auth.user_id(), id).await?))
}

/// PUT /v1/inventories/{id}
pub async fn update<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<InventoryUpdate>,
) -> Result<Json<InventoryDetail>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let updated = state
        .catalog()
        .update_inventory(auth.user_id(), id, payload)
        .await?;
    Ok(Json(updated))
}

/// DELETE /v1/inventories/{id}
pub async fn delete<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    state.catalog().delete_inventory(auth.user_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/inventories/{id}/stats
pub async fn stats<S, U>(
    State(state): State<AppState<S, U>>,
    Path(id): Path<Uuid>,
) -> Result<Json<InventoryStats>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().stats(id).await?))
}
