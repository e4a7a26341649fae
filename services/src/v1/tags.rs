//! Handlers for `/v1/tags/*` and `/v1/categories`.

use crate::catalog::CatalogError;
use crate::catalog::inventories::InventoryListItem;
use crate::database::{CategoryRecord, SqlStorage, TagCount};
use crate::state::AppState;
use crate::users::storage::UserStorage;
use axum::{
    Json,
    extract::{Path, State},
};

/// GET /v1/tags
pub async fn list<S, U>(
    State(state): State<AppState<S, U>>,
) -> Result<Json<Vec<TagCount>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().all_tags().await?))
}

/// GET /v1/tags/{name}/inventories
pub async fn inventories<S, U>(
    State(state): State<AppState<S, U>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<InventoryListItem>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().by_tag(&name).await?))
}

/// GET /v1/categories
pub async fn categories<S, U>(
    State(state): State<AppState<S, U>>,
) -> Result<Json<Vec<CategoryRecord>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().categories().await?))
}
