//! Handlers for `/v1/admin/users/*` endpoints.

use crate::admin::{ManagedUser, UserAdmin};
use crate::auth::RequireAuth;
use crate::catalog::{CatalogError, CatalogResult};
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::UserStorage;
use crate::v1::types::SearchQuery;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

pub(crate) async fn admin<'a, S, U>(
    state: &'a AppState<S, U>,
    auth: &RequireAuth,
) -> CatalogResult<UserAdmin<'a, S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    UserAdmin::authorize(&state.sql_storage, &state.user_storage, auth.user_id()).await
}

/// GET /v1/admin/users
pub async fn list<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> Result<Json<Vec<ManagedUser>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(admin(&state, &auth).await?.list_users().await?))
}

/// GET /v1/admin/users/search?q=
pub async fn search<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ManagedUser>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(admin(&state, &auth).await?.search_users(&query.q).await?))
}

/// POST /v1/admin/users/{id}/block
pub async fn block<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    admin(&state, &auth).await?.block_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/admin/users/{id}/unblock
pub async fn unblock<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    admin(&state, &auth).await?.unblock_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/admin/users/{id}
pub async fn delete<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    admin(&state, &auth).await?.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/admin/users/{id}/admin
pub async fn add_admin<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    admin(&state, &auth).await?.add_admin(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/admin/users/{id}/admin
pub async fn remove_admin<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    admin(&state, &auth).await?.remove_admin(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
