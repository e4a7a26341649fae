//! Handlers for custom ID configuration.

use crate::auth::RequireAuth;
use crate::catalog::CatalogError;
use crate::catalog::custom_ids::{
    CustomIdConfigRequest, CustomIdPreview, ValidateCustomIdRequest, ValidateCustomIdResponse,
    preview_custom_id,
};
use crate::custom_id::CustomIdElement;
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::UserStorage;
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// GET /v1/inventories/{id}/custom-id
pub async fn get<S, U>(
    State(state): State<AppState<S, U>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CustomIdElement>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(state.catalog().custom_id_config(id).await?))
}

/// PUT /v1/inventories/{id}/custom-id
pub async fn save<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(payload): Json<CustomIdConfigRequest>,
) -> Result<Json<Vec<CustomIdElement>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let saved = state
        .catalog()
        .save_custom_id_config(auth.user_id(), id, payload.elements)
        .await?;
    Ok(Json(saved))
}

/// POST /v1/inventories/{id}/custom-id/validate
pub async fn validate<S, U>(
    State(state): State<AppState<S, U>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ValidateCustomIdRequest>,
) -> Result<Json<ValidateCustomIdResponse>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(
        state
            .catalog()
            .validate_custom_id(id, &payload.custom_id)
            .await?,
    ))
}

/// POST /v1/custom-id/preview
pub async fn preview(
    Json(payload): Json<CustomIdConfigRequest>,
) -> Result<Json<CustomIdPreview>, CatalogError> {
    Ok(Json(preview_custom_id(payload.elements)?))
}
