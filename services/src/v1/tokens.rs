//! Inventory API tokens and the token-authenticated `/v1/data` endpoint.

use crate::aggregation::InventoryAggregatedData;
use crate::auth::RequireAuth;
use crate::catalog::CatalogError;
use crate::catalog::tokens::{ApiTokenDto, TokenRequest};
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::UserStorage;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
};
use axum_extra::{
    TypedHeader,
    headers::{self, Header},
    typed_header::TypedHeaderRejection,
};
use uuid::Uuid;

static X_API_TOKEN: HeaderName = HeaderName::from_static("x-api-token");

/// The `X-API-Token` request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiToken(pub String);

impl Header for ApiToken {
    fn name() -> &'static HeaderName {
        &X_API_TOKEN
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let token = values
            .next()
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(headers::Error::invalid)?;
        Ok(Self(token.to_owned()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

/// GET /v1/inventories/{id}/tokens
pub async fn list<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(inventory_id): Path<Uuid>,
) -> Result<Json<Vec<ApiTokenDto>>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(
        state
            .catalog()
            .list_tokens(auth.user_id(), inventory_id)
            .await?,
    ))
}

/// POST /v1/inventories/{id}/tokens
pub async fn create<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(inventory_id): Path<Uuid>,
    Json(payload): Json<TokenRequest>,
) -> Result<impl IntoResponse, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let token = state
        .catalog()
        .generate_token(auth.user_id(), inventory_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(token)))
}

/// DELETE /v1/tokens/{id}
pub async fn revoke<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    state.catalog().revoke_token(auth.user_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/data
///
/// A missing, malformed, revoked or expired token answers 401.
#[tracing::instrument(skip_all)]
pub async fn data<S, U>(
    State(state): State<AppState<S, U>>,
    token: Result<TypedHeader<ApiToken>, TypedHeaderRejection>,
) -> Result<Json<InventoryAggregatedData>, CatalogError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let TypedHeader(ApiToken(token)) = token.map_err(|_| CatalogError::InvalidToken)?;
    Ok(Json(state.catalog().aggregated_data(&token).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &[&str]) -> Result<ApiToken, headers::Error> {
        let values: Vec<HeaderValue> = raw.iter().map(|v| HeaderValue::from_str(v).unwrap()).collect();
        ApiToken::decode(&mut values.iter())
    }

    #[test]
    fn decodes_trimmed_token() {
        assert_eq!(decode(&[" abc "]).unwrap(), ApiToken("abc".into()));
    }

    #[test]
    fn rejects_missing_or_blank_token() {
        assert!(decode(&[]).is_err());
        assert!(decode(&["   "]).is_err());
    }
}
