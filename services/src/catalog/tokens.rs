//! Read-only API tokens scoped to one inventory.

use super::{Catalog, CatalogError, CatalogResult};
use crate::aggregation::{self, InventoryAggregatedData};
use crate::database::{ApiTokenRecord, InventoryRecord, SqlStorage};
use crate::users::storage::UserStorage;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;
const NOT_PERMITTED: &str = "You don't have permission to manage tokens for this inventory";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTokenDto {
    pub id: Uuid,
    pub token: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiTokenRecord> for ApiTokenDto {
    fn from(record: ApiTokenRecord) -> Self {
        Self {
            id: record.id,
            token: record.token,
            name: record.name,
            created_at: record.created_at,
            expires_at: record.expires_at,
            is_active: record.is_active,
            last_used_at: record.last_used_at,
        }
    }
}

/// 32 random bytes, base64url without padding.
fn new_secret() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl<S: SqlStorage, U: UserStorage> Catalog<'_, S, U> {
    /// Creator or grantee of the inventory.
    async fn token_manager(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
    ) -> CatalogResult<InventoryRecord> {
        let inventory = self.inventory(inventory_id).await?;
        if inventory.creator_id == user_id
            || self.sql.access_exists(inventory_id, user_id).await?
        {
            Ok(inventory)
        } else {
            Err(CatalogError::forbidden(NOT_PERMITTED))
        }
    }

    #[tracing::instrument(skip_all, fields(inventory_id = %inventory_id, user_id = %user_id))]
    pub async fn generate_token(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
        request: TokenRequest,
    ) -> CatalogResult<ApiTokenDto> {
        self.token_manager(user_id, inventory_id).await?;

        let now = Utc::now();
        let expires_at = match request.expires_in_days {
            Some(days) if days <= 0 => {
                return Err(CatalogError::validation(
                    "Expiration must be a positive number of days",
                ));
            }
            Some(days) => Some(
                Duration::try_days(days)
                    .and_then(|ttl| now.checked_add_signed(ttl))
                    .ok_or_else(|| CatalogError::validation("Expiration is too far away"))?,
            ),
            None => None,
        };

        let record = ApiTokenRecord {
            id: Uuid::new_v4(),
            inventory_id,
            token: new_secret(),
            name: request
                .name
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty()),
            created_by: user_id,
            created_at: now,
            expires_at,
            is_active: true,
            last_used_at: None,
        };
        self.sql.api_tokens_insert(&record).await?;

        tracing::info!(token_id = %record.id, "API token generated");
        Ok(record.into())
    }

    /// Newest first.
    pub async fn list_tokens(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
    ) -> CatalogResult<Vec<ApiTokenDto>> {
        self.token_manager(user_id, inventory_id).await?;
        let tokens = self.sql.api_tokens_list(inventory_id).await?;
        Ok(tokens.into_iter().map(ApiTokenDto::from).collect())
    }

    #[tracing::instrument(skip_all, fields(token_id = %token_id, user_id = %user_id))]
    pub async fn revoke_token(&self, user_id: Uuid, token_id: Uuid) -> CatalogResult<()> {
        let token = self
            .sql
            .api_tokens_get(token_id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Token not found"))?;
        self.token_manager(user_id, token.inventory_id).await?;
        self.sql.api_tokens_deactivate(token_id).await?;
        Ok(())
    }

    /// Inventory id for an active, unexpired token. Records the use.
    pub async fn resolve_token(&self, token: &str) -> CatalogResult<Uuid> {
        let now = Utc::now();
        let record = self
            .sql
            .api_tokens_find_by_token(token)
            .await?
            .filter(|record| record.is_usable(now))
            .ok_or(CatalogError::InvalidToken)?;
        self.sql.api_tokens_touch(record.id, now).await?;
        Ok(record.inventory_id)
    }

    pub async fn aggregated_data(&self, token: &str) -> CatalogResult<InventoryAggregatedData> {
        let inventory_id = self.resolve_token(token).await?;
        let inventory = self.inventory(inventory_id).await?;
        let items = self.sql.items_list_for_inventory(inventory_id).await?;
        Ok(aggregation::aggregate(&inventory, &items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::Fixture;

    #[test]
    fn secrets_are_unpadded_base64url() {
        let secret = new_secret();
        assert_eq!(secret.len(), 43);
        assert!(!secret.contains(['=', '+', '/']));
        assert_ne!(secret, new_secret());
    }

    #[tokio::test]
    async fn creator_and_grantee_manage_tokens() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let carol = fx.user("carol").await;
        let inventory = fx.inventory(alice).await;
        fx.sql.access_grant(inventory, bob).await.unwrap();
        let catalog = fx.catalog();

        let token = catalog
            .generate_token(
                bob,
                inventory,
                TokenRequest {
                    name: Some(" Reports ".into()),
                    expires_in_days: Some(7),
                },
            )
            .await
            .unwrap();
        assert_eq!(token.name.as_deref(), Some("Reports"));
        assert!(token.expires_at.is_some());

        assert_eq!(catalog.list_tokens(alice, inventory).await.unwrap().len(), 1);
        let err = catalog.list_tokens(carol, inventory).await.unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        let err = catalog
            .generate_token(
                alice,
                inventory,
                TokenRequest {
                    name: None,
                    expires_in_days: Some(0),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn far_future_expiry_is_rejected() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let inventory = fx.inventory(alice).await;

        for days in [200_000_000_000, i64::MAX] {
            let err = fx
                .catalog()
                .generate_token(
                    alice,
                    inventory,
                    TokenRequest {
                        name: None,
                        expires_in_days: Some(days),
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, CatalogError::Validation(m) if m == "Expiration is too far away"));
        }
    }

    #[tokio::test]
    async fn resolve_rejects_expired_tokens() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let inventory = fx.inventory(alice).await;
        let created_at = Utc::now() - Duration::days(10);
        fx.sql
            .api_tokens_insert(&ApiTokenRecord {
                id: Uuid::new_v4(),
                inventory_id: inventory,
                token: "expired-secret".into(),
                name: None,
                created_by: alice,
                created_at,
                expires_at: Some(created_at + Duration::days(1)),
                is_active: true,
                last_used_at: None,
            })
            .await
            .unwrap();

        let catalog = fx.catalog();
        assert!(matches!(
            catalog.resolve_token("expired-secret").await.unwrap_err(),
            CatalogError::InvalidToken
        ));
        assert!(matches!(
            catalog.aggregated_data("expired-secret").await.unwrap_err(),
            CatalogError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn resolve_rejects_revoked_tokens() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let inventory = fx.inventory(alice).await;
        let catalog = fx.catalog();
        let token = catalog
            .generate_token(alice, inventory, TokenRequest::default())
            .await
            .unwrap();

        assert_eq!(catalog.resolve_token(&token.token).await.unwrap(), inventory);
        let listed = catalog.list_tokens(alice, inventory).await.unwrap();
        assert!(listed[0].last_used_at.is_some());

        let data = catalog.aggregated_data(&token.token).await.unwrap();
        assert_eq!(data.inventory_id, inventory);
        assert_eq!(data.total_items, 0);

        catalog.revoke_token(alice, token.id).await.unwrap();
        let err = catalog.resolve_token(&token.token).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidToken));
        assert!(matches!(
            catalog.resolve_token("nope").await.unwrap_err(),
            CatalogError::InvalidToken
        ));
    }
}
