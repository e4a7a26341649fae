use super::{Catalog, CatalogError, CatalogResult};
use crate::database::SqlStorage;
use crate::users::storage::UserStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct GrantAccessRequest {
    pub email_or_username: String,
}

/// A user holding an explicit grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub granted_at: DateTime<Utc>,
}

impl<S: SqlStorage, U: UserStorage> Catalog<'_, S, U> {
    /// Only the creator sees the grants; everyone else gets an empty list.
    pub async fn list_access(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
    ) -> CatalogResult<Vec<AccessEntry>> {
        let inventory = self.inventory(inventory_id).await?;
        if inventory.creator_id != user_id {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for grant in self.sql.access_list(inventory_id).await? {
            let Some(user) = self.users.get_user(grant.user_id).await? else {
                continue;
            };
            entries.push(AccessEntry {
                user_id: user.id,
                username: user.username,
                email: user.email,
                granted_at: grant.granted_at,
            });
        }
        Ok(entries)
    }

    #[tracing::instrument(skip_all, fields(inventory_id = %inventory_id, user_id = %user_id))]
    pub async fn grant_access(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
        email_or_username: &str,
    ) -> CatalogResult<AccessEntry> {
        let inventory = self.inventory(inventory_id).await?;
        if inventory.creator_id != user_id {
            return Err(CatalogError::forbidden("Only the creator can grant access"));
        }

        let target = self
            .users
            .find_by_email_or_username(email_or_username.trim())
            .await?
            .ok_or_else(|| CatalogError::not_found("User not found"))?;
        if target.id == user_id {
            return Err(CatalogError::validation(
                "You already have access as the creator",
            ));
        }
        if !self.sql.access_grant(inventory_id, target.id).await? {
            return Err(CatalogError::conflict("User already has access"));
        }

        let granted_at = self
            .sql
            .access_list(inventory_id)
            .await?
            .into_iter()
            .find(|grant| grant.user_id == target.id)
            .map_or_else(Utc::now, |grant| grant.granted_at);

        tracing::info!(target_user_id = %target.id, "Access granted");
        Ok(AccessEntry {
            user_id: target.id,
            username: target.username,
            email: target.email,
            granted_at,
        })
    }

    #[tracing::instrument(skip_all, fields(inventory_id = %inventory_id, user_id = %user_id))]
    pub async fn revoke_access(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
        target_user_id: Uuid,
    ) -> CatalogResult<()> {
        let inventory = self.inventory(inventory_id).await?;
        if inventory.creator_id != user_id {
            return Err(CatalogError::forbidden("Only the creator can revoke access"));
        }
        if !self.sql.access_revoke(inventory_id, target_user_id).await? {
            return Err(CatalogError::not_found("Access not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::Fixture;

    #[tokio::test]
    async fn creator_grants_by_email_or_username() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        fx.user("carol").await;
        let inventory = fx.inventory(alice).await;
        let catalog = fx.catalog();

        let entry = catalog.grant_access(alice, inventory, "bob").await.unwrap();
        assert_eq!(entry.user_id, bob);
        catalog
            .grant_access(alice, inventory, " CAROL@example.com ")
            .await
            .unwrap();

        let listed = catalog.list_access(alice, inventory).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(catalog.list_access(bob, inventory).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn grant_errors() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let inventory = fx.inventory(alice).await;
        let catalog = fx.catalog();

        let err = catalog.grant_access(bob, inventory, "alice").await.unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(m) if m == "Only the creator can grant access"));

        let err = catalog.grant_access(alice, inventory, "nobody").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(m) if m == "User not found"));

        let err = catalog.grant_access(alice, inventory, "alice").await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m == "You already have access as the creator"));

        catalog.grant_access(alice, inventory, "bob").await.unwrap();
        let err = catalog.grant_access(alice, inventory, "bob").await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(m) if m == "User already has access"));
    }

    #[tokio::test]
    async fn revoke_removes_write_access() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let inventory = fx.inventory(alice).await;
        let catalog = fx.catalog();
        catalog.grant_access(alice, inventory, "bob").await.unwrap();

        let err = catalog.revoke_access(bob, inventory, bob).await.unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        catalog.revoke_access(alice, inventory, bob).await.unwrap();
        assert!(!catalog.get_inventory(Some(bob), inventory).await.unwrap().has_write_access);

        let err = catalog.revoke_access(alice, inventory, bob).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(m) if m == "Access not found"));
    }
}
