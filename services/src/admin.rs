//! User management for administrators.

use crate::catalog::{CatalogError, CatalogResult};
use crate::database::SqlStorage;
use crate::users::storage::{Role, StoredUser, UserStorage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_blocked: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub inventory_count: i64,
}

impl ManagedUser {
    fn new(user: StoredUser, counts: &HashMap<Uuid, i64>) -> Self {
        Self {
            inventory_count: counts.get(&user.id).copied().unwrap_or(0),
            roles: user.role_names(),
            id: user.id,
            username: user.username,
            email: user.email,
            is_blocked: user.is_blocked,
            created_at: user.created_at,
        }
    }
}

/// Admin operations on behalf of one caller.
pub struct UserAdmin<'a, S, U> {
    sql: &'a S,
    users: &'a U,
}

impl<'a, S: SqlStorage, U: UserStorage> UserAdmin<'a, S, U> {
    /// Fails with `Forbidden` unless the caller currently holds the Admin role.
    pub async fn authorize(sql: &'a S, users: &'a U, caller: Uuid) -> CatalogResult<Self> {
        let is_admin = users
            .get_user(caller)
            .await?
            .is_some_and(|user| user.is_admin());
        if !is_admin {
            return Err(CatalogError::forbidden("Admin role required"));
        }
        Ok(Self { sql, users })
    }

    async fn user(&self, id: Uuid) -> CatalogResult<StoredUser> {
        self.users
            .get_user(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("User not found"))
    }

    async fn managed(&self, users: Vec<StoredUser>) -> CatalogResult<Vec<ManagedUser>> {
        let counts = self.sql.inventory_counts_by_creator().await?;
        Ok(users
            .into_iter()
            .map(|user| ManagedUser::new(user, &counts))
            .collect())
    }

    pub async fn list_users(&self) -> CatalogResult<Vec<ManagedUser>> {
        let users = self.users.list_users().await?;
        self.managed(users).await
    }

    pub async fn search_users(&self, query: &str) -> CatalogResult<Vec<ManagedUser>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let users = self.users.search_users(query, SEARCH_LIMIT).await?;
        self.managed(users).await
    }

    pub async fn get_user(&self, id: Uuid) -> CatalogResult<StoredUser> {
        self.user(id).await
    }

    #[tracing::instrument(skip_all, fields(target_user_id = %id))]
    pub async fn block_user(&self, id: Uuid) -> CatalogResult<()> {
        if self.user(id).await?.is_blocked {
            return Err(CatalogError::validation("User is already blocked"));
        }
        self.users.set_blocked(id, true).await?;
        tracing::info!("User blocked");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(target_user_id = %id))]
    pub async fn unblock_user(&self, id: Uuid) -> CatalogResult<()> {
        if !self.user(id).await?.is_blocked {
            return Err(CatalogError::validation("User is not blocked"));
        }
        self.users.set_blocked(id, false).await?;
        tracing::info!("User unblocked");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(target_user_id = %id))]
    pub async fn delete_user(&self, id: Uuid) -> CatalogResult<()> {
        if !self.users.delete_user(id).await? {
            return Err(CatalogError::not_found("User not found"));
        }
        tracing::info!("User deleted");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(target_user_id = %id))]
    pub async fn add_admin(&self, id: Uuid) -> CatalogResult<()> {
        if self.user(id).await?.is_admin() {
            return Err(CatalogError::validation("User is already an admin"));
        }
        self.users.add_role(id, Role::Admin).await?;
        tracing::info!("Admin role granted");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(target_user_id = %id))]
    pub async fn remove_admin(&self, id: Uuid) -> CatalogResult<()> {
        if !self.user(id).await?.is_admin() {
            return Err(CatalogError::validation("User is not an admin"));
        }
        self.users.remove_role(id, Role::Admin).await?;
        tracing::info!("Admin role removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::Fixture;

    #[tokio::test]
    async fn non_admins_are_forbidden() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let err = UserAdmin::authorize(&fx.sql, &fx.users, alice).await.err().unwrap();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        let err = UserAdmin::authorize(&fx.sql, &fx.users, Uuid::new_v4())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CatalogError::Forbidden(_)));
    }

    #[tokio::test]
    async fn list_includes_inventory_counts() {
        let fx = Fixture::new();
        let root = fx.admin("root").await;
        let alice = fx.user("alice").await;
        fx.inventory(alice).await;
        fx.inventory(alice).await;

        let admin = UserAdmin::authorize(&fx.sql, &fx.users, root).await.unwrap();
        let users = admin.list_users().await.unwrap();
        assert_eq!(users.len(), 2);
        let listed = users.iter().find(|u| u.id == alice).unwrap();
        assert_eq!(listed.inventory_count, 2);
        assert_eq!(listed.roles, vec!["User"]);
    }

    #[tokio::test]
    async fn block_and_role_transitions() {
        let fx = Fixture::new();
        let root = fx.admin("root").await;
        let alice = fx.user("alice").await;
        let admin = UserAdmin::authorize(&fx.sql, &fx.users, root).await.unwrap();

        admin.block_user(alice).await.unwrap();
        let err = admin.block_user(alice).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m == "User is already blocked"));
        admin.unblock_user(alice).await.unwrap();
        let err = admin.unblock_user(alice).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m == "User is not blocked"));

        admin.add_admin(alice).await.unwrap();
        let err = admin.add_admin(alice).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m == "User is already an admin"));
        admin.remove_admin(alice).await.unwrap();
        let err = admin.remove_admin(alice).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m == "User is not an admin"));

        let missing = Uuid::new_v4();
        for err in [
            admin.block_user(missing).await.unwrap_err(),
            admin.add_admin(missing).await.unwrap_err(),
            admin.delete_user(missing).await.unwrap_err(),
        ] {
            assert!(matches!(err, CatalogError::NotFound(m) if m == "User not found"));
        }
    }

    #[tokio::test]
    async fn search_is_capped_and_ignores_blank_queries() {
        let fx = Fixture::new();
        let root = fx.admin("root").await;
        for i in 0..12 {
            fx.user(&format!("tester{i}")).await;
        }
        let admin = UserAdmin::authorize(&fx.sql, &fx.users, root).await.unwrap();

        assert!(admin.search_users("  ").await.unwrap().is_empty());
        assert_eq!(admin.search_users("TESTER").await.unwrap().len(), SEARCH_LIMIT);
    }
}
