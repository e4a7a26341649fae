//! Relational storage for the inventory catalog.
//!
//! [`SqlStorage`] is the seam between the catalog services and PostgreSQL.
//! [`PgStorage`] talks to the database through a shared pool; [`MockSqlStorage`]
//! keeps everything in memory for tests.

mod mock;
mod pg;

pub use mock::MockSqlStorage;
pub use pg::PgStorage;
pub(crate) use pg::like_pattern;

use crate::config::Config;
use crate::custom_id::CustomIdElement;
use crate::fields::{FieldSchema, ItemValues};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::future::Future;
use uuid::Uuid;

/// Initialize a PostgreSQL connection pool
pub async fn create_pool(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await?;

    tracing::info!("Database connection pool established");

    Ok(pool)
}

/// Applies the embedded migrations under `services/migrations`.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlStorageError {
    #[error("Database error: {0}")]
    Db(String),

    /// A unique constraint rejected the write. Carries the constraint name.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRecord {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub is_public: bool,
    pub creator_id: Uuid,
    pub category_id: Option<i32>,
    pub fields: FieldSchema,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable inventory columns.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryChanges {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub is_public: bool,
    pub category_id: Option<i32>,
    pub fields: FieldSchema,
}

/// Inventory joined with the data list views show.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryListRow {
    pub inventory: InventoryRecord,
    pub item_count: i64,
    pub tags: Vec<String>,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryQuery {
    /// Newest first.
    Latest { limit: i64 },
    /// Created by the user, newest first.
    Creator(Uuid),
    /// Granted to the user, most recent grant first.
    SharedWith(Uuid),
    /// Public only, newest first.
    Public { limit: i64 },
    /// Most items first.
    Popular { limit: i64 },
    /// Case-insensitive match on title, description or tag names.
    Search(String),
    /// Exact tag name.
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRecord {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub custom_id: String,
    pub values: ItemValues,
    pub created_by: Uuid,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeSummary {
    pub count: i64,
    pub liked_by_user: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrantRecord {
    pub inventory_id: Uuid,
    pub user_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTokenRecord {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub token: String,
    pub name: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiTokenRecord {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires| expires > now)
    }
}

type StorageResult<T> = Result<T, SqlStorageError>;

/// Catalog persistence.
///
/// Methods are grouped by table and prefixed with it. Writes that the caller
/// guards with a version take the expected version and return `None` when no
/// row matched.
pub trait SqlStorage: Clone + Send + Sync + 'static {
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    /// Inserts the inventory and its tags atomically, creating unknown tag names.
    fn inventories_insert(
        &self,
        inventory: &InventoryRecord,
        tags: &[String],
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn inventories_get(
        &self,
        id: Uuid,
    ) -> impl Future<Output = StorageResult<Option<InventoryRecord>>> + Send;

    /// Applies `changes` and replaces the tags atomically. Nothing is written
    /// when the version does not match.
    fn inventories_update(
        &self,
        id: Uuid,
        changes: &InventoryChanges,
        tags: &[String],
        expected_version: i32,
    ) -> impl Future<Output = StorageResult<Option<InventoryRecord>>> + Send;

    /// Deletes the inventory and everything that belongs to it.
    fn inventories_delete(&self, id: Uuid) -> impl Future<Output = StorageResult<bool>> + Send;

    fn inventories_list(
        &self,
        query: InventoryQuery,
    ) -> impl Future<Output = StorageResult<Vec<InventoryListRow>>> + Send;

    fn inventory_counts_by_creator(
        &self,
    ) -> impl Future<Output = StorageResult<HashMap<Uuid, i64>>> + Send;

    fn inventory_tags_list(
        &self,
        inventory_id: Uuid,
    ) -> impl Future<Output = StorageResult<Vec<String>>> + Send;

    /// Tags used by at least one inventory, most used first.
    fn tags_with_counts(&self) -> impl Future<Output = StorageResult<Vec<TagCount>>> + Send;

    fn categories_list(&self) -> impl Future<Output = StorageResult<Vec<CategoryRecord>>> + Send;

    fn categories_get(
        &self,
        id: i32,
    ) -> impl Future<Output = StorageResult<Option<CategoryRecord>>> + Send;

    /// Fails with [`SqlStorageError::UniqueViolation`] on a duplicate custom ID.
    fn items_insert(&self, item: &ItemRecord) -> impl Future<Output = StorageResult<()>> + Send;

    fn items_get(&self, id: Uuid) -> impl Future<Output = StorageResult<Option<ItemRecord>>> + Send;

    /// Items of an inventory, newest first.
    fn items_list_for_inventory(
        &self,
        inventory_id: Uuid,
    ) -> impl Future<Output = StorageResult<Vec<ItemRecord>>> + Send;

    fn items_count(&self, inventory_id: Uuid) -> impl Future<Output = StorageResult<i64>> + Send;

    fn items_custom_id_exists(
        &self,
        inventory_id: Uuid,
        custom_id: &str,
        exclude_item: Option<Uuid>,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    fn items_update(
        &self,
        id: Uuid,
        custom_id: &str,
        values: &ItemValues,
        expected_version: i32,
    ) -> impl Future<Output = StorageResult<Option<ItemRecord>>> + Send;

    fn items_delete(&self, id: Uuid) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Returns `false` when the user already liked the item.
    fn likes_insert(
        &self,
        item_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    fn likes_delete(
        &self,
        item_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Like counts per item; items without likes are absent.
    fn likes_summary(
        &self,
        item_ids: &[Uuid],
        user_id: Option<Uuid>,
    ) -> impl Future<Output = StorageResult<HashMap<Uuid, LikeSummary>>> + Send;

    fn comments_insert(
        &self,
        comment: &CommentRecord,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Comments of an inventory, oldest first.
    fn comments_list(
        &self,
        inventory_id: Uuid,
    ) -> impl Future<Output = StorageResult<Vec<CommentRecord>>> + Send;

    /// Returns `false` when the grant already exists.
    fn access_grant(
        &self,
        inventory_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    fn access_revoke(
        &self,
        inventory_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    fn access_list(
        &self,
        inventory_id: Uuid,
    ) -> impl Future<Output = StorageResult<Vec<AccessGrantRecord>>> + Send;

    fn access_exists(
        &self,
        inventory_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Elements ordered by position.
    fn custom_id_elements_get(
        &self,
        inventory_id: Uuid,
    ) -> impl Future<Output = StorageResult<Vec<CustomIdElement>>> + Send;

    fn custom_id_elements_replace(
        &self,
        inventory_id: Uuid,
        elements: &[CustomIdElement],
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn api_tokens_insert(
        &self,
        token: &ApiTokenRecord,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Tokens of an inventory, newest first.
    fn api_tokens_list(
        &self,
        inventory_id: Uuid,
    ) -> impl Future<Output = StorageResult<Vec<ApiTokenRecord>>> + Send;

    fn api_tokens_get(
        &self,
        id: Uuid,
    ) -> impl Future<Output = StorageResult<Option<ApiTokenRecord>>> + Send;

    fn api_tokens_find_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = StorageResult<Option<ApiTokenRecord>>> + Send;

    fn api_tokens_deactivate(&self, id: Uuid) -> impl Future<Output = StorageResult<bool>> + Send;

    fn api_tokens_touch(
        &self,
        id: Uuid,
        used_at: DateTime<Utc>,
    ) -> impl Future<Output = StorageResult<()>> + Send;
}
