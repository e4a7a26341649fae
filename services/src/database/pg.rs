use super::{
    AccessGrantRecord, ApiTokenRecord, CategoryRecord, CommentRecord, InventoryChanges,
    InventoryListRow, InventoryQuery, InventoryRecord, ItemRecord, LikeSummary, SqlStorage,
    SqlStorageError, StorageResult, TagCount,
};
use crate::custom_id::CustomIdElement;
use crate::fields::{FieldSchema, ItemValues};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

/// PostgreSQL-backed storage sharing one connection pool.
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_err(err: sqlx::Error) -> SqlStorageError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => SqlStorageError::UniqueViolation(
            db_err.constraint().unwrap_or("unique").to_owned(),
        ),
        _ => SqlStorageError::Db(err.to_string()),
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside `ILIKE`.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Replaces the inventory's tags inside the caller's transaction.
async fn replace_tags(
    conn: &mut PgConnection,
    inventory_id: Uuid,
    tags: &[String],
) -> StorageResult<()> {
    sqlx::query("DELETE FROM inventory_tags WHERE inventory_id = $1")
        .bind(inventory_id)
        .execute(&mut *conn)
        .await
        .map_err(map_err)?;

    for name in tags {
        let tag_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tags (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_err)?;

        sqlx::query(
            "INSERT INTO inventory_tags (inventory_id, tag_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(inventory_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .map_err(map_err)?;
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    id: Uuid,
    title: String,
    description: String,
    image_url: Option<String>,
    is_public: bool,
    creator_id: Uuid,
    category_id: Option<i32>,
    fields: Json<FieldSchema>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryRecord {
    fn from(row: InventoryRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            image_url: row.image_url,
            is_public: row.is_public,
            creator_id: row.creator_id,
            category_id: row.category_id,
            fields: row.fields.0,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ListRow {
    #[sqlx(flatten)]
    inventory: InventoryRow,
    item_count: i64,
    tags: Vec<String>,
    category_name: Option<String>,
}

impl From<ListRow> for InventoryListRow {
    fn from(row: ListRow) -> Self {
        Self {
            inventory: row.inventory.into(),
            item_count: row.item_count,
            tags: row.tags,
            category_name: row.category_name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    inventory_id: Uuid,
    custom_id: String,
    values: Json<ItemValues>,
    created_by: Uuid,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for ItemRecord {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            inventory_id: row.inventory_id,
            custom_id: row.custom_id,
            values: row.values.0,
            created_by: row.created_by,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    inventory_id: Uuid,
    author_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ApiTokenRow {
    id: Uuid,
    inventory_id: Uuid,
    token: String,
    name: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiTokenRow> for ApiTokenRecord {
    fn from(row: ApiTokenRow) -> Self {
        Self {
            id: row.id,
            inventory_id: row.inventory_id,
            token: row.token,
            name: row.name,
            created_by: row.created_by,
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
            last_used_at: row.last_used_at,
        }
    }
}

const INVENTORY_COLUMNS: &str = "i.id, i.title, i.description, i.image_url, i.is_public, \
     i.creator_id, i.category_id, i.fields, i.version, i.created_at, i.updated_at";

const ITEM_COLUMNS: &str =
    r#"id, inventory_id, custom_id, "values", created_by, version, created_at, updated_at"#;

const TOKEN_COLUMNS: &str =
    "id, inventory_id, token, name, created_by, created_at, expires_at, is_active, last_used_at";

fn list_select() -> String {
    format!(
        "SELECT {INVENTORY_COLUMNS}, \
         c.name AS category_name, \
         (SELECT COUNT(*) FROM items it WHERE it.inventory_id = i.id) AS item_count, \
         COALESCE((SELECT array_agg(t.name ORDER BY t.name) FROM inventory_tags itg \
                   JOIN tags t ON t.id = itg.tag_id WHERE itg.inventory_id = i.id), \
                  ARRAY[]::TEXT[]) AS tags \
         FROM inventories i \
         LEFT JOIN categories c ON c.id = i.category_id"
    )
}

impl SqlStorage for PgStorage {
    async fn is_connected(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn inventories_insert(
        &self,
        inventory: &InventoryRecord,
        tags: &[String],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        sqlx::query(
            r#"
            INSERT INTO inventories
                (id, title, description, image_url, is_public, creator_id, category_id,
                 fields, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(inventory.id)
        .bind(&inventory.title)
        .bind(&inventory.description)
        .bind(&inventory.image_url)
        .bind(inventory.is_public)
        .bind(inventory.creator_id)
        .bind(inventory.category_id)
        .bind(Json(&inventory.fields))
        .bind(inventory.version)
        .bind(inventory.created_at)
        .bind(inventory.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;
        replace_tags(&mut *tx, inventory.id, tags).await?;
        tx.commit().await.map_err(map_err)?;
        Ok(())
    }

    async fn inventories_get(&self, id: Uuid) -> StorageResult<Option<InventoryRecord>> {
        let row = sqlx::query_as::<_, InventoryRow>(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventories i WHERE i.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(Into::into))
    }

    async fn inventories_update(
        &self,
        id: Uuid,
        changes: &InventoryChanges,
        tags: &[String],
        expected_version: i32,
    ) -> StorageResult<Option<InventoryRecord>> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let row = sqlx::query_as::<_, InventoryRow>(&format!(
            r#"
            UPDATE inventories i
            SET title = $3, description = $4, image_url = $5, is_public = $6,
                category_id = $7, fields = $8, version = i.version + 1, updated_at = NOW()
            WHERE i.id = $1 AND i.version = $2
            RETURNING {INVENTORY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_version)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.image_url)
        .bind(changes.is_public)
        .bind(changes.category_id)
        .bind(Json(&changes.fields))
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        replace_tags(&mut *tx, id, tags).await?;
        tx.commit().await.map_err(map_err)?;
        Ok(Some(row.into()))
    }

    async fn inventories_delete(&self, id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM inventories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn inventories_list(&self, query: InventoryQuery) -> StorageResult<Vec<InventoryListRow>> {
        let select = list_select();
        let rows = match query {
            InventoryQuery::Latest { limit } => {
                sqlx::query_as::<_, ListRow>(&format!(
                    "{select} ORDER BY i.created_at DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            InventoryQuery::Creator(user_id) => {
                sqlx::query_as::<_, ListRow>(&format!(
                    "{select} WHERE i.creator_id = $1 ORDER BY i.created_at DESC"
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
            InventoryQuery::SharedWith(user_id) => {
                sqlx::query_as::<_, ListRow>(&format!(
                    "{select} JOIN inventory_access a ON a.inventory_id = i.id \
                     WHERE a.user_id = $1 ORDER BY a.granted_at DESC"
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
            InventoryQuery::Public { limit } => {
                sqlx::query_as::<_, ListRow>(&format!(
                    "{select} WHERE i.is_public ORDER BY i.created_at DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            InventoryQuery::Popular { limit } => {
                sqlx::query_as::<_, ListRow>(&format!(
                    "{select} ORDER BY item_count DESC, i.created_at DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            InventoryQuery::Search(text) => {
                sqlx::query_as::<_, ListRow>(&format!(
                    "{select} WHERE i.title ILIKE $1 OR i.description ILIKE $1 \
                     OR EXISTS (SELECT 1 FROM inventory_tags st JOIN tags t ON t.id = st.tag_id \
                                WHERE st.inventory_id = i.id AND t.name ILIKE $1) \
                     ORDER BY i.created_at DESC"
                ))
                .bind(like_pattern(&text))
                .fetch_all(&self.pool)
                .await
            }
            InventoryQuery::Tag(name) => {
                sqlx::query_as::<_, ListRow>(&format!(
                    "{select} WHERE EXISTS (SELECT 1 FROM inventory_tags st \
                     JOIN tags t ON t.id = st.tag_id \
                     WHERE st.inventory_id = i.id AND t.name = $1) \
                     ORDER BY i.created_at DESC"
                ))
                .bind(name)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn inventory_counts_by_creator(&self) -> StorageResult<HashMap<Uuid, i64>> {
        let rows: Vec<(Uuid, i64)> =
            sqlx::query_as("SELECT creator_id, COUNT(*) FROM inventories GROUP BY creator_id")
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;
        Ok(rows.into_iter().collect())
    }

    async fn inventory_tags_list(&self, inventory_id: Uuid) -> StorageResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT t.name FROM inventory_tags it JOIN tags t ON t.id = it.tag_id \
             WHERE it.inventory_id = $1 ORDER BY t.name",
        )
        .bind(inventory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn tags_with_counts(&self) -> StorageResult<Vec<TagCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT t.name, COUNT(*) AS usage FROM tags t \
             JOIN inventory_tags it ON it.tag_id = t.id \
             GROUP BY t.name ORDER BY usage DESC, t.name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows
            .into_iter()
            .map(|(name, count)| TagCount { name, count })
            .collect())
    }

    async fn categories_list(&self) -> StorageResult<Vec<CategoryRecord>> {
        let rows: Vec<(i32, String)> = sqlx::query_as("SELECT id, name FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| CategoryRecord { id, name })
            .collect())
    }

    async fn categories_get(&self, id: i32) -> StorageResult<Option<CategoryRecord>> {
        let row: Option<(i32, String)> =
            sqlx::query_as("SELECT id, name FROM categories WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
        Ok(row.map(|(id, name)| CategoryRecord { id, name }))
    }

    async fn items_insert(&self, item: &ItemRecord) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO items ({ITEM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(item.id)
        .bind(item.inventory_id)
        .bind(&item.custom_id)
        .bind(Json(&item.values))
        .bind(item.created_by)
        .bind(item.version)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn items_get(&self, id: Uuid) -> StorageResult<Option<ItemRecord>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(Into::into))
    }

    async fn items_list_for_inventory(&self, inventory_id: Uuid) -> StorageResult<Vec<ItemRecord>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE inventory_id = $1 ORDER BY created_at DESC"
        ))
        .bind(inventory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn items_count(&self, inventory_id: Uuid) -> StorageResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE inventory_id = $1")
            .bind(inventory_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn items_custom_id_exists(
        &self,
        inventory_id: Uuid,
        custom_id: &str,
        exclude_item: Option<Uuid>,
    ) -> StorageResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM items WHERE inventory_id = $1 AND custom_id = $2 \
             AND ($3::UUID IS NULL OR id <> $3))",
        )
        .bind(inventory_id)
        .bind(custom_id)
        .bind(exclude_item)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn items_update(
        &self,
        id: Uuid,
        custom_id: &str,
        values: &ItemValues,
        expected_version: i32,
    ) -> StorageResult<Option<ItemRecord>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE items
            SET custom_id = $3, "values" = $4, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_version)
        .bind(custom_id)
        .bind(Json(values))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(Into::into))
    }

    async fn items_delete(&self, id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn likes_insert(&self, item_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query(
            "INSERT INTO likes (item_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(item_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn likes_delete(&self, item_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE item_id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn likes_summary(
        &self,
        item_ids: &[Uuid],
        user_id: Option<Uuid>,
    ) -> StorageResult<HashMap<Uuid, LikeSummary>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, i64, bool)> = sqlx::query_as(
            "SELECT item_id, COUNT(*), COALESCE(BOOL_OR(user_id = $2), FALSE) \
             FROM likes WHERE item_id = ANY($1) GROUP BY item_id",
        )
        .bind(item_ids)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows
            .into_iter()
            .map(|(item_id, count, liked_by_user)| {
                (
                    item_id,
                    LikeSummary {
                        count,
                        liked_by_user,
                    },
                )
            })
            .collect())
    }

    async fn comments_insert(&self, comment: &CommentRecord) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, inventory_id, author_id, content, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(comment.id)
        .bind(comment.inventory_id)
        .bind(comment.author_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn comments_list(&self, inventory_id: Uuid) -> StorageResult<Vec<CommentRecord>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT id, inventory_id, author_id, content, created_at FROM comments \
             WHERE inventory_id = $1 ORDER BY created_at ASC",
        )
        .bind(inventory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows
            .into_iter()
            .map(|row| CommentRecord {
                id: row.id,
                inventory_id: row.inventory_id,
                author_id: row.author_id,
                content: row.content,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn access_grant(&self, inventory_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query(
            "INSERT INTO inventory_access (inventory_id, user_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(inventory_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn access_revoke(&self, inventory_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let result =
            sqlx::query("DELETE FROM inventory_access WHERE inventory_id = $1 AND user_id = $2")
                .bind(inventory_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn access_list(&self, inventory_id: Uuid) -> StorageResult<Vec<AccessGrantRecord>> {
        let rows: Vec<(Uuid, Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT inventory_id, user_id, granted_at FROM inventory_access \
             WHERE inventory_id = $1 ORDER BY granted_at DESC",
        )
        .bind(inventory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows
            .into_iter()
            .map(|(inventory_id, user_id, granted_at)| AccessGrantRecord {
                inventory_id,
                user_id,
                granted_at,
            })
            .collect())
    }

    async fn access_exists(&self, inventory_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM inventory_access WHERE inventory_id = $1 AND user_id = $2)",
        )
        .bind(inventory_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn custom_id_elements_get(&self, inventory_id: Uuid) -> StorageResult<Vec<CustomIdElement>> {
        let rows: Vec<(i32, String, Option<String>)> = sqlx::query_as(
            "SELECT position, element_type, value FROM custom_id_elements \
             WHERE inventory_id = $1 ORDER BY position",
        )
        .bind(inventory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut elements = Vec::with_capacity(rows.len());
        for (position, element_type, value) in rows {
            match element_type.parse() {
                Ok(element_type) => elements.push(CustomIdElement {
                    position,
                    element_type,
                    value,
                }),
                Err(err) => {
                    tracing::warn!(%inventory_id, position, "Skipping stored element: {}", err)
                }
            }
        }
        Ok(elements)
    }

    async fn custom_id_elements_replace(
        &self,
        inventory_id: Uuid,
        elements: &[CustomIdElement],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        sqlx::query("DELETE FROM custom_id_elements WHERE inventory_id = $1")
            .bind(inventory_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        for element in elements {
            sqlx::query(
                "INSERT INTO custom_id_elements (inventory_id, position, element_type, value) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(inventory_id)
            .bind(element.position)
            .bind(element.element_type.as_str())
            .bind(&element.value)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        }

        tx.commit().await.map_err(map_err)?;
        Ok(())
    }

    async fn api_tokens_insert(&self, token: &ApiTokenRecord) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO inventory_api_tokens ({TOKEN_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(token.id)
        .bind(token.inventory_id)
        .bind(&token.token)
        .bind(&token.name)
        .bind(token.created_by)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.is_active)
        .bind(token.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn api_tokens_list(&self, inventory_id: Uuid) -> StorageResult<Vec<ApiTokenRecord>> {
        let rows = sqlx::query_as::<_, ApiTokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM inventory_api_tokens \
             WHERE inventory_id = $1 ORDER BY created_at DESC"
        ))
        .bind(inventory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn api_tokens_get(&self, id: Uuid) -> StorageResult<Option<ApiTokenRecord>> {
        let row = sqlx::query_as::<_, ApiTokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM inventory_api_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(Into::into))
    }

    async fn api_tokens_find_by_token(&self, token: &str) -> StorageResult<Option<ApiTokenRecord>> {
        let row = sqlx::query_as::<_, ApiTokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM inventory_api_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(Into::into))
    }

    async fn api_tokens_deactivate(&self, id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE inventory_api_tokens SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn api_tokens_touch(&self, id: Uuid, used_at: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query("UPDATE inventory_api_tokens SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(used_at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
