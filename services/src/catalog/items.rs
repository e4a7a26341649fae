use super::{Catalog, CatalogError, CatalogResult, ITEM_NOT_FOUND, UNKNOWN_USERNAME};
use crate::custom_id::{self, CustomIdElement};
use crate::database::{InventoryRecord, ItemRecord, SqlStorage, SqlStorageError};
use crate::fields::{DisplayField, ItemValues};
use crate::users::storage::UserStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attempts at a generated custom ID before giving up.
const GENERATE_ATTEMPTS: u64 = 3;

const DUPLICATE_CUSTOM_ID: &str = "An item with this custom ID already exists in this inventory";
const MODIFIED_CONCURRENTLY: &str =
    "This item was modified by someone else. Please reload and try again.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemInput {
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub values: ItemValues,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemUpdate {
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub values: ItemValues,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDto {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub custom_id: String,
    pub values: ItemValues,
    pub display_fields: Vec<DisplayField>,
    pub created_by_id: Uuid,
    pub created_by_username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
    pub like_count: i64,
    pub is_liked_by_current_user: bool,
}

fn supplied(custom_id: Option<&str>) -> Option<&str> {
    custom_id.map(str::trim).filter(|id| !id.is_empty())
}

fn unique_violation_as_duplicate(err: SqlStorageError) -> CatalogError {
    match err {
        SqlStorageError::UniqueViolation(_) => CatalogError::conflict(DUPLICATE_CUSTOM_ID),
        other => other.into(),
    }
}

impl<S: SqlStorage, U: UserStorage> Catalog<'_, S, U> {
    async fn item(&self, id: Uuid) -> CatalogResult<ItemRecord> {
        self.sql
            .items_get(id)
            .await?
            .ok_or_else(|| CatalogError::not_found(ITEM_NOT_FOUND))
    }

    /// Loads the item's inventory and checks the caller may write to it.
    async fn writable_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        denied: &str,
    ) -> CatalogResult<(ItemRecord, InventoryRecord)> {
        let item = self.item(item_id).await?;
        let inventory = self.inventory(item.inventory_id).await?;
        if !self.has_write_access(Some(user_id), &inventory).await? {
            return Err(CatalogError::forbidden(denied));
        }
        Ok((item, inventory))
    }

    fn check_custom_id_format(
        elements: &[CustomIdElement],
        candidate: &str,
    ) -> CatalogResult<()> {
        if custom_id::matches_format(elements, candidate) {
            Ok(())
        } else {
            Err(CatalogError::validation(
                "Custom ID does not match this inventory's ID format",
            ))
        }
    }

    #[tracing::instrument(skip_all, fields(inventory_id = %inventory_id, user_id = %user_id))]
    pub async fn create_item(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
        input: ItemInput,
    ) -> CatalogResult<ItemDto> {
        let inventory = self.inventory(inventory_id).await?;
        if !self.has_write_access(Some(user_id), &inventory).await? {
            return Err(CatalogError::forbidden(
                "You don't have permission to add items to this inventory",
            ));
        }
        input.values.validate(&inventory.fields)?;

        let elements = self.sql.custom_id_elements_get(inventory_id).await?;
        let now = Utc::now();
        let mut item = ItemRecord {
            id: Uuid::new_v4(),
            inventory_id,
            custom_id: String::new(),
            values: input.values,
            created_by: user_id,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        if let Some(custom_id) = supplied(input.custom_id.as_deref()) {
            Self::check_custom_id_format(&elements, custom_id)?;
            if self
                .sql
                .items_custom_id_exists(inventory_id, custom_id, None)
                .await?
            {
                return Err(CatalogError::conflict(DUPLICATE_CUSTOM_ID));
            }
            item.custom_id = custom_id.to_owned();
            self.sql
                .items_insert(&item)
                .await
                .map_err(unique_violation_as_duplicate)?;
        } else {
            self.insert_with_generated_id(&mut item, &elements).await?;
        }

        tracing::info!(item_id = %item.id, custom_id = %item.custom_id, "Item created");
        self.item_dto(&inventory, item, Some(user_id)).await
    }

    /// Sequence is the item count plus one, bumped on each retry.
    async fn insert_with_generated_id(
        &self,
        item: &mut ItemRecord,
        elements: &[CustomIdElement],
    ) -> CatalogResult<()> {
        let count = self.sql.items_count(item.inventory_id).await?;
        let first_sequence = u64::try_from(count).unwrap_or(0) + 1;

        for attempt in 0..GENERATE_ATTEMPTS {
            item.custom_id = custom_id::generate(
                elements,
                first_sequence + attempt,
                item.created_at,
                &mut rand::thread_rng(),
            );
            if self
                .sql
                .items_custom_id_exists(item.inventory_id, &item.custom_id, None)
                .await?
            {
                tracing::debug!(custom_id = %item.custom_id, attempt, "Generated custom ID taken");
                continue;
            }
            match self.sql.items_insert(item).await {
                Ok(()) => return Ok(()),
                Err(SqlStorageError::UniqueViolation(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        tracing::warn!(inventory_id = %item.inventory_id, "Could not generate a free custom ID");
        Err(CatalogError::conflict(DUPLICATE_CUSTOM_ID))
    }

    #[tracing::instrument(skip_all, fields(item_id = %item_id, user_id = %user_id))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> CatalogResult<ItemDto> {
        let (item, inventory) = self
            .writable_item(user_id, item_id, "You don't have permission to edit this item")
            .await?;
        if item.version != update.version {
            return Err(CatalogError::conflict(MODIFIED_CONCURRENTLY));
        }
        update.values.validate(&inventory.fields)?;

        let custom_id = supplied(update.custom_id.as_deref()).unwrap_or(&item.custom_id);
        if custom_id != item.custom_id {
            let elements = self.sql.custom_id_elements_get(inventory.id).await?;
            Self::check_custom_id_format(&elements, custom_id)?;
            if self
                .sql
                .items_custom_id_exists(inventory.id, custom_id, Some(item_id))
                .await?
            {
                return Err(CatalogError::conflict(DUPLICATE_CUSTOM_ID));
            }
        }

        let updated = self
            .sql
            .items_update(item_id, custom_id, &update.values, update.version)
            .await
            .map_err(unique_violation_as_duplicate)?
            .ok_or_else(|| CatalogError::conflict(MODIFIED_CONCURRENTLY))?;

        self.item_dto(&inventory, updated, Some(user_id)).await
    }

    #[tracing::instrument(skip_all, fields(item_id = %item_id, user_id = %user_id))]
    pub async fn delete_item(&self, user_id: Uuid, item_id: Uuid) -> CatalogResult<()> {
        self.writable_item(user_id, item_id, "You don't have permission to delete this item")
            .await?;
        if !self.sql.items_delete(item_id).await? {
            return Err(CatalogError::not_found(ITEM_NOT_FOUND));
        }
        Ok(())
    }

    pub async fn get_item(&self, user_id: Option<Uuid>, item_id: Uuid) -> CatalogResult<ItemDto> {
        let item = self.item(item_id).await?;
        let inventory = self.inventory(item.inventory_id).await?;
        self.item_dto(&inventory, item, user_id).await
    }

    /// Newest first.
    pub async fn list_items(
        &self,
        user_id: Option<Uuid>,
        inventory_id: Uuid,
    ) -> CatalogResult<Vec<ItemDto>> {
        let inventory = self.inventory(inventory_id).await?;
        let items = self.sql.items_list_for_inventory(inventory_id).await?;
        self.item_dtos(&inventory, items, user_id).await
    }

    pub async fn like_item(&self, user_id: Uuid, item_id: Uuid) -> CatalogResult<()> {
        self.item(item_id).await?;
        if !self.sql.likes_insert(item_id, user_id).await? {
            return Err(CatalogError::conflict("You already liked this item"));
        }
        Ok(())
    }

    pub async fn unlike_item(&self, user_id: Uuid, item_id: Uuid) -> CatalogResult<()> {
        if !self.sql.likes_delete(item_id, user_id).await? {
            return Err(CatalogError::not_found("Like not found"));
        }
        Ok(())
    }

    async fn item_dto(
        &self,
        inventory: &InventoryRecord,
        item: ItemRecord,
        user_id: Option<Uuid>,
    ) -> CatalogResult<ItemDto> {
        let mut dtos = self.item_dtos(inventory, vec![item], user_id).await?;
        dtos.pop()
            .ok_or_else(|| CatalogError::not_found(ITEM_NOT_FOUND))
    }

    async fn item_dtos(
        &self,
        inventory: &InventoryRecord,
        items: Vec<ItemRecord>,
        user_id: Option<Uuid>,
    ) -> CatalogResult<Vec<ItemDto>> {
        let item_ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
        let author_ids: Vec<Uuid> = items.iter().map(|item| item.created_by).collect();
        let likes = self.sql.likes_summary(&item_ids, user_id).await?;
        let usernames = self.users.usernames(&author_ids).await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let like = likes.get(&item.id).copied().unwrap_or_default();
                ItemDto {
                    id: item.id,
                    inventory_id: item.inventory_id,
                    display_fields: item.values.display_fields(&inventory.fields),
                    custom_id: item.custom_id,
                    values: item.values,
                    created_by_id: item.created_by,
                    created_by_username: usernames
                        .get(&item.created_by)
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_USERNAME.to_owned()),
                    created_at: item.created_at,
                    updated_at: item.updated_at,
                    version: item.version,
                    like_count: like.count,
                    is_liked_by_current_user: like.liked_by_user,
                }
            })
            .collect())
    }
}
