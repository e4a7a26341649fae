use super::{Catalog, CatalogError, CatalogResult, UNKNOWN_USERNAME, truncate_description};
use crate::aggregation::{self, InventoryStats};
use crate::database::{
    CategoryRecord, InventoryChanges, InventoryListRow, InventoryQuery, InventoryRecord,
    SqlStorage, TagCount,
};
use crate::fields::{FieldInput, FieldSchema};
use crate::users::storage::UserStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const LATEST_LIMIT: i64 = 50;
pub const PUBLIC_LIMIT: i64 = 10;
pub const POPULAR_LIMIT: i64 = 5;

const MODIFIED_CONCURRENTLY: &str =
    "This inventory was modified by someone else. Please reload and try again.";

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category_id: Option<i32>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: Vec<FieldInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryUpdate {
    #[serde(flatten)]
    pub inventory: InventoryInput,
    pub version: i32,
}

/// Row of an inventory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryListItem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub creator_username: String,
    pub category_name: Option<String>,
    pub tags: Vec<String>,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryDetail {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub creator_id: Uuid,
    pub creator_username: String,
    pub category_id: Option<i32>,
    pub category_name: Option<String>,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub custom_fields: FieldSchema,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
    pub has_write_access: bool,
}

/// Trims tags, drops blanks and keeps the first of each duplicate.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !normalized.iter().any(|t| t == tag) {
            normalized.push(tag.to_owned());
        }
    }
    normalized
}

impl<S: SqlStorage, U: UserStorage> Catalog<'_, S, U> {
    async fn changes(&self, input: InventoryInput) -> CatalogResult<(InventoryChanges, Vec<String>)> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(CatalogError::validation("Title is required"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(CatalogError::validation(format!(
                "Title must be at most {MAX_TITLE_CHARS} characters"
            )));
        }
        if input.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(CatalogError::validation(format!(
                "Description must be at most {MAX_DESCRIPTION_CHARS} characters"
            )));
        }
        if let Some(category_id) = input.category_id {
            if self.sql.categories_get(category_id).await?.is_none() {
                return Err(CatalogError::validation("Category not found"));
            }
        }

        let changes = InventoryChanges {
            title: title.to_owned(),
            description: input.description,
            image_url: input.image_url.filter(|url| !url.trim().is_empty()),
            is_public: input.is_public,
            category_id: input.category_id,
            fields: FieldSchema::from_inputs(input.custom_fields)?,
        };
        Ok((changes, normalize_tags(&input.tags)))
    }

    #[tracing::instrument(skip_all, fields(creator_id = %creator_id))]
    pub async fn create_inventory(
        &self,
        creator_id: Uuid,
        input: InventoryInput,
    ) -> CatalogResult<InventoryDetail> {
        let (changes, tags) = self.changes(input).await?;
        let now = Utc::now();
        let inventory = InventoryRecord {
            id: Uuid::new_v4(),
            title: changes.title,
            description: changes.description,
            image_url: changes.image_url,
            is_public: changes.is_public,
            creator_id,
            category_id: changes.category_id,
            fields: changes.fields,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.sql.inventories_insert(&inventory, &tags).await?;

        tracing::info!(inventory_id = %inventory.id, "Inventory created");
        self.detail(inventory, Some(creator_id)).await
    }

    #[tracing::instrument(skip_all, fields(inventory_id = %id, user_id = %user_id))]
    pub async fn update_inventory(
        &self,
        user_id: Uuid,
        id: Uuid,
        update: InventoryUpdate,
    ) -> CatalogResult<InventoryDetail> {
        let inventory = self.inventory(id).await?;
        if !self.is_creator_or_admin(user_id, &inventory).await? {
            return Err(CatalogError::forbidden(
                "You don't have permission to edit this inventory",
            ));
        }
        if inventory.version != update.version {
            return Err(CatalogError::conflict(MODIFIED_CONCURRENTLY));
        }

        let (changes, tags) = self.changes(update.inventory).await?;
        let updated = self
            .sql
            .inventories_update(id, &changes, &tags, update.version)
            .await?
            .ok_or_else(|| CatalogError::conflict(MODIFIED_CONCURRENTLY))?;

        self.detail(updated, Some(user_id)).await
    }

    #[tracing::instrument(skip_all, fields(inventory_id = %id, user_id = %user_id))]
    pub async fn delete_inventory(&self, user_id: Uuid, id: Uuid) -> CatalogResult<()> {
        let inventory = self.inventory(id).await?;
        if !self.is_creator_or_admin(user_id, &inventory).await? {
            return Err(CatalogError::forbidden(
                "You don't have permission to delete this inventory",
            ));
        }
        if !self.sql.inventories_delete(id).await? {
            return Err(CatalogError::not_found(super::INVENTORY_NOT_FOUND));
        }
        tracing::info!("Inventory deleted");
        Ok(())
    }

    pub async fn get_inventory(
        &self,
        user_id: Option<Uuid>,
        id: Uuid,
    ) -> CatalogResult<InventoryDetail> {
        let inventory = self.inventory(id).await?;
        self.detail(inventory, user_id).await
    }

    async fn detail(
        &self,
        inventory: InventoryRecord,
        user_id: Option<Uuid>,
    ) -> CatalogResult<InventoryDetail> {
        let creator_username = self.username(inventory.creator_id).await?;
        let category_name = match inventory.category_id {
            Some(category_id) => self
                .sql
                .categories_get(category_id)
                .await?
                .map(|category| category.name),
            None => None,
        };
        let tags = self.sql.inventory_tags_list(inventory.id).await?;
        let item_count = self.sql.items_count(inventory.id).await?;
        let has_write_access = self.has_write_access(user_id, &inventory).await?;

        Ok(InventoryDetail {
            id: inventory.id,
            title: inventory.title,
            description: inventory.description,
            image_url: inventory.image_url,
            creator_id: inventory.creator_id,
            creator_username,
            category_id: inventory.category_id,
            category_name,
            is_public: inventory.is_public,
            tags,
            custom_fields: inventory.fields,
            item_count,
            created_at: inventory.created_at,
            updated_at: inventory.updated_at,
            version: inventory.version,
            has_write_access,
        })
    }

    async fn listing(&self, query: InventoryQuery) -> CatalogResult<Vec<InventoryListItem>> {
        let rows = self.sql.inventories_list(query).await?;
        let creator_ids: Vec<Uuid> = rows.iter().map(|row| row.inventory.creator_id).collect();
        let usernames = self.users.usernames(&creator_ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let InventoryListRow {
                    inventory,
                    item_count,
                    tags,
                    category_name,
                } = row;
                InventoryListItem {
                    id: inventory.id,
                    description: truncate_description(&inventory.description),
                    title: inventory.title,
                    image_url: inventory.image_url,
                    creator_username: usernames
                        .get(&inventory.creator_id)
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_USERNAME.to_owned()),
                    category_name,
                    tags,
                    item_count,
                    created_at: inventory.created_at,
                }
            })
            .collect())
    }

    pub async fn latest(&self, limit: i64) -> CatalogResult<Vec<InventoryListItem>> {
        self.listing(InventoryQuery::Latest { limit }).await
    }

    pub async fn my_inventories(&self, user_id: Uuid) -> CatalogResult<Vec<InventoryListItem>> {
        self.listing(InventoryQuery::Creator(user_id)).await
    }

    pub async fn shared_inventories(
        &self,
        user_id: Uuid,
    ) -> CatalogResult<Vec<InventoryListItem>> {
        self.listing(InventoryQuery::SharedWith(user_id)).await
    }

    pub async fn public_inventories(&self, limit: i64) -> CatalogResult<Vec<InventoryListItem>> {
        self.listing(InventoryQuery::Public { limit }).await
    }

    pub async fn popular(&self, limit: i64) -> CatalogResult<Vec<InventoryListItem>> {
        self.listing(InventoryQuery::Popular { limit }).await
    }

    pub async fn search(&self, query: &str) -> CatalogResult<Vec<InventoryListItem>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.listing(InventoryQuery::Search(query.to_owned())).await
    }

    pub async fn by_tag(&self, tag: &str) -> CatalogResult<Vec<InventoryListItem>> {
        self.listing(InventoryQuery::Tag(tag.to_owned())).await
    }

    pub async fn all_tags(&self) -> CatalogResult<Vec<TagCount>> {
        Ok(self.sql.tags_with_counts().await?)
    }

    pub async fn categories(&self) -> CatalogResult<Vec<CategoryRecord>> {
        Ok(self.sql.categories_list().await?)
    }

    pub async fn stats(&self, id: Uuid) -> CatalogResult<InventoryStats> {
        let inventory = self.inventory(id).await?;
        let items = self.sql.items_list_for_inventory(id).await?;
        Ok(aggregation::stats(&inventory, &items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::Fixture;
    use crate::fields::FieldKind;

    fn input(title: &str) -> InventoryInput {
        InventoryInput {
            title: title.into(),
            description: String::new(),
            image_url: None,
            category_id: None,
            is_public: false,
            tags: Vec::new(),
            custom_fields: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_normalizes_tags_and_starts_at_version_one() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;

        let mut request = input("  Lab equipment ");
        request.tags = vec![" lab ".into(), "".into(), "lab".into(), "tools".into()];
        request.category_id = Some(1);
        request.custom_fields = vec![FieldInput {
            kind: FieldKind::Number,
            name: "Price".into(),
            description: None,
            show_in_table: true,
        }];

        let detail = fx.catalog().create_inventory(alice, request).await.unwrap();
        assert_eq!(detail.title, "Lab equipment");
        assert_eq!(detail.version, 1);
        assert_eq!(detail.tags, vec!["lab", "tools"]);
        assert_eq!(detail.creator_username, "alice");
        assert_eq!(detail.category_name.as_deref(), Some("Equipment"));
        assert_eq!(detail.custom_fields.len(), 1);
        assert!(detail.has_write_access);
    }

    #[tokio::test]
    async fn create_validates_input() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let catalog = fx.catalog();

        let err = catalog.create_inventory(alice, input("   ")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m == "Title is required"));

        let long = "t".repeat(MAX_TITLE_CHARS + 1);
        let err = catalog.create_inventory(alice, input(&long)).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let mut bad_category = input("Books");
        bad_category.category_id = Some(999);
        let err = catalog.create_inventory(alice, bad_category).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m == "Category not found"));

        let mut too_many = input("Books");
        too_many.custom_fields = (0..4)
            .map(|i| FieldInput {
                kind: FieldKind::String,
                name: format!("s{i}"),
                description: None,
                show_in_table: false,
            })
            .collect();
        let err = catalog.create_inventory(alice, too_many).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(fx.sql.inventory_count(), 0);
    }

    #[tokio::test]
    async fn update_checks_permission_and_version() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let admin = fx.admin("root").await;
        let catalog = fx.catalog();
        let created = catalog.create_inventory(alice, input("Books")).await.unwrap();

        let update = |title: &str, version| InventoryUpdate {
            inventory: InventoryInput {
                tags: vec!["fiction".into()],
                ..input(title)
            },
            version,
        };

        let err = catalog
            .update_inventory(bob, created.id, update("Mine now", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        let updated = catalog
            .update_inventory(admin, created.id, update("Novels", 1))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.tags, vec!["fiction"]);

        let err = catalog
            .update_inventory(alice, created.id, update("Stale", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(m) if m.starts_with("This inventory was modified")));
    }

    #[tokio::test]
    async fn delete_requires_creator_or_admin() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let catalog = fx.catalog();
        let created = catalog.create_inventory(alice, input("Books")).await.unwrap();

        let err = catalog.delete_inventory(bob, created.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        catalog.delete_inventory(alice, created.id).await.unwrap();
        let err = catalog.get_inventory(None, created.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn write_access_rules() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let catalog = fx.catalog();

        let private = catalog.create_inventory(alice, input("Private")).await.unwrap();
        let detail = catalog.get_inventory(Some(bob), private.id).await.unwrap();
        assert!(!detail.has_write_access);
        assert!(!catalog.get_inventory(None, private.id).await.unwrap().has_write_access);

        fx.sql.access_grant(private.id, bob).await.unwrap();
        assert!(catalog.get_inventory(Some(bob), private.id).await.unwrap().has_write_access);

        let mut public = input("Public");
        public.is_public = true;
        let public = catalog.create_inventory(alice, public).await.unwrap();
        let carol = fx.user("carol").await;
        assert!(catalog.get_inventory(Some(carol), public.id).await.unwrap().has_write_access);
    }

    #[tokio::test]
    async fn listings_truncate_and_search() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let catalog = fx.catalog();

        let mut long = input("Archive");
        long.description = "d".repeat(200);
        long.tags = vec!["paper".into()];
        catalog.create_inventory(alice, long).await.unwrap();
        catalog.create_inventory(alice, input("Tools")).await.unwrap();

        let latest = catalog.latest(LATEST_LIMIT).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].title, "Tools");
        let archive = &latest[1];
        assert_eq!(archive.description.len(), 153);
        assert_eq!(archive.creator_username, "alice");

        assert!(catalog.search("   ").await.unwrap().is_empty());
        assert_eq!(catalog.search("PAPER").await.unwrap().len(), 1);
        assert_eq!(catalog.by_tag("paper").await.unwrap().len(), 1);
        assert_eq!(catalog.my_inventories(alice).await.unwrap().len(), 2);

        let tags = catalog.all_tags().await.unwrap();
        assert_eq!(tags, vec![TagCount { name: "paper".into(), count: 1 }]);
    }
}
