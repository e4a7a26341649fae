use super::{
    AccessGrantRecord, ApiTokenRecord, CategoryRecord, CommentRecord, InventoryChanges,
    InventoryListRow, InventoryQuery, InventoryRecord, ItemRecord, LikeSummary, SqlStorage,
    SqlStorageError, StorageResult, TagCount,
};
use crate::custom_id::CustomIdElement;
use crate::fields::ItemValues;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

const SEEDED_CATEGORIES: [&str; 6] = [
    "Equipment",
    "Devices",
    "Books",
    "Documents",
    "Employees",
    "Other",
];

#[derive(Default)]
struct MockState {
    inventories: Vec<InventoryRecord>,
    inventory_tags: HashMap<Uuid, Vec<String>>,
    categories: Vec<CategoryRecord>,
    items: Vec<ItemRecord>,
    likes: Vec<(Uuid, Uuid)>,
    comments: Vec<CommentRecord>,
    grants: Vec<AccessGrantRecord>,
    custom_id_elements: HashMap<Uuid, Vec<CustomIdElement>>,
    tokens: Vec<ApiTokenRecord>,
    fail_tag_writes: bool,
}

impl MockState {
    /// Replaces the inventory's tags. Fails before touching anything when tag
    /// writes are switched off.
    fn set_tags(&mut self, inventory_id: Uuid, tags: &[String]) -> StorageResult<()> {
        if self.fail_tag_writes {
            return Err(SqlStorageError::Db("tag write failed".to_owned()));
        }
        let mut names = tags.to_vec();
        names.sort();
        names.dedup();
        if names.is_empty() {
            self.inventory_tags.remove(&inventory_id);
        } else {
            self.inventory_tags.insert(inventory_id, names);
        }
        Ok(())
    }

    fn list_row(&self, inventory: &InventoryRecord) -> InventoryListRow {
        InventoryListRow {
            inventory: inventory.clone(),
            item_count: self.item_count(inventory.id),
            tags: self
                .inventory_tags
                .get(&inventory.id)
                .cloned()
                .unwrap_or_default(),
            category_name: inventory.category_id.and_then(|id| {
                self.categories
                    .iter()
                    .find(|c| c.id == id)
                    .map(|c| c.name.clone())
            }),
        }
    }

    fn item_count(&self, inventory_id: Uuid) -> i64 {
        self.items
            .iter()
            .filter(|item| item.inventory_id == inventory_id)
            .count() as i64
    }

    /// Newest first; among equal timestamps, the later insert wins.
    fn newest_first<'a>(
        &'a self,
        filter: impl Fn(&InventoryRecord) -> bool,
    ) -> Vec<&'a InventoryRecord> {
        let mut found: Vec<&InventoryRecord> =
            self.inventories.iter().rev().filter(|i| filter(i)).collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }
}

/// In-memory `SqlStorage` for tests. Categories are seeded like the migration.
#[derive(Clone)]
pub struct MockSqlStorage {
    pub is_connected: bool,
    state: Arc<RwLock<MockState>>,
}

impl Default for MockSqlStorage {
    fn default() -> Self {
        let categories = SEEDED_CATEGORIES
            .iter()
            .zip(1..)
            .map(|(name, id)| CategoryRecord {
                id,
                name: (*name).to_owned(),
            })
            .collect();
        Self {
            is_connected: true,
            state: Arc::new(RwLock::new(MockState {
                categories,
                ..MockState::default()
            })),
        }
    }
}

impl MockSqlStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage whose health check fails.
    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
            ..Self::default()
        }
    }

    /// Makes every tag write fail, as a dropped connection mid-transaction would.
    pub fn failing_tag_writes(self) -> Self {
        self.state.write().expect("lock poisoned").fail_tag_writes = true;
        self
    }

    pub fn inventory_count(&self) -> usize {
        self.state.read().expect("lock poisoned").inventories.len()
    }

    pub fn item_count(&self) -> usize {
        self.state.read().expect("lock poisoned").items.len()
    }
}

impl SqlStorage for MockSqlStorage {
    async fn is_connected(&self) -> bool {
        self.is_connected
    }

    async fn inventories_insert(
        &self,
        inventory: &InventoryRecord,
        tags: &[String],
    ) -> StorageResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.inventories.iter().any(|i| i.id == inventory.id) {
            return Err(SqlStorageError::UniqueViolation("inventories_pkey".to_owned()));
        }
        state.set_tags(inventory.id, tags)?;
        state.inventories.push(inventory.clone());
        Ok(())
    }

    async fn inventories_get(&self, id: Uuid) -> StorageResult<Option<InventoryRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.inventories.iter().find(|i| i.id == id).cloned())
    }

    async fn inventories_update(
        &self,
        id: Uuid,
        changes: &InventoryChanges,
        tags: &[String],
        expected_version: i32,
    ) -> StorageResult<Option<InventoryRecord>> {
        let mut state = self.state.write().expect("lock poisoned");
        if !state
            .inventories
            .iter()
            .any(|i| i.id == id && i.version == expected_version)
        {
            return Ok(None);
        }
        state.set_tags(id, tags)?;
        let Some(inventory) = state.inventories.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };

        inventory.title = changes.title.clone();
        inventory.description = changes.description.clone();
        inventory.image_url = changes.image_url.clone();
        inventory.is_public = changes.is_public;
        inventory.category_id = changes.category_id;
        inventory.fields = changes.fields.clone();
        inventory.version += 1;
        inventory.updated_at = Utc::now();
        Ok(Some(inventory.clone()))
    }

    async fn inventories_delete(&self, id: Uuid) -> StorageResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        let before = state.inventories.len();
        state.inventories.retain(|i| i.id != id);
        if state.inventories.len() == before {
            return Ok(false);
        }

        let item_ids: Vec<Uuid> = state
            .items
            .iter()
            .filter(|item| item.inventory_id == id)
            .map(|item| item.id)
            .collect();
        state.items.retain(|item| item.inventory_id != id);
        state
            .likes
            .retain(|(item_id, _)| !item_ids.contains(item_id));
        state.comments.retain(|c| c.inventory_id != id);
        state.grants.retain(|g| g.inventory_id != id);
        state.tokens.retain(|t| t.inventory_id != id);
        state.inventory_tags.remove(&id);
        state.custom_id_elements.remove(&id);
        Ok(true)
    }

    async fn inventories_list(&self, query: InventoryQuery) -> StorageResult<Vec<InventoryListRow>> {
        let state = self.state.read().expect("lock poisoned");
        let limit = |limit: i64| usize::try_from(limit).unwrap_or(0);

        let rows = match query {
            InventoryQuery::Latest { limit: n } => state
                .newest_first(|_| true)
                .into_iter()
                .take(limit(n))
                .map(|i| state.list_row(i))
                .collect(),
            InventoryQuery::Creator(user_id) => state
                .newest_first(|i| i.creator_id == user_id)
                .into_iter()
                .map(|i| state.list_row(i))
                .collect(),
            InventoryQuery::SharedWith(user_id) => {
                let mut grants: Vec<&AccessGrantRecord> = state
                    .grants
                    .iter()
                    .rev()
                    .filter(|g| g.user_id == user_id)
                    .collect();
                grants.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
                grants
                    .into_iter()
                    .filter_map(|g| state.inventories.iter().find(|i| i.id == g.inventory_id))
                    .map(|i| state.list_row(i))
                    .collect()
            }
            InventoryQuery::Public { limit: n } => state
                .newest_first(|i| i.is_public)
                .into_iter()
                .take(limit(n))
                .map(|i| state.list_row(i))
                .collect(),
            InventoryQuery::Popular { limit: n } => {
                let mut rows: Vec<InventoryListRow> = state
                    .newest_first(|_| true)
                    .into_iter()
                    .map(|i| state.list_row(i))
                    .collect();
                rows.sort_by(|a, b| b.item_count.cmp(&a.item_count));
                rows.truncate(limit(n));
                rows
            }
            InventoryQuery::Search(text) => {
                let needle = text.to_lowercase();
                state
                    .newest_first(|i| {
                        i.title.to_lowercase().contains(&needle)
                            || i.description.to_lowercase().contains(&needle)
                            || state.inventory_tags.get(&i.id).is_some_and(|tags| {
                                tags.iter().any(|t| t.to_lowercase().contains(&needle))
                            })
                    })
                    .into_iter()
                    .map(|i| state.list_row(i))
                    .collect()
            }
            InventoryQuery::Tag(name) => state
                .newest_first(|i| {
                    state
                        .inventory_tags
                        .get(&i.id)
                        .is_some_and(|tags| tags.contains(&name))
                })
                .into_iter()
                .map(|i| state.list_row(i))
                .collect(),
        };
        Ok(rows)
    }

    async fn inventory_counts_by_creator(&self) -> StorageResult<HashMap<Uuid, i64>> {
        let state = self.state.read().expect("lock poisoned");
        let mut counts = HashMap::new();
        for inventory in &state.inventories {
            *counts.entry(inventory.creator_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn inventory_tags_list(&self, inventory_id: Uuid) -> StorageResult<Vec<String>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .inventory_tags
            .get(&inventory_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn tags_with_counts(&self) -> StorageResult<Vec<TagCount>> {
        let state = self.state.read().expect("lock poisoned");
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for tags in state.inventory_tags.values() {
            for tag in tags {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
        let mut result: Vec<TagCount> = counts
            .into_iter()
            .map(|(name, count)| TagCount {
                name: name.to_owned(),
                count,
            })
            .collect();
        result.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        Ok(result)
    }

    async fn categories_list(&self) -> StorageResult<Vec<CategoryRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.categories.clone())
    }

    async fn categories_get(&self, id: i32) -> StorageResult<Option<CategoryRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn items_insert(&self, item: &ItemRecord) -> StorageResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state
            .items
            .iter()
            .any(|i| i.inventory_id == item.inventory_id && i.custom_id == item.custom_id)
        {
            return Err(SqlStorageError::UniqueViolation(
                "items_inventory_id_custom_id_key".to_owned(),
            ));
        }
        state.items.push(item.clone());
        Ok(())
    }

    async fn items_get(&self, id: Uuid) -> StorageResult<Option<ItemRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.items.iter().find(|i| i.id == id).cloned())
    }

    async fn items_list_for_inventory(&self, inventory_id: Uuid) -> StorageResult<Vec<ItemRecord>> {
        let state = self.state.read().expect("lock poisoned");
        let mut items: Vec<ItemRecord> = state
            .items
            .iter()
            .rev()
            .filter(|i| i.inventory_id == inventory_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn items_count(&self, inventory_id: Uuid) -> StorageResult<i64> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.item_count(inventory_id))
    }

    async fn items_custom_id_exists(
        &self,
        inventory_id: Uuid,
        custom_id: &str,
        exclude_item: Option<Uuid>,
    ) -> StorageResult<bool> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.items.iter().any(|i| {
            i.inventory_id == inventory_id
                && i.custom_id == custom_id
                && Some(i.id) != exclude_item
        }))
    }

    async fn items_update(
        &self,
        id: Uuid,
        custom_id: &str,
        values: &ItemValues,
        expected_version: i32,
    ) -> StorageResult<Option<ItemRecord>> {
        let mut state = self.state.write().expect("lock poisoned");
        let Some(inventory_id) = state
            .items
            .iter()
            .find(|i| i.id == id && i.version == expected_version)
            .map(|i| i.inventory_id)
        else {
            return Ok(None);
        };
        if state
            .items
            .iter()
            .any(|i| i.inventory_id == inventory_id && i.custom_id == custom_id && i.id != id)
        {
            return Err(SqlStorageError::UniqueViolation(
                "items_inventory_id_custom_id_key".to_owned(),
            ));
        }

        let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        item.custom_id = custom_id.to_owned();
        item.values = values.clone();
        item.version += 1;
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn items_delete(&self, id: Uuid) -> StorageResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        let before = state.items.len();
        state.items.retain(|i| i.id != id);
        state.likes.retain(|(item_id, _)| *item_id != id);
        Ok(state.items.len() != before)
    }

    async fn likes_insert(&self, item_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.likes.contains(&(item_id, user_id)) {
            return Ok(false);
        }
        state.likes.push((item_id, user_id));
        Ok(true)
    }

    async fn likes_delete(&self, item_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        let before = state.likes.len();
        state.likes.retain(|like| *like != (item_id, user_id));
        Ok(state.likes.len() != before)
    }

    async fn likes_summary(
        &self,
        item_ids: &[Uuid],
        user_id: Option<Uuid>,
    ) -> StorageResult<HashMap<Uuid, LikeSummary>> {
        let state = self.state.read().expect("lock poisoned");
        let mut summary: HashMap<Uuid, LikeSummary> = HashMap::new();
        for (item_id, liker) in &state.likes {
            if !item_ids.contains(item_id) {
                continue;
            }
            let entry = summary.entry(*item_id).or_default();
            entry.count += 1;
            if Some(*liker) == user_id {
                entry.liked_by_user = true;
            }
        }
        Ok(summary)
    }

    async fn comments_insert(&self, comment: &CommentRecord) -> StorageResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.comments.push(comment.clone());
        Ok(())
    }

    async fn comments_list(&self, inventory_id: Uuid) -> StorageResult<Vec<CommentRecord>> {
        let state = self.state.read().expect("lock poisoned");
        let mut comments: Vec<CommentRecord> = state
            .comments
            .iter()
            .filter(|c| c.inventory_id == inventory_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn access_grant(&self, inventory_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        if state
            .grants
            .iter()
            .any(|g| g.inventory_id == inventory_id && g.user_id == user_id)
        {
            return Ok(false);
        }
        state.grants.push(AccessGrantRecord {
            inventory_id,
            user_id,
            granted_at: Utc::now(),
        });
        Ok(true)
    }

    async fn access_revoke(&self, inventory_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        let before = state.grants.len();
        state
            .grants
            .retain(|g| !(g.inventory_id == inventory_id && g.user_id == user_id));
        Ok(state.grants.len() != before)
    }

    async fn access_list(&self, inventory_id: Uuid) -> StorageResult<Vec<AccessGrantRecord>> {
        let state = self.state.read().expect("lock poisoned");
        let mut grants: Vec<AccessGrantRecord> = state
            .grants
            .iter()
            .rev()
            .filter(|g| g.inventory_id == inventory_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(grants)
    }

    async fn access_exists(&self, inventory_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .grants
            .iter()
            .any(|g| g.inventory_id == inventory_id && g.user_id == user_id))
    }

    async fn custom_id_elements_get(&self, inventory_id: Uuid) -> StorageResult<Vec<CustomIdElement>> {
        let state = self.state.read().expect("lock poisoned");
        let mut elements = state
            .custom_id_elements
            .get(&inventory_id)
            .cloned()
            .unwrap_or_default();
        elements.sort_by_key(|e| e.position);
        Ok(elements)
    }

    async fn custom_id_elements_replace(
        &self,
        inventory_id: Uuid,
        elements: &[CustomIdElement],
    ) -> StorageResult<()> {
        let mut positions = HashSet::new();
        if !elements.iter().all(|e| positions.insert(e.position)) {
            return Err(SqlStorageError::UniqueViolation(
                "custom_id_elements_pkey".to_owned(),
            ));
        }
        let mut state = self.state.write().expect("lock poisoned");
        state
            .custom_id_elements
            .insert(inventory_id, elements.to_vec());
        Ok(())
    }

    async fn api_tokens_insert(&self, token: &ApiTokenRecord) -> StorageResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.tokens.iter().any(|t| t.token == token.token) {
            return Err(SqlStorageError::UniqueViolation(
                "inventory_api_tokens_token_key".to_owned(),
            ));
        }
        state.tokens.push(token.clone());
        Ok(())
    }

    async fn api_tokens_list(&self, inventory_id: Uuid) -> StorageResult<Vec<ApiTokenRecord>> {
        let state = self.state.read().expect("lock poisoned");
        let mut tokens: Vec<ApiTokenRecord> = state
            .tokens
            .iter()
            .rev()
            .filter(|t| t.inventory_id == inventory_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    async fn api_tokens_get(&self, id: Uuid) -> StorageResult<Option<ApiTokenRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.tokens.iter().find(|t| t.id == id).cloned())
    }

    async fn api_tokens_find_by_token(&self, token: &str) -> StorageResult<Option<ApiTokenRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.tokens.iter().find(|t| t.token == token).cloned())
    }

    async fn api_tokens_deactivate(&self, id: Uuid) -> StorageResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        match state.tokens.iter_mut().find(|t| t.id == id) {
            Some(token) => {
                token.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn api_tokens_touch(&self, id: Uuid, used_at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if let Some(token) = state.tokens.iter_mut().find(|t| t.id == id) {
            token.last_used_at = Some(used_at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_id::ElementType;
    use crate::fields::FieldSchema;

    fn inventory(title: &str, creator_id: Uuid) -> InventoryRecord {
        let now = Utc::now();
        InventoryRecord {
            id: Uuid::new_v4(),
            title: title.to_owned(),
            description: String::new(),
            image_url: None,
            is_public: false,
            creator_id,
            category_id: Some(1),
            fields: FieldSchema::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn conditional_update_checks_version() {
        let storage = MockSqlStorage::new();
        let record = inventory("Lab", Uuid::new_v4());
        storage.inventories_insert(&record, &[]).await.unwrap();

        let changes = InventoryChanges {
            title: "Lab 2".to_owned(),
            description: String::new(),
            image_url: None,
            is_public: true,
            category_id: None,
            fields: FieldSchema::default(),
        };
        let updated = storage
            .inventories_update(record.id, &changes, &["lab".to_owned()], 1)
            .await
            .unwrap()
            .expect("version 1 matches");
        assert_eq!(updated.version, 2);

        let stale = storage
            .inventories_update(record.id, &changes, &[], 1)
            .await
            .unwrap();
        assert!(stale.is_none());
        assert_eq!(
            storage.inventory_tags_list(record.id).await.unwrap(),
            vec!["lab".to_owned()]
        );
    }

    #[tokio::test]
    async fn delete_cascades_to_children() {
        let storage = MockSqlStorage::new();
        let owner = Uuid::new_v4();
        let record = inventory("Books", owner);
        storage
            .inventories_insert(&record, &["library".to_owned()])
            .await
            .unwrap();
        storage.access_grant(record.id, Uuid::new_v4()).await.unwrap();

        assert!(storage.inventories_delete(record.id).await.unwrap());
        assert!(storage.tags_with_counts().await.unwrap().is_empty());
        assert!(storage.access_list(record.id).await.unwrap().is_empty());
        assert!(!storage.inventories_delete(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn failed_tag_write_leaves_inventory_untouched() {
        let storage = MockSqlStorage::new();
        let record = inventory("Garage", Uuid::new_v4());
        storage
            .inventories_insert(&record, &["tools".to_owned()])
            .await
            .unwrap();
        let storage = storage.failing_tag_writes();

        let changes = InventoryChanges {
            title: "Garage 2".to_owned(),
            description: String::new(),
            image_url: None,
            is_public: true,
            category_id: None,
            fields: FieldSchema::default(),
        };
        let err = storage
            .inventories_update(record.id, &changes, &["cars".to_owned()], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SqlStorageError::Db(_)));

        let stored = storage.inventories_get(record.id).await.unwrap().unwrap();
        assert_eq!(stored, record);
        assert_eq!(
            storage.inventory_tags_list(record.id).await.unwrap(),
            vec!["tools".to_owned()]
        );

        let other = inventory("Shed", Uuid::new_v4());
        assert!(storage.inventories_insert(&other, &[]).await.is_err());
        assert!(storage.inventories_get(other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_custom_id_positions_violate_uniqueness() {
        let storage = MockSqlStorage::new();
        let elements = [
            CustomIdElement::new(0, ElementType::Fixed, Some("A")),
            CustomIdElement::new(0, ElementType::Sequence, None),
        ];
        let err = storage
            .custom_id_elements_replace(Uuid::new_v4(), &elements)
            .await
            .unwrap_err();
        assert!(matches!(err, SqlStorageError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn categories_are_seeded() {
        let storage = MockSqlStorage::new();
        let categories = storage.categories_list().await.unwrap();
        assert_eq!(categories.len(), 6);
        assert_eq!(categories[0].name, "Equipment");
        assert_eq!(storage.categories_get(6).await.unwrap().unwrap().name, "Other");
    }
}
