use super::{Catalog, CatalogError, CatalogResult};
use crate::custom_id::{self, CustomIdElement, ElementType};
use crate::database::SqlStorage;
use crate::users::storage::UserStorage;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Element as submitted; the type is checked when the config is saved.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomIdElementInput {
    pub position: i32,
    pub element_type: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomIdConfigRequest {
    pub elements: Vec<CustomIdElementInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomIdPreview {
    pub preview: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateCustomIdRequest {
    pub custom_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateCustomIdResponse {
    pub is_valid: bool,
}

fn parse_elements(inputs: Vec<CustomIdElementInput>) -> CatalogResult<Vec<CustomIdElement>> {
    let mut elements = inputs
        .into_iter()
        .map(|input| {
            let element_type: ElementType = input
                .element_type
                .parse()
                .map_err(|e: custom_id::UnknownElementType| CatalogError::validation(e.to_string()))?;
            let element = CustomIdElement {
                position: input.position,
                element_type,
                value: input.value,
            };
            element
                .check_options()
                .map_err(|e| CatalogError::validation(e.to_string()))?;
            Ok(element)
        })
        .collect::<CatalogResult<Vec<_>>>()?;
    elements.sort_by_key(|element| element.position);
    if let Some(pair) = elements.windows(2).find(|pair| pair[0].position == pair[1].position) {
        return Err(CatalogError::validation(format!(
            "Duplicate element position {}",
            pair[0].position
        )));
    }
    Ok(elements)
}

/// Example ID for an unsaved configuration.
pub fn preview_custom_id(inputs: Vec<CustomIdElementInput>) -> CatalogResult<CustomIdPreview> {
    let elements = parse_elements(inputs)?;
    Ok(CustomIdPreview {
        preview: custom_id::preview(&elements, Utc::now()),
    })
}

impl<S: SqlStorage, U: UserStorage> Catalog<'_, S, U> {
    pub async fn custom_id_config(&self, inventory_id: Uuid) -> CatalogResult<Vec<CustomIdElement>> {
        self.inventory(inventory_id).await?;
        Ok(self.sql.custom_id_elements_get(inventory_id).await?)
    }

    #[tracing::instrument(skip_all, fields(inventory_id = %inventory_id, user_id = %user_id))]
    pub async fn save_custom_id_config(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
        inputs: Vec<CustomIdElementInput>,
    ) -> CatalogResult<Vec<CustomIdElement>> {
        let inventory = self.inventory(inventory_id).await?;
        if !self.is_creator_or_admin(user_id, &inventory).await? {
            return Err(CatalogError::forbidden(
                "You don't have permission to edit this inventory",
            ));
        }

        let elements = parse_elements(inputs)?;
        self.sql
            .custom_id_elements_replace(inventory_id, &elements)
            .await?;
        tracing::info!(elements = elements.len(), "Custom ID format saved");
        Ok(elements)
    }

    pub async fn validate_custom_id(
        &self,
        inventory_id: Uuid,
        candidate: &str,
    ) -> CatalogResult<ValidateCustomIdResponse> {
        let elements = self.custom_id_config(inventory_id).await?;
        Ok(ValidateCustomIdResponse {
            is_valid: custom_id::matches_format(&elements, candidate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::Fixture;

    fn element(position: i32, element_type: &str, value: Option<&str>) -> CustomIdElementInput {
        CustomIdElementInput {
            position,
            element_type: element_type.into(),
            value: value.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn save_replaces_and_orders_elements() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let inventory = fx.inventory(alice).await;
        let catalog = fx.catalog();

        catalog
            .save_custom_id_config(alice, inventory, vec![element(0, "Random6", None)])
            .await
            .unwrap();
        let saved = catalog
            .save_custom_id_config(
                alice,
                inventory,
                vec![element(1, "Sequence", Some("D3")), element(0, "Fixed", Some("BK-"))],
            )
            .await
            .unwrap();
        assert_eq!(saved[0].element_type, ElementType::Fixed);

        let stored = catalog.custom_id_config(inventory).await.unwrap();
        assert_eq!(stored, saved);

        let valid = catalog.validate_custom_id(inventory, "BK-001").await.unwrap();
        assert!(valid.is_valid);
        let invalid = catalog.validate_custom_id(inventory, "XX-001").await.unwrap();
        assert!(!invalid.is_valid);
    }

    #[tokio::test]
    async fn unknown_types_and_strangers_are_rejected() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let inventory = fx.inventory(alice).await;
        let catalog = fx.catalog();

        let err = catalog
            .save_custom_id_config(alice, inventory, vec![element(0, "Emoji", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let err = catalog
            .save_custom_id_config(bob, inventory, vec![element(0, "Guid", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));
    }

    #[tokio::test]
    async fn bad_widths_and_repeated_positions_are_rejected() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let inventory = fx.inventory(alice).await;
        let catalog = fx.catalog();

        let err = catalog
            .save_custom_id_config(alice, inventory, vec![element(0, "Sequence", Some("D70000"))])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m.contains("width")));

        let err = catalog
            .save_custom_id_config(
                alice,
                inventory,
                vec![element(1, "Fixed", Some("A")), element(1, "Random6", None)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(m) if m == "Duplicate element position 1"));
        assert!(catalog.custom_id_config(inventory).await.unwrap().is_empty());

        let err = preview_custom_id(vec![element(0, "Random32", Some(r#"{"Format":"X40"}"#))])
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn preview_uses_sample_values() {
        let preview = preview_custom_id(vec![
            element(1, "Random6", None),
            element(0, "Fixed", Some("ID-")),
        ])
        .unwrap();
        assert_eq!(preview.preview, "ID-123456");
    }
}
