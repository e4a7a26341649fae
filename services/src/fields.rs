//! Custom field schema for inventories and the values items carry for it.
//!
//! Every inventory owns a [`FieldSchema`]: up to three fields of each
//! [`FieldKind`], addressed by keys such as `string1` or `number3`. Items store
//! their values as an [`ItemValues`] map keyed the same way. Both are persisted
//! as JSONB.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Maximum number of fields of a single kind.
pub const MAX_FIELDS_PER_KIND: u8 = 3;

/// Kind of a custom field. Ordering follows the order fields are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Text,
    Number,
    Link,
    #[serde(alias = "boolean")]
    Bool,
}

impl FieldKind {
    pub const ALL: [FieldKind; 5] = [
        FieldKind::String,
        FieldKind::Text,
        FieldKind::Number,
        FieldKind::Link,
        FieldKind::Bool,
    ];

    /// Prefix used in field keys (`string1`, `bool2`, ...).
    pub fn key_prefix(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Link => "link",
            FieldKind::Bool => "bool",
        }
    }

    /// Human label used for unnamed fields and aggregation reports.
    pub fn label(self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Text => "Text",
            FieldKind::Number => "Number",
            FieldKind::Link => "Link",
            FieldKind::Bool => "Boolean",
        }
    }

    /// Whether values of this kind are free text.
    pub fn is_textual(self) -> bool {
        matches!(self, FieldKind::String | FieldKind::Text | FieldKind::Link)
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key_prefix())
    }
}

/// A single configured field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub kind: FieldKind,
    pub slot: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub show_in_table: bool,
}

impl FieldDefinition {
    pub fn key(&self) -> String {
        format!("{}{}", self.kind.key_prefix(), self.slot)
    }

    /// The field name, or a label such as `Number 2` when the name is empty.
    pub fn title(&self) -> String {
        if self.name.trim().is_empty() {
            format!("{} {}", self.kind.label(), self.slot)
        } else {
            self.name.clone()
        }
    }
}

/// Field as submitted by a client; slots are assigned by the schema.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldInput {
    #[serde(rename = "type", alias = "kind")]
    pub kind: FieldKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub show_in_table: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("At most {max} {0} fields are allowed", max = MAX_FIELDS_PER_KIND)]
    TooManyFields(FieldKind),

    #[error("Field name cannot be empty")]
    EmptyName,

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field {key} expects a {expected} value")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Ordered list of field definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema(Vec<FieldDefinition>);

impl FieldSchema {
    /// Builds a schema, assigning slots per kind in input order.
    pub fn from_inputs(inputs: Vec<FieldInput>) -> Result<Self, FieldError> {
        let mut used: BTreeMap<FieldKind, u8> = BTreeMap::new();
        let mut fields = Vec::with_capacity(inputs.len());

        for input in inputs {
            let name = input.name.trim();
            if name.is_empty() {
                return Err(FieldError::EmptyName);
            }

            let slot = used.entry(input.kind).or_insert(0);
            if *slot >= MAX_FIELDS_PER_KIND {
                return Err(FieldError::TooManyFields(input.kind));
            }
            *slot += 1;

            fields.push(FieldDefinition {
                kind: input.kind,
                slot: *slot,
                name: name.to_owned(),
                description: input
                    .description
                    .map(|d| d.trim().to_owned())
                    .filter(|d| !d.is_empty()),
                show_in_table: input.show_in_table,
            });
        }

        Ok(Self(fields))
    }

    pub fn get(&self, key: &str) -> Option<&FieldDefinition> {
        self.0.iter().find(|field| field.key() == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.0.iter()
    }

    pub fn enabled(&self, kind: FieldKind) -> bool {
        self.0.iter().any(|field| field.kind == kind)
    }

    /// Fields sorted by kind and then by slot.
    pub fn ordered(&self) -> Vec<&FieldDefinition> {
        let mut fields: Vec<&FieldDefinition> = self.0.iter().collect();
        fields.sort_by_key(|field| (field.kind, field.slot));
        fields
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    fn matches(&self, kind: FieldKind) -> bool {
        match self {
            FieldValue::Text(_) => kind.is_textual(),
            FieldValue::Number(_) => kind == FieldKind::Number,
            FieldValue::Bool(_) => kind == FieldKind::Bool,
        }
    }
}

/// Title and value of a field shown in item tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayField {
    pub key: String,
    pub title: String,
    pub value: FieldValue,
}

/// Values of an item keyed by field key. Explicit `null`s are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Option<FieldValue>>")]
pub struct ItemValues(BTreeMap<String, FieldValue>);

impl From<BTreeMap<String, Option<FieldValue>>> for ItemValues {
    fn from(raw: BTreeMap<String, Option<FieldValue>>) -> Self {
        Self(
            raw.into_iter()
                .filter_map(|(key, value)| value.map(|value| (key, value)))
                .collect(),
        )
    }
}

impl FromIterator<(String, FieldValue)> for ItemValues {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ItemValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.0.insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks every value against the field it names.
    pub fn validate(&self, schema: &FieldSchema) -> Result<(), FieldError> {
        for (key, value) in &self.0 {
            let field = schema
                .get(key)
                .ok_or_else(|| FieldError::UnknownField(key.clone()))?;
            if !value.matches(field.kind) {
                let expected = match field.kind {
                    FieldKind::Number => "number",
                    FieldKind::Bool => "boolean",
                    _ => "text",
                };
                return Err(FieldError::TypeMismatch {
                    key: key.clone(),
                    expected,
                });
            }
        }
        Ok(())
    }

    /// Values of fields flagged `show_in_table`, in schema order.
    pub fn display_fields(&self, schema: &FieldSchema) -> Vec<DisplayField> {
        schema
            .iter()
            .filter(|field| field.show_in_table)
            .filter_map(|field| {
                let key = field.key();
                self.0.get(&key).map(|value| DisplayField {
                    title: field.title(),
                    value: value.clone(),
                    key,
                })
            })
            .collect()
    }
}
