//! Per-field summaries of an inventory's items.
//!
//! [`aggregate`] feeds the token-authenticated `/v1/data` endpoint and covers
//! every configured field. [`stats`] is the lighter summary shown on the
//! inventory page and only covers named number and string fields.

use crate::database::{InventoryRecord, ItemRecord};
use crate::fields::{FieldDefinition, FieldKind};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

const TOP_TEXT_VALUES: usize = 10;
const TOP_STAT_VALUES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryAggregatedData {
    pub inventory_id: Uuid,
    pub title: String,
    pub description: String,
    pub fields: Vec<FieldAggregation>,
    pub total_items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldAggregation {
    pub field_title: String,
    pub field_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_data: Option<NumberAggregation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_data: Option<TextAggregation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberAggregation {
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextAggregation {
    pub most_popular_values: Vec<ValueCount>,
    pub total_unique_values: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryStats {
    pub total_items: usize,
    pub field_stats: BTreeMap<String, FieldStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldStats {
    Numeric {
        min: f64,
        max: f64,
        average: f64,
        count: usize,
    },
    Text {
        top_values: Vec<ValueCount>,
        unique_count: usize,
    },
}

fn field_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Bool => "boolean",
        other => other.key_prefix(),
    }
}

/// Summarizes every configured field, grouped by kind then slot.
pub fn aggregate(inventory: &InventoryRecord, items: &[ItemRecord]) -> InventoryAggregatedData {
    let fields = inventory
        .fields
        .ordered()
        .into_iter()
        .map(|field| aggregate_field(field, items))
        .collect();

    InventoryAggregatedData {
        inventory_id: inventory.id,
        title: inventory.title.clone(),
        description: inventory.description.clone(),
        fields,
        total_items: items.len(),
    }
}

fn aggregate_field(field: &FieldDefinition, items: &[ItemRecord]) -> FieldAggregation {
    let key = field.key();
    let mut aggregation = FieldAggregation {
        field_title: field.title(),
        field_type: field_type(field.kind),
        number_data: None,
        text_data: None,
    };

    match field.kind {
        FieldKind::Number => {
            let values: Vec<f64> = items
                .iter()
                .filter_map(|item| item.values.get(&key).and_then(|v| v.as_number()))
                .collect();
            aggregation.number_data = Some(number_aggregation(&values));
        }
        FieldKind::Bool => {
            let flags: Vec<bool> = items
                .iter()
                .filter_map(|item| item.values.get(&key).and_then(|v| v.as_bool()))
                .collect();
            let true_count = flags.iter().filter(|&&flag| flag).count();
            aggregation.text_data = Some(TextAggregation {
                most_popular_values: vec![
                    ValueCount {
                        value: "True".to_owned(),
                        count: true_count,
                    },
                    ValueCount {
                        value: "False".to_owned(),
                        count: flags.len() - true_count,
                    },
                ],
                total_unique_values: 2,
            });
        }
        FieldKind::String | FieldKind::Text | FieldKind::Link => {
            let values = items
                .iter()
                .filter_map(|item| item.values.get(&key).and_then(|v| v.as_text()))
                .filter(|text| !text.trim().is_empty());
            aggregation.text_data = Some(text_aggregation(values));
        }
    }

    aggregation
}

fn number_aggregation(values: &[f64]) -> NumberAggregation {
    if values.is_empty() {
        return NumberAggregation {
            average: None,
            min: None,
            max: None,
            count: 0,
        };
    }
    let sum: f64 = values.iter().sum();
    NumberAggregation {
        average: Some(sum / values.len() as f64),
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
        count: values.len(),
    }
}

/// Case-insensitive frequencies reported under the first spelling seen.
fn text_aggregation<'a>(values: impl Iterator<Item = &'a str>) -> TextAggregation {
    let mut counts: Vec<ValueCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for value in values {
        let folded = value.to_lowercase();
        match index.get(&folded) {
            Some(&at) => counts[at].count += 1,
            None => {
                index.insert(folded, counts.len());
                counts.push(ValueCount {
                    value: value.to_owned(),
                    count: 1,
                });
            }
        }
    }

    let total_unique_values = counts.len();
    // Stable sort keeps first-seen order among ties.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(TOP_TEXT_VALUES);

    TextAggregation {
        most_popular_values: counts,
        total_unique_values,
    }
}

/// Inventory page summary keyed by field name.
pub fn stats(inventory: &InventoryRecord, items: &[ItemRecord]) -> InventoryStats {
    let mut field_stats = BTreeMap::new();

    for field in inventory.fields.ordered() {
        if field.name.trim().is_empty() {
            continue;
        }
        let key = field.key();
        match field.kind {
            FieldKind::Number => {
                let values: Vec<f64> = items
                    .iter()
                    .filter_map(|item| item.values.get(&key).and_then(|v| v.as_number()))
                    .collect();
                let summary = number_aggregation(&values);
                if let (Some(min), Some(max), Some(average)) =
                    (summary.min, summary.max, summary.average)
                {
                    field_stats.insert(
                        field.name.clone(),
                        FieldStats::Numeric {
                            min,
                            max,
                            average,
                            count: summary.count,
                        },
                    );
                }
            }
            FieldKind::String => {
                let mut counts: Vec<ValueCount> = Vec::new();
                for text in items
                    .iter()
                    .filter_map(|item| item.values.get(&key).and_then(|v| v.as_text()))
                    .filter(|text| !text.is_empty())
                {
                    match counts.iter_mut().find(|c| c.value == text) {
                        Some(existing) => existing.count += 1,
                        None => counts.push(ValueCount {
                            value: text.to_owned(),
                            count: 1,
                        }),
                    }
                }
                if counts.is_empty() {
                    continue;
                }
                let unique_count = counts.len();
                counts.sort_by(|a, b| b.count.cmp(&a.count));
                counts.truncate(TOP_STAT_VALUES);
                field_stats.insert(
                    field.name.clone(),
                    FieldStats::Text {
                        top_values: counts,
                        unique_count,
                    },
                );
            }
            _ => {}
        }
    }

    InventoryStats {
        total_items: items.len(),
        field_stats,
    }
}
