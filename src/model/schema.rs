//! Table naming and attribute synthesis from introspected columns.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::db::ColumnInfo;

/// Column type as inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttributeType {
    Integer,
    String,
    Timestamp,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Integer => "INTEGER",
            AttributeType::String => "STRING",
            AttributeType::Timestamp => "DATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDef {
    pub attr_type: AttributeType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub allow_null: bool,
}

impl AttributeDef {
    pub fn of(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            primary_key: false,
            auto_increment: false,
            allow_null: true,
        }
    }

    pub fn primary_key() -> Self {
        Self {
            attr_type: AttributeType::Integer,
            primary_key: true,
            auto_increment: true,
            allow_null: false,
        }
    }
}

/// Column name to attribute definition, `id` first.
pub type AttributeSchema = IndexMap<String, AttributeDef>;

/// Table backing a model: lower-cased name plus `s`.
///
/// - `User` -> `users`
/// - `BlogPost` -> `blogposts`
pub fn table_name_for(model: &str) -> String {
    format!("{}s", model.to_lowercase())
}

/// Build the attribute schema for a model from its table's columns.
///
/// `id` is always an auto-incrementing integer primary key whether or not
/// it was introspected; `created_at`/`updated_at` are timestamps and every
/// other column is a string.
pub fn synthesize_attributes(model: &str, columns: &[ColumnInfo]) -> AttributeSchema {
    let mut attributes = AttributeSchema::new();
    attributes.insert("id".to_string(), AttributeDef::primary_key());
    debug!("Explicitly defined 'id' column for {}", model);

    for column in columns {
        let name = column.column_name.as_str();
        if name == "id" {
            continue;
        }
        let attr_type = match name {
            "created_at" | "updated_at" => AttributeType::Timestamp,
            _ => AttributeType::String,
        };
        debug!(
            "Found column '{}' for {}, inferred type: {}",
            name,
            model,
            attr_type.as_str()
        );
        attributes.insert(name.to_string(), AttributeDef::of(attr_type));
    }

    attributes
}
