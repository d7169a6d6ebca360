//! Model instances.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// A single row of a model, keyed by column name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(skip)]
    model: String,
    #[serde(flatten)]
    attributes: IndexMap<String, Value>,
    #[serde(skip)]
    persisted: bool,
}

impl Record {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            attributes: IndexMap::new(),
            persisted: false,
        }
    }

    pub fn with_attributes(model: impl Into<String>, attributes: IndexMap<String, Value>) -> Self {
        Self {
            model: model.into(),
            attributes,
            persisted: false,
        }
    }

    pub(crate) fn loaded(model: impl Into<String>, attributes: IndexMap<String, Value>) -> Self {
        Self {
            model: model.into(),
            attributes,
            persisted: true,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn id(&self) -> Option<i64> {
        self.attributes.get("id").and_then(Value::as_i64)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// String value of a field, if it holds one.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(Value::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.attributes.insert(field.into(), value);
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_accessors() {
        let mut record = Record::new("User");
        assert_eq!(record.id(), None);
        record.set("id", json!(7));
        record.set("name", json!("JoeSmith"));
        assert_eq!(record.id(), Some(7));
        assert_eq!(record.get_str("name"), Some("JoeSmith"));
        assert!(!record.is_persisted());
        assert_eq!(record.to_json(), json!({ "id": 7, "name": "JoeSmith" }));
    }

    #[test]
    fn test_serializes_attributes_only() {
        let mut record = Record::new("User");
        record.set("name", json!("Ann"));
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({ "name": "Ann" }));
    }
}
