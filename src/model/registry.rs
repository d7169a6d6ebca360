//! Metadata registry: model name to parsed definition.
//!
//! Filled once during the parse pass and only read afterwards, so it is a
//! plain owned map rather than a locked global.

use indexmap::IndexMap;

use super::definition::ModelDefinition;

#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    definitions: IndexMap<String, ModelDefinition>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition unless one is already present. Returns whether it was inserted.
    pub fn insert(&mut self, model: &str, definition: ModelDefinition) -> bool {
        if self.definitions.contains_key(model) {
            return false;
        }
        self.definitions.insert(model.to_string(), definition);
        true
    }

    pub fn get(&self, model: &str) -> Option<&ModelDefinition> {
        self.definitions.get(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.definitions.contains_key(model)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelDefinition)> {
        self.definitions.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_never_replaced() {
        let mut registry = MetadataRegistry::new();
        let mut first = ModelDefinition::default();
        first.callbacks.insert("afterCreate".into(), "a".into());

        assert!(registry.insert("User", first.clone()));
        assert!(!registry.insert("User", ModelDefinition::default()));
        assert_eq!(registry.get("User"), Some(&first));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.model_names().collect::<Vec<_>>(), vec!["User"]);
    }
}
