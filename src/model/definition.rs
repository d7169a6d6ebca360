//! Normalized model definitions, the shape stored in the metadata registry.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use super::declaration::Options;

/// Kind of relationship between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssociationKind {
    HasMany,
    BelongsTo,
}

impl AssociationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationKind::HasMany => "hasMany",
            AssociationKind::BelongsTo => "belongsTo",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized association entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Association {
    pub kind: AssociationKind,
    pub target_name: String,
    pub options: Options,
}

impl Association {
    pub fn new(kind: AssociationKind, target_name: impl Into<String>, options: Options) -> Self {
        Self {
            kind,
            target_name: target_name.into(),
            options,
        }
    }

    /// Name the association is reachable by: the `as` option or the declared target.
    pub fn name(&self) -> &str {
        self.options
            .get("as")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.target_name)
    }

    pub fn through(&self) -> Option<&str> {
        self.options.get("through").and_then(|v| v.as_str())
    }
}

/// Required value length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LengthRule {
    /// Inclusive on both ends.
    Range(usize, usize),
    Exact(usize),
}

impl LengthRule {
    pub fn accepts(&self, length: usize) -> bool {
        match *self {
            LengthRule::Range(min, max) => length >= min && length <= max,
            LengthRule::Exact(n) => length == n,
        }
    }
}

/// Parsed rules for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldRules {
    pub presence_required: bool,
    pub length_range: Option<LengthRule>,
}

impl FieldRules {
    pub fn is_empty(&self) -> bool {
        !self.presence_required && self.length_range.is_none()
    }
}

/// Everything parsed off a model declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelDefinition {
    pub associations: Vec<Association>,
    pub validations: IndexMap<String, FieldRules>,
    /// Resolved event name to method name.
    pub callbacks: IndexMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_length_rule_bounds_are_inclusive() {
        let rule = LengthRule::Range(5, 10);
        assert!(!rule.accepts(4));
        assert!(rule.accepts(5));
        assert!(rule.accepts(10));
        assert!(!rule.accepts(11));
        assert!(LengthRule::Exact(3).accepts(3));
        assert!(!LengthRule::Exact(3).accepts(4));
    }

    #[test]
    fn test_association_name_prefers_alias() {
        let mut options = Options::new();
        options.insert("as".into(), json!("authored"));
        let assoc = Association::new(AssociationKind::HasMany, "posts", options);
        assert_eq!(assoc.name(), "authored");
        assert_eq!(
            Association::new(AssociationKind::BelongsTo, "user", Options::new()).name(),
            "user"
        );
    }
}
