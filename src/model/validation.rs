//! Field validators built from parsed rules.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use super::definition::{FieldRules, LengthRule};
use super::record::Record;
use crate::error::ValidationError;

type Check = Arc<dyn Fn(&Record) -> Result<(), ValidationError> + Send + Sync>;

/// Checker for a single field.
#[derive(Clone)]
pub struct Validator {
    field: String,
    check: Check,
}

impl Validator {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn check(&self, record: &Record) -> Result<(), ValidationError> {
        (self.check)(record)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("field", &self.field).finish()
    }
}

/// Field name to validator.
pub type ValidatorSet = IndexMap<String, Validator>;

/// Build one checker per field. Each checker captures a copy of its rules.
pub fn build_validators(model: &str, validations: &IndexMap<String, FieldRules>) -> ValidatorSet {
    let mut validators = ValidatorSet::new();

    for (field, rules) in validations {
        debug!("Building validator for {}.{}", model, field);
        let name = field.clone();
        let rules = rules.clone();
        let check: Check = Arc::new(move |record: &Record| check_field(&name, &rules, record));
        validators.insert(
            field.clone(),
            Validator {
                field: field.clone(),
                check,
            },
        );
    }

    validators
}

/// Run every field's checker. A field stops at its first failure; other fields still run.
pub fn run_validators(validators: &ValidatorSet, record: &Record) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for validator in validators.values() {
        if let Err(err) = validator.check(record) {
            warn!("Validation failed for {}: {}", validator.field(), err.message);
            errors.push(err);
        }
    }
    errors
}

fn check_field(field: &str, rules: &FieldRules, record: &Record) -> Result<(), ValidationError> {
    let value = record.get(field);

    if rules.presence_required && is_blank(value) {
        return Err(ValidationError::blank(field));
    }

    if let (Some(rule), Some(length)) = (rules.length_range, value.and_then(value_length)) {
        if !rule.accepts(length) {
            return Err(match rule {
                LengthRule::Range(min, max) => ValidationError::length_range(field, min, max),
                LengthRule::Exact(n) => ValidationError::length_exact(field, n),
            });
        }
    }

    Ok(())
}

/// Absent, null, false, zero, or the empty string.
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    }
}

/// Length used by length rules. Null has none, so the rule is skipped.
fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        other => Some(other.to_string().chars().count()),
    }
}
