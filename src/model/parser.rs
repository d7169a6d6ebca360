//! Definition parser: normalizes a [`ModelDeclaration`] into a [`ModelDefinition`].
//!
//! Parsing is idempotent per model. In lenient mode malformed shapes are
//! skipped with a warning; strict mode turns them into [`ParseError`]s.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::declaration::{AssociationDecl, CallbackDecl, ModelDeclaration, Options};
use super::definition::{Association, AssociationKind, FieldRules, LengthRule, ModelDefinition};
use super::hooks::LifecycleEvent;
use super::registry::MetadataRegistry;
use super::ModelState;
use crate::error::ParseError;

/// How malformed declarations are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Skip what cannot be understood.
    #[default]
    Lenient,
    /// Reject unrecognized keys and unparsable values.
    Strict,
}

const VALIDATION_KEYS: [&str; 3] = ["presence", "in", "length"];
const LENGTH_KEYS: [&str; 1] = ["in"];
const CALLBACK_OPTION_KEYS: [&str; 1] = ["on"];
const COMMIT_EVENTS: [&str; 3] = ["create", "update", "destroy"];

/// Parse a model's declarations into the registry.
///
/// Returns `Ok(false)` when the model was already parsed, either by flag or
/// because the registry already holds its name.
pub fn parse_definitions(
    declaration: &ModelDeclaration,
    state: &mut ModelState,
    registry: &mut MetadataRegistry,
    mode: ParseMode,
) -> Result<bool, ParseError> {
    if state.definition_parsed {
        return Ok(false);
    }

    let model = declaration.name();
    if registry.contains(model) {
        state.definition_parsed = true;
        return Ok(false);
    }

    debug!("Parsing definitions for {}...", model);
    let parser = DefinitionParser { model, mode };

    let definition = ModelDefinition {
        associations: parser.associations(declaration)?,
        validations: parser.validations(declaration)?,
        callbacks: parser.callbacks(declaration)?,
    };

    registry.insert(model, definition);
    state.definition_parsed = true;
    info!("Definitions parsed and stored for {}", model);
    Ok(true)
}

struct DefinitionParser<'a> {
    model: &'a str,
    mode: ParseMode,
}

impl DefinitionParser<'_> {
    fn strict(&self) -> bool {
        self.mode == ParseMode::Strict
    }

    /// Report a problem: an error in strict mode, a warning otherwise.
    fn reject(&self, err: ParseError) -> Result<(), ParseError> {
        if self.strict() {
            return Err(err);
        }
        warn!("Ignoring malformed declaration: {}", err);
        Ok(())
    }

    fn check_keys(&self, options: &Options, allowed: &[&str], context: &str) -> Result<(), ParseError> {
        for key in options.keys() {
            if !allowed.contains(&key.as_str()) {
                self.reject(ParseError::unrecognized_key(self.model, context, key))?;
            }
        }
        Ok(())
    }

    fn associations(&self, declaration: &ModelDeclaration) -> Result<Vec<Association>, ParseError> {
        let decls = declaration.association_decls();
        let mut associations = Vec::with_capacity(decls.len());

        for (kind, decl) in decls {
            if let Some(association) = self.association(*kind, decl)? {
                associations.push(association);
            }
        }
        if !decls.is_empty() {
            debug!("Parsed {} associations for {}", decls.len(), self.model);
        }

        Ok(associations)
    }

    fn association(
        &self,
        kind: AssociationKind,
        decl: &AssociationDecl,
    ) -> Result<Option<Association>, ParseError> {
        let (target, options) = decl.resolve();
        let context = format!("{} '{}'", kind, target);

        if target.trim().is_empty() {
            self.reject(ParseError::invalid_value(self.model, kind.as_str(), "empty target name"))?;
            return Ok(None);
        }

        let options = match options {
            Value::Object(map) => map,
            Value::Null => Options::new(),
            other => {
                self.reject(ParseError::invalid_value(
                    self.model,
                    context,
                    format!("options must be an object, got {}", other),
                ))?;
                Options::new()
            }
        };

        Ok(Some(Association::new(kind, target, options)))
    }

    fn validations(
        &self,
        declaration: &ModelDeclaration,
    ) -> Result<indexmap::IndexMap<String, FieldRules>, ParseError> {
        let mut validations = indexmap::IndexMap::new();

        for (field, options) in &declaration.validations {
            let context = format!("validation for '{}'", field);
            let rules = match options {
                Value::Object(options) => self.field_rules(field, options, &context)?,
                other => {
                    self.reject(ParseError::invalid_value(
                        self.model,
                        &context,
                        format!("rule options must be an object, got {}", other),
                    ))?;
                    FieldRules::default()
                }
            };
            validations.insert(field.clone(), rules);
        }

        if !validations.is_empty() {
            debug!("Parsed validate for {}", self.model);
        }
        Ok(validations)
    }

    fn field_rules(&self, field: &str, options: &Options, context: &str) -> Result<FieldRules, ParseError> {
        self.check_keys(options, &VALIDATION_KEYS, context)?;
        let mut rules = FieldRules::default();

        match options.get("presence") {
            Some(Value::Bool(required)) => rules.presence_required = *required,
            Some(other) => self.reject(ParseError::invalid_value(
                self.model,
                context,
                format!("presence must be a boolean, got {}", other),
            ))?,
            None => {}
        }

        // A direct `in` wins over `length`.
        let range = match (options.get("in"), options.get("length")) {
            (Some(direct), _) => Some(direct),
            (None, Some(Value::Object(length))) => {
                self.check_keys(length, &LENGTH_KEYS, &format!("length of '{}'", field))?;
                length.get("in")
            }
            (None, Some(direct)) => Some(direct),
            (None, None) => None,
        };

        if let Some(range) = range {
            match parse_length(range) {
                Some(rule) => rules.length_range = Some(rule),
                None => self.reject(ParseError::InvalidRange {
                    model: self.model.to_string(),
                    field: field.to_string(),
                    value: range.to_string(),
                })?,
            }
        }

        Ok(rules)
    }

    fn callbacks(
        &self,
        declaration: &ModelDeclaration,
    ) -> Result<indexmap::IndexMap<String, String>, ParseError> {
        let mut callbacks = indexmap::IndexMap::new();

        for (hook, bindings) in &declaration.callbacks {
            let is_commit = hook == "afterCommit";
            if !is_commit && LifecycleEvent::from_name(hook).is_none() {
                self.reject(ParseError::UnknownHook {
                    model: self.model.to_string(),
                    hook: hook.clone(),
                })?;
            }

            for binding in bindings {
                let options = self.callback_options(hook, binding)?;
                let event = if is_commit {
                    format!("after{}Commit", capitalize(&self.commit_event(hook, &options)?))
                } else {
                    hook.clone()
                };
                callbacks.insert(event, binding.method_name().to_string());
            }
        }

        if !callbacks.is_empty() {
            debug!("Parsed callbacks for {}", self.model);
        }
        Ok(callbacks)
    }

    fn callback_options(&self, hook: &str, binding: &CallbackDecl) -> Result<Options, ParseError> {
        let context = format!("{} binding '{}'", hook, binding.method_name());
        let options = match binding {
            CallbackDecl::Method(_) => return Ok(Options::new()),
            CallbackDecl::WithOptions(_, Value::Object(options)) => options.clone(),
            CallbackDecl::WithOptions(_, Value::Null) => Options::new(),
            CallbackDecl::WithOptions(_, other) => {
                self.reject(ParseError::invalid_value(
                    self.model,
                    &context,
                    format!("options must be an object, got {}", other),
                ))?;
                Options::new()
            }
        };
        self.check_keys(&options, &CALLBACK_OPTION_KEYS, &context)?;
        Ok(options)
    }

    /// The `on` qualifier of an `afterCommit` binding, defaulting to `create`.
    fn commit_event(&self, hook: &str, options: &Options) -> Result<String, ParseError> {
        match options.get("on") {
            None => Ok("create".to_string()),
            Some(Value::String(on)) => {
                if self.strict() && !COMMIT_EVENTS.contains(&on.as_str()) {
                    return Err(ParseError::invalid_value(
                        self.model,
                        hook,
                        format!("'on' must be one of create, update, destroy; got '{}'", on),
                    ));
                }
                Ok(on.clone())
            }
            Some(other) => {
                self.reject(ParseError::invalid_value(
                    self.model,
                    hook,
                    format!("'on' must be a string, got {}", other),
                ))?;
                Ok("create".to_string())
            }
        }
    }
}

/// Parse `"min..max"` into a range, or a bare integer into an exact length.
pub fn parse_length(value: &Value) -> Option<LengthRule> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    match text.split_once("..") {
        Some((min, max)) => {
            let min = min.trim().parse::<usize>().ok()?;
            let max = max.trim().parse::<usize>().ok()?;
            (min <= max).then_some(LengthRule::Range(min, max))
        }
        None => text.parse::<usize>().ok().map(LengthRule::Exact),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
