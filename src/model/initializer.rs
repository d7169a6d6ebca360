//! Model Initializer: binds a parsed definition to its live table.

use tracing::{debug, error, info, warn};

use super::declaration::ModelDeclaration;
use super::hooks::build_hooks;
use super::parser::{parse_definitions, ParseMode};
use super::registry::MetadataRegistry;
use super::schema::{synthesize_attributes, table_name_for};
use super::validation::build_validators;
use super::ModelState;
use crate::db::{ModelHandle, ModelRegistration, Persistence};
use crate::error::{BootstrapError, SchemaError};

/// Initialize one model against the persistence layer.
///
/// Returns `Ok(None)` when the schema was already loaded. A model that was
/// never parsed is parsed first. Nothing is marked loaded unless every
/// step succeeds.
pub fn init_model<P: Persistence>(
    declaration: &ModelDeclaration,
    state: &mut ModelState,
    registry: &mut MetadataRegistry,
    persistence: &P,
    mode: ParseMode,
) -> Result<Option<ModelHandle>, BootstrapError> {
    if state.schema_loaded {
        return Ok(None);
    }

    let model = declaration.name();
    if !state.definition_parsed {
        warn!("Definitions for {} were not parsed before init; parsing now", model);
        parse_definitions(declaration, state, registry, mode)?;
    }

    match register(declaration, registry, persistence) {
        Ok(handle) => {
            state.schema_loaded = true;
            info!("Model {} initialized on table {}", model, handle.table_name);
            Ok(Some(handle))
        }
        Err(err) => {
            error!("Error initializing model {}: {}", model, err);
            Err(err)
        }
    }
}

fn register<P: Persistence>(
    declaration: &ModelDeclaration,
    registry: &MetadataRegistry,
    persistence: &P,
) -> Result<ModelHandle, BootstrapError> {
    let model = declaration.name();
    let definition = registry
        .get(model)
        .ok_or_else(|| SchemaError::DefinitionMissing {
            model: model.to_string(),
        })?;

    let table_name = table_name_for(model);
    debug!("Initializing model: {} with table: {}", model, table_name);

    let columns = persistence.introspect_columns(&table_name)?;
    if columns.is_empty() {
        return Err(SchemaError::MissingTable { table: table_name }.into());
    }

    let attributes = synthesize_attributes(model, &columns);
    let hooks = build_hooks(declaration, &definition.callbacks)?;
    let validators = build_validators(model, &definition.validations);
    debug!(
        "Built {} hooks and {} validators for {}",
        hooks.len(),
        validators.len(),
        model
    );

    let handle = persistence.register_model(
        model,
        attributes,
        ModelRegistration {
            table_name,
            hooks,
            validators,
        },
    )?;
    Ok(handle)
}
