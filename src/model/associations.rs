//! Association Wirer: connects a model to the targets it declared.

use tracing::{debug, error};

use super::definition::Association;
use super::registry::MetadataRegistry;
use super::schema::table_name_for;
use crate::db::Persistence;
use crate::error::{AssociationError, BootstrapError, SchemaError};

/// Wire every association of `model`, in declaration order.
///
/// Both ends must already be registered with the persistence layer, so
/// this only runs once every model has been initialized.
pub fn setup_associations<P: Persistence>(
    model: &str,
    registry: &MetadataRegistry,
    persistence: &P,
) -> Result<usize, BootstrapError> {
    let definition = registry
        .get(model)
        .ok_or_else(|| SchemaError::DefinitionMissing {
            model: model.to_string(),
        })?;

    let source = persistence
        .resolve_model(model)
        .ok_or_else(|| AssociationError::SourceNotInitialized {
            model: model.to_string(),
        })?;

    for association in &definition.associations {
        let target = match persistence.resolve_model(&association.target_name) {
            Some(target) => target,
            None => return Err(unresolved(model, association, registry).into()),
        };

        debug!(
            "Wiring {} {} {} ({})",
            model, association.kind, association.target_name, target.name
        );
        if let Err(err) = persistence.establish_association(&source, association, &target) {
            error!("Error wiring associations for {}: {}", model, err);
            return Err(err.into());
        }
    }

    Ok(definition.associations.len())
}

/// Tell apart a target that exists but is not registered yet from one that does not exist.
fn unresolved(model: &str, association: &Association, registry: &MetadataRegistry) -> AssociationError {
    let target = association.target_name.as_str();
    let known = registry.model_names().any(|name| {
        name.eq_ignore_ascii_case(target) || table_name_for(name) == target
    });

    let kind = association.kind.to_string();
    let err = if known {
        AssociationError::TargetNotInitialized {
            model: model.to_string(),
            kind,
            target: target.to_string(),
        }
    } else {
        AssociationError::UnknownTarget {
            model: model.to_string(),
            kind,
            target: target.to_string(),
        }
    };
    error!("{}", err);
    err
}
