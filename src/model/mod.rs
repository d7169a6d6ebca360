//! ORM model layer: declarations, the metadata pipeline, and the four-pass bootstrap.
//!
//! A model is authored as a [`ModelDeclaration`]. At startup the
//! [`BootstrapContext`] parses every declaration into the
//! [`MetadataRegistry`], initializes each model against the live schema,
//! then wires associations once every model is registered.

pub mod associations;
pub mod bootstrap;
pub mod declaration;
pub mod definition;
pub mod hooks;
pub mod initializer;
pub mod parser;
pub mod record;
pub mod registry;
pub mod schema;
pub mod validation;

#[cfg(test)]
mod tests;

pub use associations::setup_associations;
pub use bootstrap::{BootedModels, BootstrapContext, ModelCatalog, ModelLoader};
pub use declaration::{AssociationDecl, CallbackDecl, ModelDeclaration, ModelMethod, Options};
pub use definition::{Association, AssociationKind, FieldRules, LengthRule, ModelDefinition};
pub use hooks::{build_hooks, Hook, HookSet, LifecycleEvent};
pub use initializer::init_model;
pub use parser::{parse_definitions, ParseMode};
pub use record::Record;
pub use registry::MetadataRegistry;
pub use schema::{synthesize_attributes, table_name_for, AttributeDef, AttributeSchema, AttributeType};
pub use validation::{build_validators, run_validators, Validator, ValidatorSet};

/// Per-model progress through the bootstrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelState {
    pub definition_parsed: bool,
    pub schema_loaded: bool,
}
