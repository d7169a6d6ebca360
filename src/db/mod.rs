//! Persistence layer interface consumed by the model bootstrap.
//!
//! The bootstrap only needs four things from storage: the columns of a
//! table, a way to register a model with its attributes, hooks and
//! validators, a lookup for registered models, and a way to connect two
//! registered models. [`MemoryDatabase`] is the bundled implementation.

pub mod memory;

use serde::Serialize;

use crate::error::{AssociationError, SchemaError};
use crate::model::definition::Association;
use crate::model::hooks::HookSet;
use crate::model::schema::AttributeSchema;
use crate::model::validation::ValidatorSet;

pub use memory::MemoryDatabase;

/// One row of column metadata, as `information_schema.columns` reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub column_name: String,
}

impl ColumnInfo {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
        }
    }
}

/// A model known to the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelHandle {
    pub name: String,
    pub table_name: String,
}

/// Everything the persistence layer needs to manage a model.
#[derive(Debug, Clone)]
pub struct ModelRegistration {
    pub table_name: String,
    pub hooks: HookSet,
    pub validators: ValidatorSet,
}

pub trait Persistence {
    /// Column names of a table. A missing table yields no columns.
    fn introspect_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, SchemaError>;

    fn register_model(
        &self,
        model: &str,
        attributes: AttributeSchema,
        registration: ModelRegistration,
    ) -> Result<ModelHandle, SchemaError>;

    /// Look up a registered model by model name, falling back to table name
    /// and then to a case-insensitive name match.
    fn resolve_model(&self, name: &str) -> Option<ModelHandle>;

    fn establish_association(
        &self,
        source: &ModelHandle,
        association: &Association,
        target: &ModelHandle,
    ) -> Result<(), AssociationError>;
}
