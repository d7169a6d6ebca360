//! In-memory persistence layer.
//!
//! Tables are plain column lists plus rows keyed by id. Registered models
//! carry their hooks and validators, which run around every create,
//! update and destroy in a fixed order:
//!
//! - create: `beforeValidate`, validators, `afterValidate`, `beforeSave`,
//!   `beforeCreate`, (staged insert), `afterCreate`, `afterSave`, commit,
//!   `afterCreateCommit`
//! - update: the same with `Update` events
//! - destroy: `beforeDestroy`, (staged delete), `afterDestroy`, commit,
//!   `afterDestroyCommit`
//!
//! A failure before commit discards the staged write. A failing commit
//! hook is reported but the write stays.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ColumnInfo, ModelHandle, ModelRegistration, Persistence};
use crate::error::{AssociationError, PersistError, SchemaError};
use crate::model::definition::{Association, AssociationKind};
use crate::model::hooks::{HookSet, LifecycleEvent};
use crate::model::record::Record;
use crate::model::schema::AttributeSchema;
use crate::model::validation::{run_validators, ValidatorSet};

type Row = IndexMap<String, Value>;

const ASSOCIATION_OPTION_KEYS: [&str; 4] = ["through", "foreignKey", "as", "on"];

#[derive(Debug, Default)]
struct Table {
    columns: Vec<String>,
    rows: BTreeMap<i64, Row>,
    next_id: i64,
}

impl Table {
    fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    fn reserve_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Keep only values that have a column.
    fn project(&self, attributes: &IndexMap<String, Value>) -> Row {
        self.columns
            .iter()
            .filter_map(|c| attributes.get(c).map(|v| (c.clone(), v.clone())))
            .collect()
    }
}

#[derive(Debug)]
struct RegisteredModel {
    handle: ModelHandle,
    attributes: AttributeSchema,
    hooks: HookSet,
    validators: ValidatorSet,
}

impl RegisteredModel {
    fn run_hook(&self, event: LifecycleEvent, record: &mut Record) -> Result<(), PersistError> {
        if let Some(hook) = self.hooks.get(event.as_str()) {
            hook.invoke(record)?;
        }
        Ok(())
    }

    fn run_hooks(&self, events: &[LifecycleEvent], record: &mut Record) -> Result<(), PersistError> {
        for event in events {
            self.run_hook(*event, record)?;
        }
        Ok(())
    }

    fn validate(&self, record: &Record) -> Result<(), PersistError> {
        let errors = run_validators(&self.validators, record);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PersistError::Validation(errors))
        }
    }

    /// Incoming attributes restricted to known, user-settable columns.
    fn assignable(&self, attributes: Value) -> Row {
        let Value::Object(fields) = attributes else {
            return Row::new();
        };
        fields
            .into_iter()
            .filter(|(key, _)| {
                let known = self.attributes.contains_key(key) && key != "id";
                if !known {
                    debug!("Dropping attribute '{}' not present on {}", key, self.handle.name);
                }
                known
            })
            .collect()
    }
}

/// A connection between two registered models.
#[derive(Debug, Clone, PartialEq)]
pub struct WiredAssociation {
    pub name: String,
    pub kind: AssociationKind,
    pub target: ModelHandle,
    pub foreign_key: String,
    /// Name of the source association this one goes through.
    pub through: Option<String>,
}

/// Tables, registered models and their associations, all in process memory.
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    log_queries: bool,
    tables: RwLock<IndexMap<String, Table>>,
    models: RwLock<IndexMap<String, Arc<RegisteredModel>>>,
    associations: RwLock<IndexMap<String, Vec<WiredAssociation>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log_queries: false,
            tables: RwLock::new(IndexMap::new()),
            models: RwLock::new(IndexMap::new()),
            associations: RwLock::new(IndexMap::new()),
        }
    }

    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn log_query(&self, sql: &str) {
        if self.log_queries {
            debug!(database = %self.name, "SQL: {}", sql);
        }
    }

    // ---- tables -------------------------------------------------------

    /// Create (or replace) a table with the given columns.
    pub fn create_table(&self, table: &str, columns: &[&str]) {
        self.log_query(&format!("CREATE TABLE {} ({})", table, columns.join(", ")));
        let columns = columns.iter().map(|c| c.to_string()).collect();
        write(&self.tables).insert(table.to_string(), Table::new(columns));
    }

    pub fn drop_table(&self, table: &str) -> bool {
        self.log_query(&format!("DROP TABLE {}", table));
        write(&self.tables).shift_remove(table).is_some()
    }

    pub fn has_table(&self, table: &str) -> bool {
        read(&self.tables).contains_key(table)
    }

    /// Insert a row directly, bypassing models, hooks and validators.
    pub fn insert_raw(&self, table: &str, values: Value) -> Result<i64, PersistError> {
        let mut tables = write(&self.tables);
        let table_data = tables
            .get_mut(table)
            .ok_or_else(|| PersistError::MissingTable(table.to_string()))?;
        let fields = match values {
            Value::Object(fields) => fields.into_iter().collect(),
            _ => IndexMap::new(),
        };
        let id = table_data.reserve_id();
        let mut row = table_data.project(&fields);
        row.insert("id".to_string(), Value::from(id));
        table_data.rows.insert(id, row);
        Ok(id)
    }

    /// Remove every row of a table and restart ids.
    pub fn truncate(&self, table: &str) -> Result<(), PersistError> {
        let mut tables = write(&self.tables);
        let table_data = tables
            .get_mut(table)
            .ok_or_else(|| PersistError::MissingTable(table.to_string()))?;
        table_data.rows.clear();
        table_data.next_id = 1;
        Ok(())
    }

    // ---- models -------------------------------------------------------

    fn model(&self, name: &str) -> Result<Arc<RegisteredModel>, PersistError> {
        let models = read(&self.models);
        models
            .get(name)
            .or_else(|| {
                models.values().find(|m| {
                    m.handle.table_name == name || m.handle.name.eq_ignore_ascii_case(name)
                })
            })
            .cloned()
            .ok_or_else(|| PersistError::UnknownModel(name.to_string()))
    }

    pub fn model_names(&self) -> Vec<String> {
        read(&self.models).keys().cloned().collect()
    }

    /// Associations wired for a model, in wiring order.
    pub fn associations_of(&self, model: &str) -> Vec<WiredAssociation> {
        read(&self.associations)
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    fn load(&self, model: &RegisteredModel, id: i64) -> Result<Record, PersistError> {
        let tables = read(&self.tables);
        let table = tables
            .get(&model.handle.table_name)
            .ok_or_else(|| PersistError::MissingTable(model.handle.table_name.clone()))?;
        table
            .rows
            .get(&id)
            .map(|row| Record::loaded(&model.handle.name, row.clone()))
            .ok_or_else(|| PersistError::RecordNotFound {
                model: model.handle.name.clone(),
                id,
            })
    }

    /// Insert a new record, running validators and hooks.
    pub fn create(&self, model: &str, attributes: Value) -> Result<Record, PersistError> {
        let model = self.model(model)?;
        let mut record = Record::with_attributes(&model.handle.name, model.assignable(attributes));

        model.run_hook(LifecycleEvent::BeforeValidate, &mut record)?;
        model.validate(&record)?;
        model.run_hooks(
            &[
                LifecycleEvent::AfterValidate,
                LifecycleEvent::BeforeSave,
                LifecycleEvent::BeforeCreate,
            ],
            &mut record,
        )?;

        let id = {
            let mut tables = write(&self.tables);
            let table = tables
                .get_mut(&model.handle.table_name)
                .ok_or_else(|| PersistError::MissingTable(model.handle.table_name.clone()))?;
            table.reserve_id()
        };
        record.set("id", Value::from(id));
        let now = Value::from(chrono::Utc::now().to_rfc3339());
        for column in ["created_at", "updated_at"] {
            if model.attributes.contains_key(column) {
                record.set(column, now.clone());
            }
        }

        model.run_hooks(
            &[LifecycleEvent::AfterCreate, LifecycleEvent::AfterSave],
            &mut record,
        )?;

        self.commit_row(&model, id, &record, false)?;
        record.mark_persisted();
        debug!("Created {} with id {}", model.handle.name, id);

        model.run_hook(LifecycleEvent::AfterCreateCommit, &mut record)?;
        Ok(record)
    }

    /// Apply changes to an existing record, running validators and hooks.
    pub fn update(&self, model: &str, id: i64, changes: Value) -> Result<Record, PersistError> {
        let model = self.model(model)?;
        let mut record = self.load(&model, id)?;
        for (key, value) in model.assignable(changes) {
            record.set(key, value);
        }

        model.run_hook(LifecycleEvent::BeforeValidate, &mut record)?;
        model.validate(&record)?;
        model.run_hooks(
            &[
                LifecycleEvent::AfterValidate,
                LifecycleEvent::BeforeSave,
                LifecycleEvent::BeforeUpdate,
            ],
            &mut record,
        )?;

        if model.attributes.contains_key("updated_at") {
            record.set("updated_at", Value::from(chrono::Utc::now().to_rfc3339()));
        }
        model.run_hooks(
            &[LifecycleEvent::AfterUpdate, LifecycleEvent::AfterSave],
            &mut record,
        )?;

        record.set("id", Value::from(id));
        self.commit_row(&model, id, &record, true)?;
        model.run_hook(LifecycleEvent::AfterUpdateCommit, &mut record)?;
        Ok(record)
    }

    /// Delete a record, running destroy hooks. Returns the removed record.
    pub fn destroy(&self, model: &str, id: i64) -> Result<Record, PersistError> {
        let model = self.model(model)?;
        let mut record = self.load(&model, id)?;

        model.run_hooks(
            &[LifecycleEvent::BeforeDestroy, LifecycleEvent::AfterDestroy],
            &mut record,
        )?;

        {
            let mut tables = write(&self.tables);
            if let Some(table) = tables.get_mut(&model.handle.table_name) {
                table.rows.remove(&id);
            }
        }
        debug!("Destroyed {} with id {}", model.handle.name, id);

        model.run_hook(LifecycleEvent::AfterDestroyCommit, &mut record)?;
        Ok(record)
    }

    /// Write the staged row. With `must_exist`, a row removed since it was
    /// loaded is not brought back.
    fn commit_row(
        &self,
        model: &RegisteredModel,
        id: i64,
        record: &Record,
        must_exist: bool,
    ) -> Result<(), PersistError> {
        let mut tables = write(&self.tables);
        let table = tables
            .get_mut(&model.handle.table_name)
            .ok_or_else(|| PersistError::MissingTable(model.handle.table_name.clone()))?;
        if must_exist && !table.rows.contains_key(&id) {
            return Err(PersistError::RecordNotFound {
                model: model.handle.name.clone(),
                id,
            });
        }
        let row = table.project(record.attributes());
        table.rows.insert(id, row);
        Ok(())
    }

    // ---- queries ------------------------------------------------------

    pub fn find(&self, model: &str, id: i64) -> Result<Option<Record>, PersistError> {
        let model = self.model(model)?;
        match self.load(&model, id) {
            Ok(record) => Ok(Some(record)),
            Err(PersistError::RecordNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn all(&self, model: &str) -> Result<Vec<Record>, PersistError> {
        self.where_eq(model, Value::Null)
    }

    /// Records whose columns equal every given condition.
    pub fn where_eq(&self, model: &str, conditions: Value) -> Result<Vec<Record>, PersistError> {
        let model = self.model(model)?;
        let conditions = match conditions {
            Value::Object(fields) => fields,
            _ => serde_json::Map::new(),
        };
        self.log_query(&format!(
            "SELECT * FROM {} WHERE {}",
            model.handle.table_name,
            Value::Object(conditions.clone())
        ));

        let tables = read(&self.tables);
        let table = tables
            .get(&model.handle.table_name)
            .ok_or_else(|| PersistError::MissingTable(model.handle.table_name.clone()))?;

        Ok(table
            .rows
            .values()
            .filter(|row| {
                conditions
                    .iter()
                    .all(|(key, expected)| row.get(key).is_some_and(|v| loose_eq(v, expected)))
            })
            .map(|row| Record::loaded(&model.handle.name, row.clone()))
            .collect())
    }

    pub fn find_by(&self, model: &str, conditions: Value) -> Result<Option<Record>, PersistError> {
        Ok(self.where_eq(model, conditions)?.into_iter().next())
    }

    /// Follow an association from a record.
    pub fn related(
        &self,
        model: &str,
        record: &Record,
        association: &str,
    ) -> Result<Vec<Record>, PersistError> {
        let source = self.model(model)?;
        let wired = self
            .associations_of(&source.handle.name)
            .into_iter()
            .find(|a| a.name == association)
            .ok_or_else(|| PersistError::UnknownAssociation {
                model: source.handle.name.clone(),
                name: association.to_string(),
            })?;

        match (&wired.kind, &wired.through) {
            (AssociationKind::HasMany, Some(through)) => {
                let mut results = Vec::new();
                for intermediate in self.related(model, record, through)? {
                    let Some(id) = intermediate.id() else { continue };
                    results.extend(self.where_eq(
                        &wired.target.name,
                        serde_json::json!({ wired.foreign_key.clone(): id }),
                    )?);
                }
                Ok(results)
            }
            (AssociationKind::HasMany, None) => match record.id() {
                Some(id) => self.where_eq(
                    &wired.target.name,
                    serde_json::json!({ wired.foreign_key.clone(): id }),
                ),
                None => Ok(Vec::new()),
            },
            (AssociationKind::BelongsTo, _) => {
                let id = record.get(&wired.foreign_key).and_then(as_id);
                match id {
                    Some(id) => Ok(self.find(&wired.target.name, id)?.into_iter().collect()),
                    None => Ok(Vec::new()),
                }
            }
        }
    }
}

/// Equality that treats `1` and `"1"` as the same value.
fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim() == n.to_string()
        }
        _ => false,
    }
}

fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn foreign_key_for(model: &str) -> String {
    format!("{}_id", model.to_lowercase())
}

impl Persistence for MemoryDatabase {
    fn introspect_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, SchemaError> {
        self.log_query(&format!(
            "SELECT column_name FROM information_schema.columns WHERE table_name = '{}';",
            table
        ));
        Ok(read(&self.tables)
            .get(table)
            .map(|t| t.columns.iter().map(ColumnInfo::new).collect())
            .unwrap_or_default())
    }

    fn register_model(
        &self,
        model: &str,
        attributes: AttributeSchema,
        registration: ModelRegistration,
    ) -> Result<ModelHandle, SchemaError> {
        let mut models = write(&self.models);
        if models.contains_key(model) {
            return Err(SchemaError::AlreadyRegistered {
                model: model.to_string(),
            });
        }

        let handle = ModelHandle {
            name: model.to_string(),
            table_name: registration.table_name,
        };
        models.insert(
            model.to_string(),
            Arc::new(RegisteredModel {
                handle: handle.clone(),
                attributes,
                hooks: registration.hooks,
                validators: registration.validators,
            }),
        );
        info!("Registered model {} on table {}", handle.name, handle.table_name);
        Ok(handle)
    }

    fn resolve_model(&self, name: &str) -> Option<ModelHandle> {
        self.model(name).ok().map(|m| m.handle.clone())
    }

    fn establish_association(
        &self,
        source: &ModelHandle,
        association: &Association,
        target: &ModelHandle,
    ) -> Result<(), AssociationError> {
        let invalid =
            |reason: String| AssociationError::invalid_options(&source.name, &association.target_name, reason);

        for (key, value) in &association.options {
            if !ASSOCIATION_OPTION_KEYS.contains(&key.as_str()) {
                return Err(invalid(format!("unknown option '{}'", key)));
            }
            if !value.is_string() {
                return Err(invalid(format!("option '{}' must be a string", key)));
            }
        }

        let mut wired_by_model = write(&self.associations);
        let existing = wired_by_model.entry(source.name.clone()).or_default();
        let name = association.name().to_string();
        if existing.iter().any(|a| a.name == name) {
            return Err(invalid(format!("duplicate association name '{}'", name)));
        }

        let through = match association.through() {
            None => None,
            Some(_) if association.kind == AssociationKind::BelongsTo => {
                return Err(invalid("'through' is only valid on hasMany".to_string()));
            }
            Some(through) => {
                let via = existing
                    .iter()
                    .find(|a| a.name == through || a.target.name == through || a.target.table_name == through)
                    .ok_or_else(|| invalid(format!("'{}' is not an association of {}", through, source.name)))?;
                Some(via.clone())
            }
        };

        let foreign_key = match (association.options.get("foreignKey").and_then(Value::as_str), &through) {
            (Some(key), _) => key.to_string(),
            (None, Some(via)) => foreign_key_for(&via.target.name),
            (None, None) => match association.kind {
                AssociationKind::HasMany => foreign_key_for(&source.name),
                AssociationKind::BelongsTo => foreign_key_for(&target.name),
            },
        };

        let key_table = match association.kind {
            AssociationKind::HasMany => &target.table_name,
            AssociationKind::BelongsTo => &source.table_name,
        };
        let key_exists = read(&self.tables)
            .get(key_table)
            .is_some_and(|t| t.has_column(&foreign_key));
        if !key_exists {
            return Err(invalid(format!(
                "foreign key '{}' not found on table '{}'",
                foreign_key, key_table
            )));
        }

        if let Some(on) = association.options.get("on").and_then(Value::as_str) {
            warn!(
                "{} {} '{}': 'on: {}' has no effect on associations",
                source.name, association.kind, name, on
            );
        }

        existing.push(WiredAssociation {
            name,
            kind: association.kind,
            target: target.clone(),
            foreign_key,
            through: through.map(|via| via.name),
        });
        Ok(())
    }
}
