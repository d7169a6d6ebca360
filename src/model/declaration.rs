//! Declarative authoring surface for models.
//!
//! A model describes itself once through a [`ModelDeclaration`]: its
//! associations, validation rules, lifecycle callbacks, and the methods
//! those callbacks may invoke.
//!
//! ```
//! use railyard::model::{CallbackDecl, ModelDeclaration};
//! use serde_json::json;
//!
//! let user = ModelDeclaration::new("User")
//!     .has_many("posts")
//!     .has_many_with(|| ("comments", json!({ "through": "posts" })))
//!     .validate("name", json!({ "presence": true, "length": { "in": "5..10" } }))
//!     .after_commit(CallbackDecl::with_options("notify_user", json!({ "on": "create" })))
//!     .method("notify_user", |_record| Ok(()));
//! assert_eq!(user.name(), "User");
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::definition::AssociationKind;
use super::record::Record;

/// Free-form option mapping attached to associations, rules and callbacks.
pub type Options = Map<String, Value>;

/// A callable a lifecycle hook may dispatch to.
pub type ModelMethod = Arc<dyn Fn(&mut Record) -> Result<(), String> + Send + Sync>;

/// Thunk producing `(target, options)` for an association.
pub type AssociationThunk = Arc<dyn Fn() -> (String, Value) + Send + Sync>;

/// One entry of a `has_many` / `belongs_to` list.
#[derive(Clone)]
pub enum AssociationDecl {
    /// Plain target name, no options.
    Target(String),
    /// Deferred form, evaluated when definitions are parsed.
    Deferred(AssociationThunk),
}

impl AssociationDecl {
    /// Evaluate into `(target, options)`. Non-object options come back as-is.
    pub fn resolve(&self) -> (String, Value) {
        match self {
            AssociationDecl::Target(target) => (target.clone(), Value::Object(Map::new())),
            AssociationDecl::Deferred(thunk) => thunk(),
        }
    }
}

impl fmt::Debug for AssociationDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationDecl::Target(target) => f.debug_tuple("Target").field(target).finish(),
            AssociationDecl::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// One binding in a callback list.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackDecl {
    Method(String),
    WithOptions(String, Value),
}

impl CallbackDecl {
    pub fn method(name: impl Into<String>) -> Self {
        CallbackDecl::Method(name.into())
    }

    pub fn with_options(name: impl Into<String>, options: Value) -> Self {
        CallbackDecl::WithOptions(name.into(), options)
    }

    pub fn method_name(&self) -> &str {
        match self {
            CallbackDecl::Method(name) | CallbackDecl::WithOptions(name, _) => name,
        }
    }
}

/// Everything a model class declares about itself.
#[derive(Clone)]
pub struct ModelDeclaration {
    name: String,
    pub(crate) associations: Vec<(AssociationKind, AssociationDecl)>,
    pub(crate) validations: IndexMap<String, Value>,
    pub(crate) callbacks: IndexMap<String, Vec<CallbackDecl>>,
    pub(crate) methods: IndexMap<String, ModelMethod>,
}

impl ModelDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            associations: Vec::new(),
            validations: IndexMap::new(),
            callbacks: IndexMap::new(),
            methods: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_many(mut self, target: impl Into<String>) -> Self {
        self.associations.push((AssociationKind::HasMany, AssociationDecl::Target(target.into())));
        self
    }

    pub fn has_many_with<F, S>(mut self, thunk: F) -> Self
    where
        F: Fn() -> (S, Value) + Send + Sync + 'static,
        S: Into<String>,
    {
        self.associations.push((AssociationKind::HasMany, deferred(thunk)));
        self
    }

    pub fn belongs_to(mut self, target: impl Into<String>) -> Self {
        self.associations.push((AssociationKind::BelongsTo, AssociationDecl::Target(target.into())));
        self
    }

    pub fn belongs_to_with<F, S>(mut self, thunk: F) -> Self
    where
        F: Fn() -> (S, Value) + Send + Sync + 'static,
        S: Into<String>,
    {
        self.associations.push((AssociationKind::BelongsTo, deferred(thunk)));
        self
    }

    /// Attach rule options to a field. A second call for the same field replaces the first.
    pub fn validate(mut self, field: impl Into<String>, options: Value) -> Self {
        self.validations.insert(field.into(), options);
        self
    }

    /// Bind a method to a hook name (`beforeCreate`, `afterSave`, ...).
    pub fn callback(mut self, hook: impl Into<String>, binding: CallbackDecl) -> Self {
        self.callbacks.entry(hook.into()).or_default().push(binding);
        self
    }

    pub fn after_commit(self, binding: CallbackDecl) -> Self {
        self.callback("afterCommit", binding)
    }

    /// Register a method callbacks can refer to by name.
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&mut Record) -> Result<(), String> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Associations of both kinds, in the order they were declared.
    pub fn association_decls(&self) -> &[(AssociationKind, AssociationDecl)] {
        &self.associations
    }

    pub fn lookup_method(&self, name: &str) -> Option<ModelMethod> {
        self.methods.get(name).cloned()
    }
}

impl fmt::Debug for ModelDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDeclaration")
            .field("name", &self.name)
            .field("associations", &self.associations)
            .field("validations", &self.validations)
            .field("callbacks", &self.callbacks)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn deferred<F, S>(thunk: F) -> AssociationDecl
where
    F: Fn() -> (S, Value) + Send + Sync + 'static,
    S: Into<String>,
{
    AssociationDecl::Deferred(Arc::new(move || {
        let (target, options) = thunk();
        (target.into(), options)
    }))
}
