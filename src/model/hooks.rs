//! Lifecycle events and the hook invokers built from parsed callbacks.

use std::fmt;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, error};

use super::declaration::{ModelDeclaration, ModelMethod};
use super::record::Record;
use crate::error::HookError;

/// Points in a record's persistence lifecycle where hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    BeforeValidate,
    AfterValidate,
    BeforeSave,
    AfterSave,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDestroy,
    AfterDestroy,
    AfterCreateCommit,
    AfterUpdateCommit,
    AfterDestroyCommit,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 13] = [
        LifecycleEvent::BeforeValidate,
        LifecycleEvent::AfterValidate,
        LifecycleEvent::BeforeSave,
        LifecycleEvent::AfterSave,
        LifecycleEvent::BeforeCreate,
        LifecycleEvent::AfterCreate,
        LifecycleEvent::BeforeUpdate,
        LifecycleEvent::AfterUpdate,
        LifecycleEvent::BeforeDestroy,
        LifecycleEvent::AfterDestroy,
        LifecycleEvent::AfterCreateCommit,
        LifecycleEvent::AfterUpdateCommit,
        LifecycleEvent::AfterDestroyCommit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::BeforeValidate => "beforeValidate",
            LifecycleEvent::AfterValidate => "afterValidate",
            LifecycleEvent::BeforeSave => "beforeSave",
            LifecycleEvent::AfterSave => "afterSave",
            LifecycleEvent::BeforeCreate => "beforeCreate",
            LifecycleEvent::AfterCreate => "afterCreate",
            LifecycleEvent::BeforeUpdate => "beforeUpdate",
            LifecycleEvent::AfterUpdate => "afterUpdate",
            LifecycleEvent::BeforeDestroy => "beforeDestroy",
            LifecycleEvent::AfterDestroy => "afterDestroy",
            LifecycleEvent::AfterCreateCommit => "afterCreateCommit",
            LifecycleEvent::AfterUpdateCommit => "afterUpdateCommit",
            LifecycleEvent::AfterDestroyCommit => "afterDestroyCommit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|event| event.as_str() == name)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved callback: event, method name, and the callable it dispatches to.
#[derive(Clone)]
pub struct Hook {
    model: String,
    event: String,
    method_name: String,
    method: ModelMethod,
}

impl Hook {
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Run the bound method against a record. Failures propagate to the caller.
    pub fn invoke(&self, record: &mut Record) -> Result<(), HookError> {
        let started = Instant::now();
        match (self.method)(record) {
            Ok(()) => {
                debug!(
                    model = %self.model,
                    event = %self.event,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Executed {} hook for {}",
                    self.event,
                    self.model
                );
                Ok(())
            }
            Err(message) => {
                error!(
                    "Error in {} hook for {}: {}",
                    self.event, self.model, message
                );
                Err(HookError::Failed {
                    model: self.model.clone(),
                    event: self.event.clone(),
                    method: self.method_name.clone(),
                    message,
                })
            }
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("model", &self.model)
            .field("event", &self.event)
            .field("method_name", &self.method_name)
            .finish()
    }
}

/// Event name to hook.
pub type HookSet = IndexMap<String, Hook>;

/// Resolve every `event -> method` binding to a callable on the declaration.
///
/// Unknown method names fail here, at registration, rather than on first dispatch.
pub fn build_hooks(
    declaration: &ModelDeclaration,
    callbacks: &IndexMap<String, String>,
) -> Result<HookSet, HookError> {
    let model = declaration.name();
    let mut hooks = HookSet::new();

    for (event, method_name) in callbacks {
        let method =
            declaration
                .lookup_method(method_name)
                .ok_or_else(|| HookError::UnknownMethod {
                    model: model.to_string(),
                    event: event.clone(),
                    method: method_name.clone(),
                })?;

        debug!("Registering {} hook for {}.{}", event, model, method_name);
        hooks.insert(
            event.clone(),
            Hook {
                model: model.to_string(),
                event: event.clone(),
                method_name: method_name.clone(),
                method,
            },
        );
    }

    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn callbacks(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(e, m)| (e.to_string(), m.to_string()))
            .collect()
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in LifecycleEvent::ALL {
            assert_eq!(LifecycleEvent::from_name(event.as_str()), Some(event));
        }
        assert_eq!(LifecycleEvent::from_name("afterCommit"), None);
    }

    #[test]
    fn test_hook_invokes_bound_method() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let decl = ModelDeclaration::new("User").method("notify_user", move |record| {
            counter.fetch_add(1, Ordering::SeqCst);
            record.set("notified", json!(true));
            Ok(())
        });

        let hooks = build_hooks(&decl, &callbacks(&[("afterCreateCommit", "notify_user")])).unwrap();
        let hook = &hooks["afterCreateCommit"];
        assert_eq!(hook.method_name(), "notify_user");

        let mut record = Record::new("User");
        hook.invoke(&mut record).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(record.get("notified"), Some(&json!(true)));
    }

    #[test]
    fn test_unknown_method_fails_at_build_time() {
        let decl = ModelDeclaration::new("User");
        let err = build_hooks(&decl, &callbacks(&[("afterCreate", "missing")])).unwrap_err();
        assert_eq!(
            err,
            HookError::UnknownMethod {
                model: "User".into(),
                event: "afterCreate".into(),
                method: "missing".into(),
            }
        );
    }

    #[test]
    fn test_hook_failure_propagates() {
        let decl = ModelDeclaration::new("User").method("explode", |_| Err("boom".to_string()));
        let hooks = build_hooks(&decl, &callbacks(&[("beforeSave", "explode")])).unwrap();

        let err = hooks["beforeSave"].invoke(&mut Record::new("User")).unwrap_err();
        match err {
            HookError::Failed { method, message, .. } => {
                assert_eq!(method, "explode");
                assert_eq!(message, "boom");
            }
            other => panic!("expected hook failure, got {other:?}"),
        }
    }
}
