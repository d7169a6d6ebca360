//! Error types for every stage: discovery, parsing, schema loading,
//! association wiring, and request-time persistence.

use thiserror::Error;

/// Malformed declarative metadata. Only raised in strict parse mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{model}: unrecognized key '{key}' in {context}")]
    UnrecognizedKey {
        model: String,
        context: String,
        key: String,
    },

    #[error("{model}: invalid length range '{value}' for field '{field}'")]
    InvalidRange {
        model: String,
        field: String,
        value: String,
    },

    #[error("{model}: invalid value in {context}: {reason}")]
    InvalidValue {
        model: String,
        context: String,
        reason: String,
    },

    #[error("{model}: unknown lifecycle hook '{hook}'")]
    UnknownHook { model: String, hook: String },
}

impl ParseError {
    pub fn unrecognized_key(
        model: impl Into<String>,
        context: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::UnrecognizedKey {
            model: model.into(),
            context: context.into(),
            key: key.into(),
        }
    }

    pub fn invalid_value(
        model: impl Into<String>,
        context: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            model: model.into(),
            context: context.into(),
            reason: reason.into(),
        }
    }
}

/// Failure while collecting model declarations (the import pass).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("failed to load model from '{source_name}': {reason}")]
    Load { source_name: String, reason: String },

    #[error("'{source_name}' does not declare a valid model name: '{name}'")]
    InvalidName { source_name: String, name: String },

    #[error("model '{name}' is declared more than once")]
    Duplicate { name: String },
}

/// Table missing, empty, or otherwise unusable at introspection time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Table '{table}' does not exist or has no columns. Did you run migrations?")]
    MissingTable { table: String },

    #[error("schema introspection failed for '{table}': {reason}")]
    Introspection { table: String, reason: String },

    #[error("model definition for '{model}' not found in registry")]
    DefinitionMissing { model: String },

    #[error("model '{model}' is already registered with the persistence layer")]
    AlreadyRegistered { model: String },
}

/// Unresolvable association target or rejected association options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssociationError {
    #[error("{model} {kind} '{target}': no such model")]
    UnknownTarget {
        model: String,
        kind: String,
        target: String,
    },

    #[error("{model} {kind} '{target}': target model has not been initialized")]
    TargetNotInitialized {
        model: String,
        kind: String,
        target: String,
    },

    #[error("{model} cannot wire associations before it is initialized")]
    SourceNotInitialized { model: String },

    #[error("{model} association to '{target}' has invalid options: {reason}")]
    InvalidOptions {
        model: String,
        target: String,
        reason: String,
    },
}

impl AssociationError {
    pub fn invalid_options(
        model: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOptions {
            model: model.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// A field failed a presence or length rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn blank(field: &str) -> Self {
        Self::new(field, format!("{} can't be empty", field))
    }

    pub fn length_range(field: &str, min: usize, max: usize) -> Self {
        Self::new(
            field,
            format!("{} length must be between {} and {}", field, min, max),
        )
    }

    pub fn length_exact(field: &str, length: usize) -> Self {
        Self::new(field, format!("{} length must be exactly {}", field, length))
    }
}

/// Lifecycle callback problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("{model}: {event} hook refers to unknown method '{method}'")]
    UnknownMethod {
        model: String,
        event: String,
        method: String,
    },

    #[error("Error in {event} hook for {model} ({method}): {message}")]
    Failed {
        model: String,
        event: String,
        method: String,
        message: String,
    },
}

fn join_messages<E: std::fmt::Display>(errors: &[E], separator: &str) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Anything that aborts the model bootstrap. Always fatal.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("model import failed: {}", join_messages(.failures, "; "))]
    Discovery { failures: Vec<DiscoveryError> },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Association error: {0}")]
    Association(#[from] AssociationError),

    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("model '{0}' was not discovered")]
    UnknownModel(String),
}

/// Request-time failures from record operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("Validation failed: {}", join_messages(.0, ", "))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("model '{0}' is not registered")]
    UnknownModel(String),

    #[error("{model} with id {id} not found")]
    RecordNotFound { model: String, id: i64 },

    #[error("table '{0}' does not exist")]
    MissingTable(String),

    #[error("{model} has no association named '{name}'")]
    UnknownAssociation { model: String, name: String },
}

impl PersistError {
    /// Validation errors, if this is a validation failure.
    pub fn validation_errors(&self) -> Option<&[ValidationError]> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Failures while handling a controller action.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Action '{action}' not found in {controller}")]
    ActionNotFound { controller: String, action: String },

    #[error("Controller '{0}' is not registered")]
    ControllerNotFound(String),

    #[error("invalid route target '{0}': expected Controller#action")]
    InvalidRouteTarget(String),

    #[error("View not found: {0}")]
    ViewNotFound(String),

    #[error("Layout not found: layouts/{0}")]
    LayoutNotFound(String),

    #[error("{kind} callback '{filter}' failed: {message}")]
    Filter {
        kind: String,
        filter: String,
        message: String,
    },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("{message}")]
    Custom { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    pub fn custom(status: u16, message: impl Into<String>) -> Self {
        Self::Custom {
            status,
            message: message.into(),
        }
    }

    /// HTTP status this error should be reported with.
    pub fn status(&self) -> u16 {
        match self {
            Self::ActionNotFound { .. } | Self::ControllerNotFound(_) => 404,
            Self::Persist(PersistError::RecordNotFound { .. }) => 404,
            Self::Persist(PersistError::Validation(_)) => 422,
            Self::Custom { status, .. } => *status,
            _ => 500,
        }
    }
}

/// Failures that stop the HTTP server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages() {
        assert_eq!(ValidationError::blank("name").to_string(), "name can't be empty");
        assert_eq!(
            ValidationError::length_range("name", 5, 10).to_string(),
            "name length must be between 5 and 10"
        );
        assert_eq!(
            ValidationError::length_exact("zip", 5).to_string(),
            "zip length must be exactly 5"
        );
    }

    #[test]
    fn test_persist_validation_joins_messages() {
        let err = PersistError::Validation(vec![
            ValidationError::blank("name"),
            ValidationError::blank("email"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: name can't be empty, email can't be empty"
        );
        assert_eq!(err.validation_errors().map(|e| e.len()), Some(2));
    }

    #[test]
    fn test_discovery_failures_are_listed() {
        let err = BootstrapError::Discovery {
            failures: vec![
                DiscoveryError::Duplicate {
                    name: "User".into(),
                },
                DiscoveryError::Load {
                    source_name: "post".into(),
                    reason: "boom".into(),
                },
            ],
        };
        let message = err.to_string();
        assert!(message.contains("model 'User' is declared more than once"));
        assert!(message.contains("failed to load model from 'post': boom"));
    }

    #[test]
    fn test_controller_error_status() {
        assert_eq!(
            ControllerError::ActionNotFound {
                controller: "UsersController".into(),
                action: "nope".into(),
            }
            .status(),
            404
        );
        assert_eq!(
            ControllerError::Persist(PersistError::Validation(vec![])).status(),
            422
        );
        assert_eq!(ControllerError::custom(418, "teapot").status(), 418);
        assert_eq!(ControllerError::ViewNotFound("x".into()).status(), 500);
    }
}
