//! Railyard: a small convention-driven MVC web framework.
//!
//! The interesting part is the model layer. At startup every model
//! declaration goes through four passes, each completing for all models
//! before the next begins:
//!
//! 1. **discover** the declarations shipped by the application
//! 2. **parse** associations, validations and callbacks into a metadata registry
//! 3. **init** each model against its live table, building validators and hooks
//! 4. **associate** models with each other once all of them are registered
//!
//! Only then does the HTTP server start accepting connections.

#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::result_large_err)]

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod serve;

pub use config::AppConfig;
pub use error::{
    AssociationError, BootstrapError, ControllerError, DiscoveryError, HookError, ParseError, PersistError,
    SchemaError, ServerError, ValidationError,
};
pub use model::{BootstrapContext, ModelCatalog, ModelDeclaration, ParseMode};
pub use serve::Application;
