//! Bootstrap Orchestrator.
//!
//! Four passes run over the whole model set, each finishing for every
//! model before the next starts:
//!
//! 1. discover: load every declaration from the [`ModelCatalog`]
//! 2. parse: fill the [`MetadataRegistry`]
//! 3. init: introspect tables and register models with the persistence layer
//! 4. associate: wire cross-model associations
//!
//! Any failure aborts the bootstrap. The [`BootstrapContext`] owns all
//! state for one run, so separate runs never share a registry.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, error, info};

use super::associations::setup_associations;
use super::declaration::ModelDeclaration;
use super::initializer::init_model;
use super::parser::{parse_definitions, ParseMode};
use super::registry::MetadataRegistry;
use super::ModelState;
use crate::db::{ModelHandle, Persistence};
use crate::error::{BootstrapError, DiscoveryError};

/// Produces one model's declaration, or a reason it could not be loaded.
pub type ModelLoader = Arc<dyn Fn() -> Result<ModelDeclaration, String> + Send + Sync>;

/// The list of model sources an application ships.
#[derive(Clone, Default)]
pub struct ModelCatalog {
    sources: Vec<(String, ModelLoader)>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a loader under a source name (used in error messages).
    pub fn register<F>(mut self, source_name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<ModelDeclaration, String> + Send + Sync + 'static,
    {
        self.sources.push((source_name.into(), Arc::new(loader)));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.source_names()).finish()
    }
}

struct ModelEntry {
    declaration: ModelDeclaration,
    state: ModelState,
    handle: Option<ModelHandle>,
}

/// Owned state for one bootstrap run.
pub struct BootstrapContext<'p, P: Persistence> {
    persistence: &'p P,
    mode: ParseMode,
    registry: MetadataRegistry,
    models: IndexMap<String, ModelEntry>,
}

impl<'p, P: Persistence> BootstrapContext<'p, P> {
    pub fn new(persistence: &'p P, mode: ParseMode) -> Self {
        Self {
            persistence,
            mode,
            registry: MetadataRegistry::new(),
            models: IndexMap::new(),
        }
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn state(&self, model: &str) -> Option<ModelState> {
        self.models.get(model).map(|entry| entry.state)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Pass 1. Loads every source; if any fails, nothing is kept.
    pub fn discover(&mut self, catalog: &ModelCatalog) -> Result<usize, BootstrapError> {
        let mut loaded: IndexMap<String, ModelDeclaration> = IndexMap::new();
        let mut failures = Vec::new();

        for (source_name, loader) in &catalog.sources {
            let declaration = match loader() {
                Ok(declaration) => declaration,
                Err(reason) => {
                    failures.push(DiscoveryError::Load {
                        source_name: source_name.clone(),
                        reason,
                    });
                    continue;
                }
            };

            let name = declaration.name().to_string();
            if !is_model_name(&name) {
                failures.push(DiscoveryError::InvalidName {
                    source_name: source_name.clone(),
                    name,
                });
            } else if loaded.contains_key(&name) || self.models.contains_key(&name) {
                failures.push(DiscoveryError::Duplicate { name });
            } else {
                debug!("Loaded model {} from {}", name, source_name);
                loaded.insert(name, declaration);
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                error!("{}", failure);
            }
            return Err(BootstrapError::Discovery { failures });
        }

        let count = loaded.len();
        for (name, declaration) in loaded {
            self.models.insert(
                name,
                ModelEntry {
                    declaration,
                    state: ModelState::default(),
                    handle: None,
                },
            );
        }
        Ok(count)
    }

    /// Pass 2. Returns how many models were newly parsed.
    pub fn parse_all(&mut self) -> Result<usize, BootstrapError> {
        let mut parsed = 0;
        for entry in self.models.values_mut() {
            if parse_definitions(&entry.declaration, &mut entry.state, &mut self.registry, self.mode)? {
                parsed += 1;
            }
        }
        Ok(parsed)
    }

    /// Pass 3. Returns how many models were newly initialized.
    pub fn init_all(&mut self) -> Result<usize, BootstrapError> {
        let mut initialized = 0;
        for entry in self.models.values_mut() {
            let handle = init_model(
                &entry.declaration,
                &mut entry.state,
                &mut self.registry,
                self.persistence,
                self.mode,
            )?;
            if let Some(handle) = handle {
                entry.handle = Some(handle);
                initialized += 1;
            }
        }
        Ok(initialized)
    }

    /// Pass 4. Returns the number of associations wired.
    pub fn associate_all(&mut self) -> Result<usize, BootstrapError> {
        let mut wired = 0;
        for name in self.models.keys() {
            wired += setup_associations(name, &self.registry, self.persistence)?;
        }
        Ok(wired)
    }

    /// Run all four passes and hand back the read-only result.
    pub fn run(mut self, catalog: &ModelCatalog) -> Result<BootedModels, BootstrapError> {
        let started = Instant::now();
        info!("Bootstrapping {} model source(s)", catalog.len());

        let count = self.discover(catalog)?;
        info!("Discovered {} model(s)", count);

        let parsed = self.parse_all()?;
        info!("Parsed definitions for {} model(s)", parsed);

        let initialized = self.init_all()?;
        info!("Initialized {} model(s)", initialized);

        let wired = self.associate_all()?;
        info!(
            "Wired {} association(s); models ready in {}ms",
            wired,
            started.elapsed().as_millis()
        );

        Ok(self.finish())
    }

    fn finish(self) -> BootedModels {
        let handles = self
            .models
            .into_iter()
            .filter_map(|(name, entry)| entry.handle.map(|handle| (name, handle)))
            .collect();
        BootedModels {
            registry: self.registry,
            handles,
        }
    }
}

/// Result of a completed bootstrap. Read-only from here on.
#[derive(Debug, Clone, Default)]
pub struct BootedModels {
    registry: MetadataRegistry,
    handles: IndexMap<String, ModelHandle>,
}

impl BootedModels {
    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn handle(&self, model: &str) -> Option<&ModelHandle> {
        self.handles.get(model)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// `User`, `BlogPost`: an ASCII capital followed by letters, digits or `_`.
fn is_model_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
