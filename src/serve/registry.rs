//! Controller registry: controller name to its actions and filters.

use indexmap::IndexMap;

use super::controller::ControllerSpec;
use super::router::Router;
use crate::error::ControllerError;

#[derive(Debug, Clone, Default)]
pub struct ControllerRegistry {
    controllers: IndexMap<String, ControllerSpec>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller, replacing any with the same name.
    pub fn register(&mut self, controller: ControllerSpec) -> &mut Self {
        self.controllers.insert(controller.name().to_string(), controller);
        self
    }

    pub fn get(&self, name: &str) -> Result<&ControllerSpec, ControllerError> {
        self.controllers
            .get(name)
            .ok_or_else(|| ControllerError::ControllerNotFound(name.to_string()))
    }

    pub fn all(&self) -> impl Iterator<Item = &ControllerSpec> {
        self.controllers.values()
    }

    pub fn get_actions(&self, name: &str) -> Vec<String> {
        self.controllers
            .get(name)
            .map(|c| c.action_names().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Routes whose controller or action is not registered, as `Controller#action`.
    pub fn unresolved_routes(&self, router: &Router) -> Vec<String> {
        router
            .routes()
            .iter()
            .filter(|route| {
                self.controllers
                    .get(&route.controller)
                    .map_or(true, |c| !c.has_action(&route.action))
            })
            .map(|route| format!("{}#{}", route.controller, route.action))
            .collect()
    }
}
