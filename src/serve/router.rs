//! Explicit routing table mapping HTTP method + path to `Controller#action`.
//!
//! ```
//! use railyard::serve::router::{ResourceOptions, Router};
//!
//! let mut router = Router::new();
//! router.get("/", "HomeController#index").unwrap();
//! router.resources("posts", ResourceOptions::only(&["index", "show"])).unwrap();
//!
//! let matched = router.find("GET", "/posts/42").unwrap();
//! assert_eq!(matched.route.controller, "PostsController");
//! assert_eq!(matched.params["id"], "42");
//! ```

use std::fmt::Write as _;

use colored::Colorize;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ControllerError;

/// A single registered route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub method: String,
    pub path: String,
    pub controller: String,
    pub action: String,
}

/// A route matched against a request, with its extracted path params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: IndexMap<String, String>,
}

/// Options for [`Router::resources`].
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    /// Restrict the generated actions. `None` means all seven.
    pub only: Option<Vec<String>>,
    /// Controller name; defaults to `<Singular>sController`.
    pub controller: Option<String>,
}

impl ResourceOptions {
    pub fn only(actions: &[&str]) -> Self {
        Self {
            only: Some(actions.iter().map(|a| a.to_string()).collect()),
            controller: None,
        }
    }

    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    fn includes(&self, action: &str) -> bool {
        self.only
            .as_ref()
            .map_or(true, |only| only.iter().any(|a| a == action))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, target: &str) -> Result<&mut Self, ControllerError> {
        self.add_route("GET", path, target)
    }

    pub fn post(&mut self, path: &str, target: &str) -> Result<&mut Self, ControllerError> {
        self.add_route("POST", path, target)
    }

    pub fn put(&mut self, path: &str, target: &str) -> Result<&mut Self, ControllerError> {
        self.add_route("PUT", path, target)
    }

    pub fn patch(&mut self, path: &str, target: &str) -> Result<&mut Self, ControllerError> {
        self.add_route("PATCH", path, target)
    }

    pub fn delete(&mut self, path: &str, target: &str) -> Result<&mut Self, ControllerError> {
        self.add_route("DELETE", path, target)
    }

    fn add_route(&mut self, method: &str, path: &str, target: &str) -> Result<&mut Self, ControllerError> {
        let (controller, action) = target
            .split_once('#')
            .filter(|(c, a)| !c.is_empty() && !a.is_empty())
            .ok_or_else(|| ControllerError::InvalidRouteTarget(target.to_string()))?;

        debug!("Registering route: {} {} => {}#{}", method, path, controller, action);
        self.routes.push(Route {
            method: method.to_string(),
            path: path.to_string(),
            controller: controller.to_string(),
            action: action.to_string(),
        });
        Ok(self)
    }

    /// Register the RESTful routes for a resource, in index, new, create,
    /// show, edit, update (PUT and PATCH), destroy order.
    pub fn resources(&mut self, resource: &str, options: ResourceOptions) -> Result<&mut Self, ControllerError> {
        let controller = options
            .controller
            .clone()
            .unwrap_or_else(|| default_controller(resource));
        info!("Setting up resource routes for '{}'", resource);

        let collection = format!("/{}", resource);
        let member = format!("/{}/:id", resource);
        let target = |action: &str| format!("{}#{}", controller, action);

        if options.includes("index") {
            self.get(&collection, &target("index"))?;
        }
        if options.includes("new") {
            self.get(&format!("{}/new", collection), &target("new"))?;
        }
        if options.includes("create") {
            self.post(&collection, &target("create"))?;
        }
        if options.includes("show") {
            self.get(&member, &target("show"))?;
        }
        if options.includes("edit") {
            self.get(&format!("{}/edit", member), &target("edit"))?;
        }
        if options.includes("update") {
            self.put(&member, &target("update"))?;
            self.patch(&member, &target("update"))?;
        }
        if options.includes("destroy") {
            self.delete(&member, &target("destroy"))?;
        }
        Ok(self)
    }

    /// First route matching method and path, in registration order.
    pub fn find(&self, method: &str, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method.eq_ignore_ascii_case(method))
            .find_map(|route| {
                match_path(&route.path, path).map(|params| RouteMatch { route, params })
            })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Aligned `Method  Path  Controller#Action` listing.
    pub fn table(&self) -> String {
        let method_width = self.routes.iter().map(|r| r.method.len()).max().unwrap_or(0).max(6);
        let path_width = self.routes.iter().map(|r| r.path.len()).max().unwrap_or(0).max(4);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<mw$}  {:<pw$}  {}",
            "Method".bold(),
            "Path".bold(),
            "Controller#Action".bold(),
            mw = method_width,
            pw = path_width
        );
        for route in &self.routes {
            let _ = writeln!(
                out,
                "{:<mw$}  {:<pw$}  {}#{}",
                route.method.green(),
                route.path,
                route.controller,
                route.action,
                mw = method_width,
                pw = path_width
            );
        }
        out
    }
}

/// `posts` -> `PostsController`.
fn default_controller(resource: &str) -> String {
    let singular = resource.strip_suffix('s').unwrap_or(resource);
    let mut chars = singular.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    format!("{}sController", capitalized)
}

/// Match a path against a pattern and extract `:name` parameters.
///
/// `/users/:id` matches `/users/123` with `{"id": "123"}`. A trailing slash
/// on the request path is ignored.
pub fn match_path(pattern: &str, path: &str) -> Option<IndexMap<String, String>> {
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };
    if pattern == path {
        return Some(IndexMap::new());
    }

    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();
    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = IndexMap::new();
    for (pat, actual) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = pat.strip_prefix(':') {
            if actual.is_empty() {
                return None;
            }
            let value = urlencoding::decode(actual)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| actual.to_string());
            params.insert(name.to_string(), value);
        } else if pat != actual {
            return None;
        }
    }
    Some(params)
}

/// Parse a query string or urlencoded form body.
pub fn parse_query_string(query: &str) -> IndexMap<String, String> {
    let decode = |s: &str| {
        let s = s.replace('+', " ");
        urlencoding::decode(&s)
            .map(|v| v.into_owned())
            .unwrap_or(s)
    };

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode(key), decode(value)),
            None => (decode(pair), String::new()),
        })
        .collect()
}
