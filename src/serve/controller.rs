//! Controllers: named actions with before/after filters, run against a
//! per-request [`ActionContext`].
//!
//! After the filters and the action have run, the response is picked in
//! this order:
//! - an explicit response (`render`, `redirect`, `json`) set on the context
//! - a JSON value returned by the action, sent with its `status` field (default 200,
//!   500 when the code cannot be sent)
//! - the implicit view `<controller>/<action>` inside the controller's layout

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::view::ViewRenderer;
use crate::db::MemoryDatabase;
use crate::error::ControllerError;

pub const DEFAULT_LAYOUT: &str = "application";

/// An action body. `Ok(Some(value))` sends `value` as JSON.
pub type ActionFn = Arc<dyn Fn(&mut ActionContext) -> Result<Option<Value>, ControllerError> + Send + Sync>;

/// A before/after callback. Halting is done by setting a response on the context.
pub type FilterFn = Arc<dyn Fn(&mut ActionContext) -> Result<(), String> + Send + Sync>;

/// An HTTP response produced by a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseData {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ResponseData {
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "text/html; charset=utf-8".into())],
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: value.to_string(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".into(), location.into())],
            body: String::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Which actions a filter applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterScope {
    pub only: Vec<String>,
    pub except: Vec<String>,
}

impl FilterScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(actions: &[&str]) -> Self {
        Self {
            only: actions.iter().map(|a| a.to_string()).collect(),
            except: Vec::new(),
        }
    }

    pub fn except(actions: &[&str]) -> Self {
        Self {
            only: Vec::new(),
            except: actions.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn applies_to(&self, action: &str) -> bool {
        (self.only.is_empty() || self.only.iter().any(|a| a == action))
            && !self.except.iter().any(|a| a == action)
    }
}

#[derive(Clone)]
pub struct Filter {
    pub name: String,
    pub scope: FilterScope,
    run: FilterFn,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish()
    }
}

/// A controller: its actions, filters and layout.
#[derive(Clone)]
pub struct ControllerSpec {
    name: String,
    layout: String,
    actions: IndexMap<String, ActionFn>,
    before_actions: Vec<Filter>,
    after_actions: Vec<Filter>,
}

impl ControllerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: DEFAULT_LAYOUT.to_string(),
            actions: IndexMap::new(),
            before_actions: Vec::new(),
            after_actions: Vec::new(),
        }
    }

    pub fn layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut ActionContext) -> Result<Option<Value>, ControllerError> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    pub fn before_action<F>(mut self, name: impl Into<String>, scope: FilterScope, filter: F) -> Self
    where
        F: Fn(&mut ActionContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.before_actions.push(Filter {
            name: name.into(),
            scope,
            run: Arc::new(filter),
        });
        self
    }

    pub fn after_action<F>(mut self, name: impl Into<String>, scope: FilterScope, filter: F) -> Self
    where
        F: Fn(&mut ActionContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.after_actions.push(Filter {
            name: name.into(),
            scope,
            run: Arc::new(filter),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory under the views root: `UsersController` -> `users`.
    pub fn view_dir(&self) -> String {
        self.name.replace("Controller", "").to_lowercase()
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

impl fmt::Debug for ControllerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerSpec")
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("before_actions", &self.before_actions)
            .field("after_actions", &self.after_actions)
            .finish()
    }
}

/// Per-request controller state.
pub struct ActionContext {
    controller: String,
    view_dir: String,
    action: String,
    layout: String,
    params: Map<String, Value>,
    locals: Map<String, Value>,
    response: Option<ResponseData>,
    db: Arc<MemoryDatabase>,
    renderer: Arc<dyn ViewRenderer>,
}

impl ActionContext {
    pub fn new(
        controller: &ControllerSpec,
        action: &str,
        params: Map<String, Value>,
        db: Arc<MemoryDatabase>,
        renderer: Arc<dyn ViewRenderer>,
    ) -> Self {
        Self {
            controller: controller.name.clone(),
            view_dir: controller.view_dir(),
            action: action.to_string(),
            layout: controller.layout.clone(),
            params,
            locals: Map::new(),
            response: None,
            db,
            renderer,
        }
    }

    pub fn controller_name(&self) -> &str {
        &self.controller
    }

    pub fn action_name(&self) -> &str {
        &self.action
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// A param as an integer id, accepting `"7"` as well as `7`.
    pub fn param_id(&self, name: &str) -> Option<i64> {
        match self.params.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn db(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Make a value available to the view.
    pub fn assign(&mut self, key: impl Into<String>, value: Value) {
        self.locals.insert(key.into(), value);
    }

    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> Option<&ResponseData> {
        self.response.as_ref()
    }

    /// Render a view of this controller (`"index"`) or any view (`"home/about"`)
    /// in the controller's layout.
    pub fn render(&mut self, view: &str) -> Result<(), ControllerError> {
        let layout = self.layout.clone();
        self.render_with_layout(view, &layout)
    }

    pub fn render_with_layout(&mut self, view: &str, layout: &str) -> Result<(), ControllerError> {
        let view = if view.contains('/') {
            view.to_string()
        } else {
            format!("{}/{}", self.view_dir, view)
        };
        debug!("Rendering view: {} with layout: {}", view, layout);
        let html = self.renderer.render(&view, layout, &self.locals)?;
        self.response = Some(ResponseData::html(200, html));
        Ok(())
    }

    pub fn redirect(&mut self, location: impl Into<String>) {
        let location = location.into();
        debug!("Redirecting to: {}", location);
        self.response = Some(ResponseData::redirect(location));
    }

    pub fn json(&mut self, value: Value) {
        self.json_status(200, value);
    }

    pub fn json_status(&mut self, status: u16, value: Value) {
        self.response = Some(ResponseData::json(sendable_status(u64::from(status)), &value));
    }
}

/// Codes outside 100..=999 cannot go on the wire and become 500.
fn sendable_status(status: u64) -> u16 {
    match u16::try_from(status) {
        Ok(code @ 100..=999) => code,
        _ => {
            warn!("Invalid response status {}, sending 500 instead", status);
            500
        }
    }
}

/// Run an action with its filters and pick the response.
pub fn process_action(controller: &ControllerSpec, ctx: &mut ActionContext) -> Result<ResponseData, ControllerError> {
    let action_name = ctx.action.clone();
    let action = controller
        .actions
        .get(&action_name)
        .cloned()
        .ok_or_else(|| ControllerError::ActionNotFound {
            controller: controller.name.clone(),
            action: action_name.clone(),
        })?;

    let started = Instant::now();
    info!("Processing by {}#{}", controller.name, action_name);

    let outcome = run_action(controller, &action, ctx);
    let elapsed = started.elapsed().as_millis();
    match &outcome {
        Ok(_) => debug!("Completed {}#{} in {}ms", controller.name, action_name, elapsed),
        Err(err) => error!("Error in {}#{}: {}", controller.name, action_name, err),
    }
    outcome
}

fn run_action(controller: &ControllerSpec, action: &ActionFn, ctx: &mut ActionContext) -> Result<ResponseData, ControllerError> {
    run_filters("before", &controller.before_actions, ctx)?;
    if let Some(response) = ctx.response.take() {
        debug!("Halted by before callback for {}#{}", ctx.controller, ctx.action);
        return Ok(response);
    }

    let result = action(ctx)?;
    run_filters("after", &controller.after_actions, ctx)?;

    if let Some(response) = ctx.response.take() {
        return Ok(response);
    }

    match result {
        Some(value) => {
            let status = value
                .get("status")
                .and_then(Value::as_u64)
                .map(sendable_status)
                .unwrap_or(200);
            debug!(
                "Action {}#{} returned a result, sending JSON response with status {}",
                ctx.controller, ctx.action, status
            );
            Ok(ResponseData::json(status, &value))
        }
        None => {
            debug!("No explicit response from {}#{}, attempting implicit render", ctx.controller, ctx.action);
            let view = ctx.action.clone();
            ctx.render(&view)?;
            ctx.response
                .take()
                .ok_or_else(|| ControllerError::ViewNotFound(view))
        }
    }
}

fn run_filters(kind: &str, filters: &[Filter], ctx: &mut ActionContext) -> Result<(), ControllerError> {
    for filter in filters {
        if !filter.scope.applies_to(&ctx.action) {
            continue;
        }
        debug!(
            "Running {} callback '{}' for {}#{}",
            kind, filter.name, ctx.controller, ctx.action
        );
        (filter.run)(ctx).map_err(|message| {
            error!("Error in {} callback '{}': {}", kind, filter.name, message);
            ControllerError::Filter {
                kind: kind.to_string(),
                filter: filter.name.clone(),
                message,
            }
        })?;
        if kind == "before" && ctx.response.is_some() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoRenderer;

    impl ViewRenderer for EchoRenderer {
        fn render(&self, view: &str, layout: &str, locals: &Map<String, Value>) -> Result<String, ControllerError> {
            if view.ends_with("missing") {
                return Err(ControllerError::ViewNotFound(view.to_string()));
            }
            Ok(format!("{}|{}|{}", layout, view, Value::Object(locals.clone())))
        }
    }

    fn context(controller: &ControllerSpec, action: &str, params: Value) -> ActionContext {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ActionContext::new(
            controller,
            action,
            params,
            Arc::new(MemoryDatabase::new("test")),
            Arc::new(EchoRenderer),
        )
    }

    fn run(controller: &ControllerSpec, action: &str) -> Result<ResponseData, ControllerError> {
        process_action(controller, &mut context(controller, action, json!({})))
    }

    #[test]
    fn test_implicit_render_uses_controller_view_and_layout() {
        let controller = ControllerSpec::new("HomeController").action("index", |ctx| {
            ctx.assign("title", json!("Home"));
            Ok(None)
        });
        let response = run(&controller, "index").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"application|home/index|{"title":"Home"}"#);
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_returned_value_is_sent_as_json_with_its_status() {
        let controller = ControllerSpec::new("UsersController")
            .action("show", |_| Ok(Some(json!({ "status": 404, "message": "User not found" }))))
            .action("ping", |_| Ok(Some(json!({ "ok": true }))));

        let response = run(&controller, "show").unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(
            serde_json::from_str::<Value>(&response.body).unwrap(),
            json!({ "status": 404, "message": "User not found" })
        );
        assert_eq!(run(&controller, "ping").unwrap().status, 200);
    }

    #[test]
    fn test_unsendable_status_becomes_json_500() {
        let controller = ControllerSpec::new("UsersController")
            .action("odd", |_| Ok(Some(json!({ "status": 42, "message": "odd" }))))
            .action("huge", |_| Ok(Some(json!({ "status": 70000 }))))
            .action("explicit", |ctx| {
                ctx.json_status(1000, json!({ "ok": false }));
                Ok(None)
            });

        let response = run(&controller, "odd").unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(
            serde_json::from_str::<Value>(&response.body).unwrap(),
            json!({ "status": 42, "message": "odd" })
        );
        assert_eq!(run(&controller, "huge").unwrap().status, 500);
        assert_eq!(run(&controller, "explicit").unwrap().status, 500);
        assert_eq!(sendable_status(999), 999);
        assert_eq!(sendable_status(100), 100);
    }

    #[test]
    fn test_explicit_response_wins_over_returned_value() {
        let controller = ControllerSpec::new("UsersController").action("create", |ctx| {
            ctx.redirect("/users/1");
            Ok(Some(json!({ "ignored": true })))
        });
        let response = run(&controller, "create").unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(response.header("Location"), Some("/users/1"));
    }

    #[test]
    fn test_filters_respect_only_and_except() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        let controller = ControllerSpec::new("PostsController")
            .before_action("load", FilterScope::only(&["show"]), move |ctx| {
                a.lock().unwrap().push(format!("load:{}", ctx.action_name()));
                Ok(())
            })
            .before_action("auth", FilterScope::except(&["index"]), move |ctx| {
                b.lock().unwrap().push(format!("auth:{}", ctx.action_name()));
                Ok(())
            })
            .after_action("audit", FilterScope::all(), move |ctx| {
                c.lock().unwrap().push(format!("audit:{}", ctx.action_name()));
                Ok(())
            })
            .action("index", |_| Ok(Some(json!([]))))
            .action("show", |_| Ok(Some(json!({}))));

        run(&controller, "index").unwrap();
        run(&controller, "show").unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["audit:index", "load:show", "auth:show", "audit:show"]
        );
    }

    #[test]
    fn test_before_filter_response_halts_action() {
        let controller = ControllerSpec::new("AdminController")
            .before_action("require_login", FilterScope::all(), |ctx| {
                ctx.json_status(401, json!({ "error": "Unauthorized" }));
                Ok(())
            })
            .action("index", |_| Err(ControllerError::custom(500, "should not run")));
        assert_eq!(run(&controller, "index").unwrap().status, 401);
    }

    #[test]
    fn test_errors() {
        let controller = ControllerSpec::new("HomeController")
            .before_action("explode", FilterScope::only(&["boom"]), |_| Err("nope".into()))
            .action("boom", |_| Ok(None))
            .action("missing", |_| Ok(None));

        assert!(matches!(
            run(&controller, "nothing"),
            Err(ControllerError::ActionNotFound { action, .. }) if action == "nothing"
        ));
        assert_eq!(
            run(&controller, "boom").unwrap_err().to_string(),
            "before callback 'explode' failed: nope"
        );
        assert!(matches!(
            run(&controller, "missing"),
            Err(ControllerError::ViewNotFound(_))
        ));
    }

    #[test]
    fn test_param_id_and_view_dir() {
        let controller = ControllerSpec::new("UsersController");
        let ctx = context(&controller, "show", json!({ "id": "42", "n": 7, "bad": "x" }));
        assert_eq!(ctx.param_id("id"), Some(42));
        assert_eq!(ctx.param_id("n"), Some(7));
        assert_eq!(ctx.param_id("bad"), None);
        assert_eq!(controller.view_dir(), "users");
    }
}
