//! HTTP application: routing, controller dispatch and the hyper server loop.
//!
//! [`Application::start`] runs the model bootstrap to completion before the
//! listener is bound, so no request is served with partial model metadata.

pub mod controller;
pub mod env_loader;
pub mod registry;
pub mod router;
pub mod view;

use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::db::MemoryDatabase;
use crate::error::{BootstrapError, ControllerError, PersistError, ServerError};
use crate::model::{BootedModels, BootstrapContext, ModelCatalog};
use controller::{process_action, ActionContext, ResponseData};
use registry::ControllerRegistry;
use router::{parse_query_string, Router};
use view::{FileViewRenderer, ViewRenderer};

/// A request as the dispatcher sees it, independent of the transport.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub remote: Option<SocketAddr>,
}

impl IncomingRequest {
    pub fn new(method: &str, path: &str) -> Self {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path, None),
        };
        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            query,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body.into();
        self
    }

    fn url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

pub struct Application {
    config: AppConfig,
    db: Arc<MemoryDatabase>,
    models: ModelCatalog,
    router: Router,
    controllers: ControllerRegistry,
    renderer: Arc<dyn ViewRenderer>,
}

impl Application {
    pub fn new(config: AppConfig, db: Arc<MemoryDatabase>) -> Self {
        let renderer = Arc::new(FileViewRenderer::new(config.views_dir.clone()));
        Self {
            config,
            db,
            models: ModelCatalog::new(),
            router: Router::new(),
            controllers: ControllerRegistry::new(),
            renderer,
        }
    }

    pub fn with_models(mut self, models: ModelCatalog) -> Self {
        self.models = models;
        self
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn with_controllers(mut self, controllers: ControllerRegistry) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }

    /// Run the four-pass model bootstrap against the database.
    pub fn boot(&self) -> Result<BootedModels, BootstrapError> {
        let booted = BootstrapContext::new(self.db.as_ref(), self.config.parse_mode()).run(&self.models);
        if let Err(err) = &booted {
            error!("Failed to initialize models: {}", err);
        }
        booted
    }

    /// Boot the models, then serve HTTP until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        let booted = self.boot()?;
        info!(
            environment = %self.config.environment,
            database = %self.config.database.name,
            "Booted {} model(s)",
            booted.len()
        );
        for target in self.controllers.unresolved_routes(&self.router) {
            warn!("Route target {} has no registered action", target);
        }
        if !self.config.environment.is_production() {
            println!("\n{}", self.router.table());
        }

        let addr = self.config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on http://{}", addr);

        let app = Arc::new(self);
        loop {
            let (stream, remote) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!("Failed to accept connection: {}", err);
                        continue;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let app = app.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let app = app.clone();
                    async move { Ok::<_, Infallible>(handle_hyper_request(req, &app, Some(remote)).await) }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error from {}: {}", remote, err);
                }
            });
        }
    }

    /// Route a request to its controller action and produce the response.
    pub fn dispatch(&self, request: &IncomingRequest) -> ResponseData {
        let started = Instant::now();
        let remote = request
            .remote
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "local".to_string());
        info!(
            "Started {} \"{}\" for {} at {}",
            request.method,
            request.url(),
            remote,
            chrono::Utc::now().to_rfc3339()
        );

        let response = match self.router.find(&request.method, &request.path) {
            Some(matched) => {
                let params = request_params(matched.params, request);
                if !params.is_empty() {
                    let logged = Value::Object(params.clone());
                    info!("  Parameters: {}", logged);
                }
                let route = matched.route;
                self.run_action(&route.controller, &route.action, params)
                    .unwrap_or_else(|err| self.error_response(&err))
            }
            None => ResponseData::json(404, &json!({ "error": "Not Found" })),
        };

        let elapsed = started.elapsed().as_millis();
        if response.status >= 400 {
            error!("Completed {} {} in {}ms", response.status, status_text(response.status), elapsed);
        } else {
            info!("Completed {} {} in {}ms", response.status, status_text(response.status), elapsed);
        }
        response
    }

    fn run_action(&self, controller: &str, action: &str, params: Map<String, Value>) -> Result<ResponseData, ControllerError> {
        let controller = self.controllers.get(controller)?;
        let mut ctx = ActionContext::new(controller, action, params, self.db.clone(), self.renderer.clone());
        process_action(controller, &mut ctx)
    }

    fn error_response(&self, err: &ControllerError) -> ResponseData {
        let status = err.status();
        let mut body = json!({ "error": status_text(status) });
        if self.config.environment.is_development() {
            body["message"] = json!(err.to_string());
        }
        if let ControllerError::Persist(PersistError::Validation(errors)) = err {
            body["errors"] = json!(errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>());
        }
        ResponseData::json(status, &body)
    }
}

/// Path params, then query, then body; later sources win.
fn request_params(path_params: indexmap::IndexMap<String, String>, request: &IncomingRequest) -> Map<String, Value> {
    let mut params: Map<String, Value> = path_params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    if let Some(query) = &request.query {
        for (key, value) in parse_query_string(query) {
            params.insert(key, Value::String(value));
        }
    }

    if request.body.is_empty() {
        return params;
    }
    let content_type = request.content_type.as_deref().unwrap_or_default();
    if content_type.starts_with("application/json") {
        match serde_json::from_slice::<Value>(&request.body) {
            Ok(Value::Object(fields)) => params.extend(fields),
            Ok(_) => debug!("Ignoring non-object JSON body"),
            Err(err) => warn!("Ignoring malformed JSON body: {}", err),
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let form = String::from_utf8_lossy(&request.body);
        for (key, value) in parse_query_string(&form) {
            params.insert(key, Value::String(value));
        }
    }
    params
}

fn status_text(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
}

async fn handle_hyper_request<B>(req: Request<B>, app: &Application, remote: Option<SocketAddr>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!("Failed to read request body: {}", err);
            return into_hyper_response(ResponseData::json(400, &json!({ "error": "Bad Request" })));
        }
    };

    let request = IncomingRequest {
        method: parts.method.as_str().to_uppercase(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(String::from),
        content_type: parts
            .headers
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body,
        remote,
    };
    into_hyper_response(app.dispatch(&request))
}

fn into_hyper_response(data: ResponseData) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(data.status);
    for (name, value) in &data.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Full::new(Bytes::from(data.body))).unwrap_or_else(|err| {
        error!("Failed to build response: {}", err);
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::model::ModelDeclaration;
    use crate::serve::controller::ControllerSpec;
    use pretty_assertions::assert_eq;

    struct StaticRenderer;

    impl ViewRenderer for StaticRenderer {
        fn render(&self, view: &str, _layout: &str, locals: &Map<String, Value>) -> Result<String, ControllerError> {
            Ok(format!("{} {}", view, Value::Object(locals.clone())))
        }
    }

    fn app(environment: Environment) -> Application {
        let db = Arc::new(MemoryDatabase::new("railyard_test"));
        db.create_table("users", &["id", "name"]);

        let mut router = Router::new();
        router
            .get("/users", "UsersController#index")
            .unwrap()
            .get("/users/:id", "UsersController#show")
            .unwrap()
            .post("/users", "UsersController#create")
            .unwrap();

        let mut controllers = ControllerRegistry::new();
        controllers.register(
            ControllerSpec::new("UsersController")
                .action("index", |ctx| {
                    let users = ctx.db().all("User")?;
                    ctx.assign("count", json!(users.len()));
                    Ok(None)
                })
                .action("show", |ctx| {
                    let id = ctx.param_id("id").unwrap_or_default();
                    match ctx.db().find("User", id)? {
                        Some(user) => {
                            ctx.json(user.to_json());
                            Ok(None)
                        }
                        None => Ok(Some(json!({ "status": 404, "message": "User not found" }))),
                    }
                })
                .action("create", |ctx| {
                    let user = ctx.db().create("User", Value::Object(ctx.params().clone()))?;
                    ctx.json_status(201, user.to_json());
                    Ok(None)
                }),
        );

        let config = AppConfig {
            environment,
            ..AppConfig::default()
        };
        let app = Application::new(config, db)
            .with_models(ModelCatalog::new().register("user.rs", || {
                Ok(ModelDeclaration::new("User").validate("name", json!({ "presence": true })))
            }))
            .with_router(router)
            .with_controllers(controllers)
            .with_renderer(Arc::new(StaticRenderer));
        app.boot().unwrap();
        app
    }

    fn body(response: &ResponseData) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn test_unmatched_route_is_404_json() {
        let response = app(Environment::Test).dispatch(&IncomingRequest::new("GET", "/nope"));
        assert_eq!(response.status, 404);
        assert_eq!(body(&response), json!({ "error": "Not Found" }));
    }

    #[test]
    fn test_params_merge_path_query_and_body() {
        let request = IncomingRequest::new("POST", "/users?name=query&role=x")
            .with_body("application/json", r#"{"name":"FromBody"}"#);
        let params = request_params(indexmap::IndexMap::new(), &request);
        assert_eq!(params["name"], json!("FromBody"));
        assert_eq!(params["role"], json!("x"));

        let form = IncomingRequest::new("POST", "/users").with_body(
            "application/x-www-form-urlencoded",
            "name=Jane+Smith",
        );
        assert_eq!(request_params(indexmap::IndexMap::new(), &form)["name"], json!("Jane Smith"));
    }

    #[test]
    fn test_create_show_and_index() {
        let app = app(Environment::Test);
        let created = app.dispatch(
            &IncomingRequest::new("POST", "/users").with_body("application/json", r#"{"name":"Ann"}"#),
        );
        assert_eq!(created.status, 201);
        assert_eq!(body(&created)["id"], json!(1));

        let shown = app.dispatch(&IncomingRequest::new("GET", "/users/1"));
        assert_eq!(body(&shown)["name"], json!("Ann"));

        let missing = app.dispatch(&IncomingRequest::new("GET", "/users/99"));
        assert_eq!(missing.status, 404);
        assert_eq!(body(&missing)["message"], json!("User not found"));

        let index = app.dispatch(&IncomingRequest::new("GET", "/users"));
        assert_eq!(index.body, r#"users/index {"count":1}"#);
    }

    #[test]
    fn test_validation_failure_is_422_with_messages() {
        let response = app(Environment::Production).dispatch(
            &IncomingRequest::new("POST", "/users").with_body("application/json", "{}"),
        );
        assert_eq!(response.status, 422);
        assert_eq!(
            body(&response),
            json!({ "error": "Unprocessable Entity", "errors": ["name can't be empty"] })
        );
    }

    #[test]
    fn test_error_message_only_in_development() {
        let mut router = Router::new();
        router.get("/ghost", "GhostController#index").unwrap();
        let config = AppConfig::default();
        let app = Application::new(config, Arc::new(MemoryDatabase::new("dev"))).with_router(router);

        let response = app.dispatch(&IncomingRequest::new("GET", "/ghost"));
        assert_eq!(response.status, 404);
        assert_eq!(
            body(&response)["message"],
            json!("Controller 'GhostController' is not registered")
        );
    }

    #[tokio::test]
    async fn test_hyper_request_round_trip() {
        let app = app(Environment::Test);
        let req = Request::builder()
            .method("POST")
            .uri("/users")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(r#"{"name":"Bea"}"#)))
            .unwrap();

        let response = handle_hyper_request(req, &app, None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["name"], json!("Bea"));
    }
}
