//! The bundled demo application: users, posts and comments.

pub mod controllers;
pub mod models;
pub mod routes;
pub mod schema;

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::db::MemoryDatabase;
use crate::error::ControllerError;
use crate::serve::Application;

/// Build the demo application on a freshly migrated and seeded database.
/// Models are not booted yet.
pub fn build(config: AppConfig) -> Result<Application, ControllerError> {
    let db = Arc::new(
        MemoryDatabase::new(config.database.name.clone()).with_query_logging(config.database.logging),
    );
    schema::migrate(&db);
    let seeded = schema::seed(&db)?;
    info!("Database {} ready with {} seeded user(s)", db.name(), seeded);

    Ok(Application::new(config, db)
        .with_models(models::catalog())
        .with_router(routes::draw()?)
        .with_controllers(controllers::registry()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::serve::IncomingRequest;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    fn demo() -> Application {
        let config = AppConfig {
            environment: Environment::Test,
            views_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("app/views"),
            ..AppConfig::default()
        };
        let app = build(config).unwrap();
        app.boot().unwrap();
        app
    }

    #[test]
    fn test_demo_boots_and_wires_every_association() {
        let app = demo();
        let db = app.database();
        let wired = |model: &str| {
            db.associations_of(model)
                .into_iter()
                .map(|a| a.name)
                .collect::<Vec<_>>()
        };
        assert_eq!(wired("User"), vec!["posts", "comments"]);
        assert_eq!(wired("Post"), vec!["User", "comments"]);
        assert_eq!(wired("Comment"), vec!["Post", "User"]);
        assert!(app.router().routes().len() == 4);
    }

    #[test]
    fn test_home_page_renders_inside_layout() {
        let response = demo().dispatch(&IncomingRequest::new("GET", "/"));
        assert_eq!(response.status, 200);
        assert!(response.body.contains("<title>Railyard</title>"));
        assert!(response.body.contains("<h1>Railyard</h1>"));
    }

    #[test]
    fn test_users_pages() {
        let app = demo();
        let index = app.dispatch(&IncomingRequest::new("GET", "/users"));
        assert_eq!(index.status, 200);
        assert!(index.body.contains("Admin User, John Doe, Jane Smith"));

        let show = app.dispatch(&IncomingRequest::new("GET", "/users/2"));
        assert!(show.body.contains("john@example.com"));

        let missing = app.dispatch(&IncomingRequest::new("GET", "/users/42"));
        assert_eq!(missing.status, 404);
        assert_eq!(
            serde_json::from_str::<Value>(&missing.body).unwrap(),
            json!({ "status": 404, "message": "User not found" })
        );
    }

    #[test]
    fn test_user_validation_and_through_association() {
        let app = demo();
        let db = app.database();
        assert!(db.create("User", json!({ "name": "Joe" })).is_err());

        let user = db.create("User", json!({ "name": "JoeSmith", "email": "joe@example.com" })).unwrap();
        let post = db
            .create("Post", json!({ "title": "Hello", "user_id": user.id() }))
            .unwrap();
        db.create("Comment", json!({ "content": "Nice", "post_id": post.id(), "user_id": 1 }))
            .unwrap();

        let comments = db.related("User", &user, "comments").unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].get_str("content"), Some("Nice"));
    }
}
