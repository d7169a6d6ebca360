//! Demo models.

use serde_json::json;
use tracing::info;

use crate::model::{CallbackDecl, ModelCatalog, ModelDeclaration};

pub fn user() -> ModelDeclaration {
    ModelDeclaration::new("User")
        .has_many("posts")
        .has_many_with(|| ("comments", json!({ "through": "posts" })))
        .validate("name", json!({ "presence": true, "length": { "in": "5..10" } }))
        .after_commit(CallbackDecl::with_options("notify_user", json!({ "on": "create" })))
        .method("notify_user", |user| {
            info!("User created: {}", user.get_str("name").unwrap_or_default());
            Ok(())
        })
}

pub fn post() -> ModelDeclaration {
    ModelDeclaration::new("Post")
        .belongs_to("User")
        .has_many("comments")
        .validate("title", json!({ "presence": true }))
}

pub fn comment() -> ModelDeclaration {
    ModelDeclaration::new("Comment")
        .belongs_to("Post")
        .belongs_to("User")
        .validate("content", json!({ "presence": true }))
}

pub fn catalog() -> ModelCatalog {
    ModelCatalog::new()
        .register("app/models/user.rs", || Ok(user()))
        .register("app/models/post.rs", || Ok(post()))
        .register("app/models/comment.rs", || Ok(comment()))
}
