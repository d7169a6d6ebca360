//! Demo controllers.

use serde_json::{json, Value};

use crate::serve::controller::ControllerSpec;
use crate::serve::registry::ControllerRegistry;

fn home() -> ControllerSpec {
    ControllerSpec::new("HomeController")
        .action("index", |ctx| {
            ctx.assign("title", json!("Railyard"));
            Ok(None)
        })
        .action("about", |ctx| {
            ctx.assign("title", json!("About - Railyard"));
            Ok(None)
        })
}

fn users() -> ControllerSpec {
    ControllerSpec::new("UsersController")
        .action("index", |ctx| {
            let users = ctx.db().all("User")?;
            let names = users
                .iter()
                .filter_map(|u| u.get_str("name"))
                .collect::<Vec<_>>()
                .join(", ");
            ctx.assign("title", json!("Users"));
            ctx.assign("user_count", json!(users.len()));
            ctx.assign("user_names", json!(names));
            ctx.assign("users", Value::Array(users.iter().map(|u| u.to_json()).collect()));
            Ok(None)
        })
        .action("show", |ctx| {
            ctx.assign("title", json!("User"));
            let user = match ctx.param_id("id") {
                Some(id) => ctx.db().find("User", id)?,
                None => None,
            };
            match user {
                Some(user) => {
                    ctx.assign("user", user.to_json());
                    Ok(None)
                }
                None => Ok(Some(json!({ "status": 404, "message": "User not found" }))),
            }
        })
}

pub fn registry() -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry.register(home()).register(users());
    registry
}
