use crate::error::ControllerError;
use crate::serve::router::Router;

pub fn draw() -> Result<Router, ControllerError> {
    let mut router = Router::new();
    router
        .get("/", "HomeController#index")?
        .get("/users", "UsersController#index")?
        .get("/users/:id", "UsersController#show")?
        .get("/about", "HomeController#about")?;
    Ok(router)
}
