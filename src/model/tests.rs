//! End-to-end bootstrap scenarios over the in-memory database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::db::{MemoryDatabase, Persistence};
use crate::error::{AssociationError, BootstrapError, PersistError, SchemaError};

fn user_declaration(notified: Arc<AtomicUsize>) -> ModelDeclaration {
    ModelDeclaration::new("User")
        .has_many("posts")
        .validate("name", json!({ "presence": true, "length": { "in": "5..10" } }))
        .after_commit(CallbackDecl::with_options("notify_user", json!({ "on": "create" })))
        .method("notify_user", move |_record| {
            notified.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
}

fn blog_database() -> MemoryDatabase {
    let db = MemoryDatabase::new("railyard_test");
    db.create_table("users", &["id", "name", "email", "created_at", "updated_at"]);
    db.create_table("posts", &["id", "title", "content", "user_id", "created_at", "updated_at"]);
    db
}

fn catalog(notified: Arc<AtomicUsize>) -> ModelCatalog {
    ModelCatalog::new()
        .register("user.rs", move || Ok(user_declaration(notified.clone())))
        .register("post.rs", || Ok(ModelDeclaration::new("Post").belongs_to("User")))
}

#[test]
fn test_booted_user_validates_before_hooks_and_notifies_once() {
    let db = blog_database();
    let notified = Arc::new(AtomicUsize::new(0));

    let booted = BootstrapContext::new(&db, ParseMode::Strict)
        .run(&catalog(notified.clone()))
        .unwrap();
    assert_eq!(booted.model_names().collect::<Vec<_>>(), vec!["User", "Post"]);
    assert_eq!(
        booted.registry().get("User").unwrap().callbacks["afterCreateCommit"],
        "notify_user"
    );

    let err = db.create("User", json!({ "name": "Joe" })).unwrap_err();
    assert_eq!(
        err,
        PersistError::Validation(vec![crate::error::ValidationError::length_range("name", 5, 10)])
    );
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert!(db.all("User").unwrap().is_empty());

    let user = db.create("User", json!({ "name": "JoeSmith" })).unwrap();
    assert_eq!(user.get_str("name"), Some("JoeSmith"));
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    db.create("Post", json!({ "title": "Hello", "user_id": user.id() })).unwrap();
    assert_eq!(db.related("User", &user, "posts").unwrap().len(), 1);
}

#[test]
fn test_reparse_leaves_registry_unchanged() {
    let notified = Arc::new(AtomicUsize::new(0));
    let declaration = user_declaration(notified);
    let mut registry = MetadataRegistry::new();
    let mut state = ModelState::default();

    assert!(parse_definitions(&declaration, &mut state, &mut registry, ParseMode::Lenient).unwrap());
    let first = registry.get("User").cloned();

    assert!(!parse_definitions(&declaration, &mut state, &mut registry, ParseMode::Lenient).unwrap());
    let mut fresh = ModelState::default();
    assert!(!parse_definitions(&declaration, &mut fresh, &mut registry, ParseMode::Lenient).unwrap());
    assert!(fresh.definition_parsed);
    assert_eq!(registry.get("User").cloned(), first);
}

#[test]
fn test_empty_table_aborts_without_loading_schema() {
    let db = MemoryDatabase::new("railyard_test");
    db.create_table("users", &[]);
    let notified = Arc::new(AtomicUsize::new(0));

    let mut context = BootstrapContext::new(&db, ParseMode::Lenient);
    context.discover(&catalog(notified)).unwrap();
    context.parse_all().unwrap();
    let err = context.init_all().unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Schema(SchemaError::MissingTable { ref table }) if table == "users"
    ));
    assert_eq!(context.state("User").map(|s| s.schema_loaded), Some(false));
    assert!(db.resolve_model("User").is_none());
}

#[test]
fn test_associating_before_targets_are_initialized_fails() {
    let db = blog_database();
    let notified = Arc::new(AtomicUsize::new(0));
    let declaration = user_declaration(notified);
    let post = ModelDeclaration::new("Post");

    let mut registry = MetadataRegistry::new();
    let mut user_state = ModelState::default();
    let mut post_state = ModelState::default();
    parse_definitions(&declaration, &mut user_state, &mut registry, ParseMode::Lenient).unwrap();
    parse_definitions(&post, &mut post_state, &mut registry, ParseMode::Lenient).unwrap();
    init_model(&declaration, &mut user_state, &mut registry, &db, ParseMode::Lenient).unwrap();

    let err = setup_associations("User", &registry, &db).unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::Association(AssociationError::TargetNotInitialized { ref target, .. })
            if target == "posts"
    ));

    init_model(&post, &mut post_state, &mut registry, &db, ParseMode::Lenient).unwrap();
    assert_eq!(setup_associations("User", &registry, &db).unwrap(), 1);
}

#[test]
fn test_separate_contexts_do_not_share_registries() {
    let first_db = blog_database();
    let second_db = blog_database();

    let first = BootstrapContext::new(&first_db, ParseMode::Lenient)
        .run(&catalog(Arc::new(AtomicUsize::new(0))))
        .unwrap();
    let second = BootstrapContext::new(&second_db, ParseMode::Lenient)
        .run(&ModelCatalog::new().register("post.rs", || Ok(ModelDeclaration::new("Post"))))
        .unwrap();

    assert_eq!(first.registry().len(), 2);
    assert_eq!(second.registry().len(), 1);
    assert!(!second.registry().contains("User"));
}
