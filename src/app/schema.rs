//! Demo tables and seed data.

use serde_json::json;
use tracing::info;

use crate::db::MemoryDatabase;
use crate::error::PersistError;

pub fn migrate(db: &MemoryDatabase) {
    db.create_table(
        "users",
        &["id", "name", "last_name", "email", "created_at", "updated_at"],
    );
    db.create_table(
        "posts",
        &["id", "title", "message", "user_id", "created_at", "updated_at"],
    );
    db.create_table(
        "comments",
        &["id", "content", "user_id", "post_id", "created_at", "updated_at"],
    );
}

/// Replace the users table contents. Returns the number of rows inserted.
pub fn seed(db: &MemoryDatabase) -> Result<usize, PersistError> {
    db.truncate("users")?;

    let now = chrono::Utc::now().to_rfc3339();
    let users = [
        ("Admin User", "admin@example.com"),
        ("John Doe", "john@example.com"),
        ("Jane Smith", "jane@example.com"),
    ];
    for (name, email) in users {
        db.insert_raw(
            "users",
            json!({ "name": name, "email": email, "created_at": now, "updated_at": now }),
        )?;
    }

    info!("Users seeded successfully");
    Ok(users.len())
}
