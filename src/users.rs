use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;

use crate::db::DbConnection;
use crate::error::ApiResult;
use crate::models::User;
use crate::validate::required;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUser {
    pub uid: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Store the user unless one with the same `uid` exists. Returns whether a
/// record was created; an existing record is never modified.
pub async fn register(conn: &DbConnection, user: RegisterUser) -> ApiResult<bool> {
    let uid = required(user.uid, "uid")?;
    let email = required(user.email, "email")?;

    let inserted = conn.lock().await.execute(
        "INSERT OR IGNORE INTO users (uid, email, display_name, created_at) VALUES (?, ?, ?, ?)",
        params![uid, email, user.display_name, Utc::now().to_rfc3339()],
    )?;

    if inserted > 0 {
        tracing::info!(%uid, "registered user");
    }
    Ok(inserted > 0)
}

pub async fn find(conn: &DbConnection, uid: &str) -> ApiResult<Option<User>> {
    let user = conn
        .lock()
        .await
        .query_row(
            &format!("SELECT {} FROM users WHERE uid = ?", User::COLUMNS),
            [uid],
            User::from_row,
        )
        .optional()?;
    Ok(user)
}
