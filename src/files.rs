use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use uuid::Uuid;

use crate::access::{self, Gated, Protection};
use crate::db::DbConnection;
use crate::error::{ApiError, ApiResult};
use crate::models::{FileArtifact, Privacy, UpdateOutcome};
use crate::validate::{parse_privacy, required};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub username: Option<String>,
    pub email: Option<String>,
    pub file_url: Option<String>,
    pub privacy: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdate {
    pub file_url: Option<String>,
    pub privacy: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    pub conn: DbConnection,
    pub bcrypt_cost: u32,
}

impl FileStore {
    pub async fn create(&self, file: NewFile) -> ApiResult<Uuid> {
        let username = required(file.username, "username")?;
        let email = required(file.email, "email")?;
        let file_url = required(file.file_url, "fileUrl")?;
        let privacy = parse_privacy(file.privacy.as_deref())?.unwrap_or(Privacy::Public);
        let Protection {
            privacy,
            password_hash,
        } = access::protect_new(privacy, file.password, self.bcrypt_cost).await?;

        let id = Uuid::new_v4();
        self.conn.lock().await.execute(
            "INSERT INTO files (id, username, email, file_url, privacy, password_hash, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id.to_string(),
                username,
                email,
                file_url,
                privacy.as_str(),
                password_hash,
                Utc::now().to_rfc3339()
            ],
        )?;

        tracing::info!(%id, %privacy, "saved file");
        Ok(id)
    }

    /// All files, or only those owned by `email`, with private URLs withheld.
    /// An empty result is not an error.
    pub async fn list(&self, email: Option<&str>) -> ApiResult<Vec<FileArtifact>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files WHERE (?1 IS NULL OR email = ?1) ORDER BY uploaded_at",
            FileArtifact::COLUMNS
        ))?;
        let files = stmt
            .query_map(params![email], FileArtifact::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files.into_iter().map(FileArtifact::redacted).collect())
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<FileArtifact> {
        fetch(&*self.conn.lock().await, id)
    }

    /// The full record, once the access gate lets `password` through.
    pub async fn open(&self, id: Uuid, password: Option<&str>) -> ApiResult<FileArtifact> {
        let file = self.get(id).await?;
        access::check_access(&file, password).await?;
        Ok(file)
    }

    pub async fn update(&self, id: Uuid, update: FileUpdate) -> ApiResult<UpdateOutcome> {
        let file_url = required(update.file_url, "fileUrl")?;
        let privacy = parse_privacy(update.privacy.as_deref())?;

        // Held until the write so the change is decided against the latest record.
        let conn = self.conn.lock().await;
        let current = fetch(&conn, id)?;
        let (protection, protection_changed) =
            access::protect_update(&current, privacy, update.password, self.bcrypt_cost).await?;

        if !protection_changed && file_url == current.file_url {
            return Ok(UpdateOutcome::Unchanged);
        }

        let updated = conn.execute(
            "UPDATE files SET file_url = ?, privacy = ?, password_hash = ?, updated_at = ? WHERE id = ?",
            params![
                file_url,
                protection.privacy.as_str(),
                protection.password_hash,
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )?;
        if updated == 0 {
            return Err(ApiError::not_found("File not found"));
        }

        tracing::info!(%id, privacy = %protection.privacy, "updated file");
        Ok(UpdateOutcome::Modified)
    }

    pub async fn delete(&self, id: Uuid) -> ApiResult<()> {
        let deleted = self
            .conn
            .lock()
            .await
            .execute("DELETE FROM files WHERE id = ?", [id.to_string()])?;
        if deleted == 0 {
            return Err(ApiError::not_found("File not found"));
        }
        tracing::info!(%id, "deleted file");
        Ok(())
    }

    /// Run the access gate and hand out the file URL on success.
    pub async fn check_access(&self, id: Uuid, password: Option<&str>) -> ApiResult<String> {
        Ok(self.open(id, password).await?.file_url)
    }
}

fn fetch(conn: &Connection, id: Uuid) -> ApiResult<FileArtifact> {
    conn.query_row(
        &format!("SELECT {} FROM files WHERE id = ?", FileArtifact::COLUMNS),
        [id.to_string()],
        FileArtifact::from_row,
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("File not found"))
}
