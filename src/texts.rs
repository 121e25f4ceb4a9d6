use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use uuid::Uuid;

use crate::access::{self, Gated, Protection};
use crate::db::DbConnection;
use crate::error::{ApiError, ApiResult};
use crate::models::{Privacy, TextArtifact, UpdateOutcome};
use crate::validate::{parse_privacy, required};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewText {
    pub content: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub privacy: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextUpdate {
    #[serde(alias = "text")]
    pub content: Option<String>,
    pub privacy: Option<String>,
    pub password: Option<String>,
}

/// Everything the text store needs beyond the connection.
#[derive(Debug, Clone)]
pub struct TextStore {
    pub conn: DbConnection,
    pub base_url: String,
    pub bcrypt_cost: u32,
}

/// Canonical retrieval link of a text.
pub fn text_link(base_url: &str, id: Uuid) -> String {
    format!("{}/text/{}", base_url.trim_end_matches('/'), id)
}

impl TextStore {
    /// Save a text; the link is derived from the generated id and written in
    /// the same insert.
    pub async fn create(&self, text: NewText) -> ApiResult<(Uuid, String)> {
        let content = required(text.content, "content")?;
        let username = required(text.username, "username")?;
        let email = required(text.email, "email")?;
        let privacy = parse_privacy(text.privacy.as_deref())?.unwrap_or(Privacy::Public);
        let Protection {
            privacy,
            password_hash,
        } = access::protect_new(privacy, text.password, self.bcrypt_cost).await?;

        let id = Uuid::new_v4();
        let link = text_link(&self.base_url, id);
        self.conn.lock().await.execute(
            "INSERT INTO texts (id, username, email, content, privacy, password_hash, text_link, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id.to_string(),
                username,
                email,
                content,
                privacy.as_str(),
                password_hash,
                link,
                Utc::now().to_rfc3339()
            ],
        )?;

        tracing::info!(%id, %privacy, "saved text");
        Ok((id, link))
    }

    /// Texts with private content withheld.
    pub async fn list(&self, email: Option<&str>) -> ApiResult<Vec<TextArtifact>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM texts WHERE (?1 IS NULL OR email = ?1) ORDER BY created_at",
            TextArtifact::COLUMNS
        ))?;
        let texts = stmt
            .query_map(params![email], TextArtifact::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(texts
            .into_iter()
            .map(|t| self.with_link(t).redacted())
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<TextArtifact> {
        self.fetch(&*self.conn.lock().await, id)
    }

    pub async fn open(&self, id: Uuid, password: Option<&str>) -> ApiResult<TextArtifact> {
        let text = self.get(id).await?;
        access::check_access(&text, password).await?;
        Ok(text)
    }

    pub async fn update(&self, id: Uuid, update: TextUpdate) -> ApiResult<UpdateOutcome> {
        let content = required(update.content, "content")?;
        let privacy = parse_privacy(update.privacy.as_deref())?;

        let conn = self.conn.lock().await;
        let current = self.fetch(&conn, id)?;
        let (protection, protection_changed) =
            access::protect_update(&current, privacy, update.password, self.bcrypt_cost).await?;

        if !protection_changed && content == current.content {
            return Ok(UpdateOutcome::Unchanged);
        }

        let updated = conn.execute(
            "UPDATE texts SET content = ?, privacy = ?, password_hash = ?, updated_at = ? WHERE id = ?",
            params![
                content,
                protection.privacy.as_str(),
                protection.password_hash,
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )?;
        if updated == 0 {
            return Err(ApiError::not_found("Text not found."));
        }

        tracing::info!(%id, privacy = %protection.privacy, "updated text");
        Ok(UpdateOutcome::Modified)
    }

    pub async fn delete(&self, id: Uuid) -> ApiResult<()> {
        let deleted = self
            .conn
            .lock()
            .await
            .execute("DELETE FROM texts WHERE id = ?", [id.to_string()])?;
        if deleted == 0 {
            return Err(ApiError::not_found("Text not found."));
        }
        tracing::info!(%id, "deleted text");
        Ok(())
    }

    /// Run the access gate and hand out the text link on success.
    pub async fn check_access(&self, id: Uuid, password: Option<&str>) -> ApiResult<String> {
        Ok(self.open(id, password).await?.text_link)
    }

    fn fetch(&self, conn: &Connection, id: Uuid) -> ApiResult<TextArtifact> {
        let text = conn
            .query_row(
                &format!("SELECT {} FROM texts WHERE id = ?", TextArtifact::COLUMNS),
                [id.to_string()],
                TextArtifact::from_row,
            )
            .optional()?
            .ok_or_else(|| ApiError::not_found("Text not found."))?;
        Ok(self.with_link(text))
    }

    // Rows written before links were stored inline may lack one.
    fn with_link(&self, mut text: TextArtifact) -> TextArtifact {
        if text.text_link.is_empty() {
            text.text_link = text_link(&self.base_url, text.id);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn store() -> TextStore {
        TextStore {
            conn: db::in_memory(),
            base_url: "https://share.example.com/".into(),
            bcrypt_cost: 4,
        }
    }

    fn paste(privacy: &str, password: Option<&str>) -> NewText {
        NewText {
            content: Some("hello".into()),
            username: Some("ana".into()),
            email: Some("a@x.com".into()),
            privacy: Some(privacy.into()),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn link_is_pure_function_of_id() {
        let id = Uuid::new_v4();
        assert_eq!(
            text_link("http://localhost:5000", id),
            format!("http://localhost:5000/text/{id}")
        );
        assert_eq!(
            text_link("http://localhost:5000/", id),
            text_link("http://localhost:5000", id)
        );
    }

    #[tokio::test]
    async fn create_stores_link_and_content() {
        let texts = store();
        let (id, link) = texts.create(paste("public", None)).await.unwrap();
        assert_eq!(link, format!("https://share.example.com/text/{id}"));

        let text = texts.get(id).await.unwrap();
        assert_eq!(text.content, "hello");
        assert_eq!(text.text_link, link);
    }

    #[tokio::test]
    async fn missing_link_is_recomputed_on_read() {
        let texts = store();
        let (id, link) = texts.create(paste("public", None)).await.unwrap();
        texts
            .conn
            .lock()
            .await
            .execute("UPDATE texts SET text_link = '' WHERE id = ?", [id.to_string()])
            .unwrap();
        assert_eq!(texts.get(id).await.unwrap().text_link, link);
    }

    #[tokio::test]
    async fn create_requires_content_and_owner() {
        let texts = store();
        let no_content = NewText {
            content: Some(String::new()),
            ..paste("public", None)
        };
        assert!(matches!(
            texts.create(no_content).await,
            Err(ApiError::Validation(_))
        ));
        let no_email = NewText {
            email: None,
            ..paste("public", None)
        };
        assert!(matches!(
            texts.create(no_email).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn empty_listing_is_not_an_error() {
        let texts = store();
        assert!(texts.list(None).await.unwrap().is_empty());
        texts.create(paste("public", None)).await.unwrap();
        assert_eq!(texts.list(None).await.unwrap().len(), 1);
        assert_eq!(texts.list(Some("a@x.com")).await.unwrap().len(), 1);
        assert!(texts.list(Some("b@x.com")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn private_text_scenario() {
        let texts = store();
        let (id, link) = texts
            .create(paste("private", Some("s3cret")))
            .await
            .unwrap();

        assert!(matches!(
            texts.check_access(id, Some("wrong")).await,
            Err(ApiError::Forbidden(_))
        ));
        assert_eq!(texts.check_access(id, Some("s3cret")).await.unwrap(), link);

        let outcome = texts
            .update(
                id,
                TextUpdate {
                    content: Some("hello".into()),
                    privacy: Some("public".into()),
                    password: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Modified);
        assert!(texts.check_access(id, Some("")).await.is_ok());
        assert!(texts.get(id).await.unwrap().password_hash.is_none());
    }

    #[tokio::test]
    async fn update_without_privacy_keeps_it() {
        let texts = store();
        let (id, _) = texts
            .create(paste("private", Some("s3cret")))
            .await
            .unwrap();
        let outcome = texts
            .update(
                id,
                TextUpdate {
                    content: Some("edited".into()),
                    ..TextUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Modified);

        let text = texts.get(id).await.unwrap();
        assert_eq!(text.content, "edited");
        assert_eq!(text.privacy, Privacy::Private);
        assert!(texts.check_access(id, Some("s3cret")).await.is_ok());
    }

    #[tokio::test]
    async fn noop_update_and_missing_record() {
        let texts = store();
        let (id, _) = texts.create(paste("public", None)).await.unwrap();
        let same = || TextUpdate {
            content: Some("hello".into()),
            ..TextUpdate::default()
        };
        assert_eq!(
            texts.update(id, same()).await.unwrap(),
            UpdateOutcome::Unchanged
        );
        assert!(matches!(
            texts.update(Uuid::new_v4(), same()).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            texts.update(id, TextUpdate::default()).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn private_content_needs_password() {
        let texts = store();
        let (id, link) = texts
            .create(paste("private", Some("s3cret")))
            .await
            .unwrap();

        let listed = texts.list(None).await.unwrap();
        assert!(listed[0].content.is_empty());
        assert_eq!(listed[0].text_link, link);

        assert!(matches!(
            texts.open(id, None).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            texts.open(id, Some("wrong")).await,
            Err(ApiError::Forbidden(_))
        ));
        assert_eq!(texts.open(id, Some("s3cret")).await.unwrap().content, "hello");
    }

    #[tokio::test]
    async fn concurrent_password_changes_serialize() {
        let texts = store();
        let (id, _) = texts.create(paste("public", None)).await.unwrap();
        let lock = || TextUpdate {
            content: Some("hello".into()),
            privacy: Some("private".into()),
            password: Some("pw".into()),
        };

        let (a, b) = tokio::join!(texts.update(id, lock()), texts.update(id, lock()));
        let modified = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(|o| *o == UpdateOutcome::Modified)
            .count();
        assert_eq!(modified, 1);
        assert!(texts.check_access(id, Some("pw")).await.is_ok());
    }

    #[tokio::test]
    async fn delete_twice() {
        let texts = store();
        let (id, _) = texts.create(paste("public", None)).await.unwrap();
        assert!(texts.delete(id).await.is_ok());
        assert!(matches!(
            texts.delete(id).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
