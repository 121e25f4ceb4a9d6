use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::auth::Claims;
use crate::error::ApiResult;
use crate::files::{FileUpdate, NewFile};
use crate::models::UpdateOutcome;
use crate::routes::AppState;
use crate::texts::{NewText, TextUpdate};
use crate::users::{self, RegisterUser};
use crate::validate::{parse_id, required, JsonBody};

#[derive(Debug, Default, Deserialize)]
pub struct OwnerQuery {
    email: Option<String>,
}

impl OwnerQuery {
    fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    id: Option<String>,
    password: Option<String>,
}

/// Header carrying the password for reads of a single private artifact.
pub const SHARE_PASSWORD_HEADER: &str = "x-share-password";

fn presented_password(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SHARE_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
}

fn requester(claims: &Option<Extension<Claims>>) -> Option<String> {
    claims
        .as_ref()
        .and_then(|Extension(c)| c.identity.get("email"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn update_ack(outcome: UpdateOutcome, noun: &str) -> Json<Value> {
    match outcome {
        UpdateOutcome::Modified => Json(json!({
            "success": true,
            "modified": true,
            "message": format!("{noun} updated successfully."),
        })),
        UpdateOutcome::Unchanged => Json(json!({
            "success": true,
            "modified": false,
            "message": "No changes made",
        })),
    }
}

pub async fn root() -> &'static str {
    "ShareLink server is running"
}

pub async fn issue_token(
    State(state): State<AppState>,
    JsonBody(identity): JsonBody<Map<String, Value>>,
) -> ApiResult<Json<Value>> {
    let token = state.tokens.issue(identity)?;
    Ok(Json(json!({ "token": token })))
}

pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(user): JsonBody<RegisterUser>,
) -> ApiResult<Response> {
    let uid = user.uid.clone();
    let created = users::register(&state.db, user).await?;
    let stored = match uid {
        Some(uid) => users::find(&state.db, &uid).await?,
        None => None,
    };

    let (status, message) = if created {
        (StatusCode::CREATED, "User created")
    } else {
        (StatusCode::OK, "User already exists")
    };
    Ok((
        status,
        Json(json!({
            "success": true,
            "created": created,
            "message": message,
            "user": stored,
        })),
    )
        .into_response())
}

pub async fn create_file(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    JsonBody(file): JsonBody<NewFile>,
) -> ApiResult<Response> {
    let id = state.files.create(file).await?;
    if let Some(by) = requester(&claims) {
        tracing::debug!(%id, %by, "file saved by authenticated user");
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "File data saved successfully",
            "data": { "insertedId": id },
        })),
    )
        .into_response())
}

/// GET /upload: every file, optionally narrowed to one owner.
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Response> {
    let files = state.files.list(query.email()).await?;
    Ok(Json(files).into_response())
}

/// GET /uploads: the files of one owner; `email` is mandatory.
pub async fn list_owner_files(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Response> {
    let email = required(query.email, "email")?;
    let files = state.files.list(Some(&email)).await?;
    Ok(Json(files).into_response())
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let file = state
        .files
        .open(parse_id(&id)?, presented_password(&headers))
        .await?;
    Ok(Json(file).into_response())
}

pub async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<FileUpdate>,
) -> ApiResult<Json<Value>> {
    let outcome = state.files.update(parse_id(&id)?, update).await?;
    Ok(update_ack(outcome, "File"))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.files.delete(parse_id(&id)?).await?;
    Ok(Json(
        json!({ "success": true, "message": "File deleted successfully" }),
    ))
}

pub async fn check_file_password(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AccessRequest>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&required(request.id, "id")?)?;
    let file_url = state
        .files
        .check_access(id, request.password.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "fileUrl": file_url })))
}

pub async fn save_text(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    JsonBody(text): JsonBody<NewText>,
) -> ApiResult<Json<Value>> {
    let (id, link) = state.texts.create(text).await?;
    if let Some(by) = requester(&claims) {
        tracing::debug!(%id, %by, "text saved by authenticated user");
    }
    Ok(Json(
        json!({ "success": true, "textId": id, "textLink": link }),
    ))
}

pub async fn list_texts(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Json<Value>> {
    let texts = state.texts.list(query.email()).await?;
    Ok(Json(json!({ "success": true, "texts": texts })))
}

pub async fn get_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let text = state
        .texts
        .open(parse_id(&id)?, presented_password(&headers))
        .await?;
    Ok(Json(json!({ "success": true, "content": text.content })))
}

pub async fn update_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<TextUpdate>,
) -> ApiResult<Json<Value>> {
    let outcome = state.texts.update(parse_id(&id)?, update).await?;
    Ok(update_ack(outcome, "Text"))
}

pub async fn delete_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.texts.delete(parse_id(&id)?).await?;
    Ok(Json(
        json!({ "success": true, "message": "Text has been deleted." }),
    ))
}

pub async fn check_text_password(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AccessRequest>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&required(request.id, "id")?)?;
    let link = state
        .texts
        .check_access(id, request.password.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "textContent": link })))
}
