use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::Privacy;

/// `Json` whose rejections (bad syntax, wrong field types, missing content
/// type) surface as a 400 [`ApiError::Validation`].
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// A required string field. Absent and blank values are both rejected.
pub fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::validation(format!("{field} is required"))),
    }
}

pub fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation("Invalid ID format"))
}

pub fn parse_privacy(raw: Option<&str>) -> ApiResult<Option<Privacy>> {
    raw.map(|p| {
        p.parse::<Privacy>()
            .map_err(|e| ApiError::validation(e.to_string()))
    })
    .transpose()
}
