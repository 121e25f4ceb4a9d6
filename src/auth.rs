use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::{ApiError, ApiResult};

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no bearer token presented")]
    Missing,
    #[error("bearer token rejected")]
    Invalid,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Decoded token payload: the identity the token was issued for plus its validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub identity: Map<String, Value>,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and verifies HS256 bearer tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenIssuer {
    mac: HmacSha256,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| anyhow::anyhow!("invalid token secret: {e}"))?;
        Ok(Self { mac })
    }

    pub fn issue(&self, identity: Map<String, Value>) -> ApiResult<String> {
        self.issue_at(identity, Utc::now().timestamp())
    }

    pub fn issue_at(&self, mut identity: Map<String, Value>, now: i64) -> ApiResult<String> {
        identity.remove("iat");
        identity.remove("exp");
        let claims = Claims {
            identity,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        let header = Header {
            alg: "HS256".into(),
            typ: "JWT".into(),
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&signing_input));
        Ok(format!("{signing_input}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Invalid);
        };

        let decoded: Header = decode_segment(header)?;
        if decoded.alg != "HS256" {
            return Err(AuthError::Invalid);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Invalid)?;
        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::Invalid)?;

        let claims: Claims = decode_segment(payload)?;
        if claims.exp <= now {
            return Err(AuthError::Invalid);
        }
        Ok(claims)
    }

    fn sign(&self, input: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(input.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn encode_segment<T: Serialize>(value: &T) -> ApiResult<String> {
    let bytes = serde_json::to_vec(value).map_err(|e| {
        tracing::error!(error = %e, "failed to encode token segment");
        ApiError::Server("Server error.".into())
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::Invalid)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Invalid)
}

/// Extract and verify `Authorization: Bearer <token>`.
pub fn bearer_claims(tokens: &TokenIssuer, headers: &HeaderMap) -> Result<Claims, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::Missing)?;
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthError::Invalid)?;
    tokens.verify(token.trim())
}

/// Axum middleware that rejects requests without a valid bearer token and
/// exposes the decoded [`Claims`] to downstream handlers.
pub async fn require_auth(
    State(tokens): State<Arc<TokenIssuer>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match bearer_claims(&tokens, request.headers()) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(err) => {
            tracing::warn!(error = %err, path = %request.uri().path(), "rejected request");
            Err(err.into())
        }
    }
}

// bcrypt ignores input past 72 bytes, so it is fed a fixed-length digest of
// the whole password instead.
fn prehash(password: &str) -> String {
    STANDARD.encode(Sha256::digest(password.as_bytes()))
}

pub async fn hash_password(password: String, cost: u32) -> ApiResult<String> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(prehash(&password), cost)).await??)
}

pub async fn verify_password(password: String, hash: String) -> ApiResult<bool> {
    Ok(tokio::task::spawn_blocking(move || {
        bcrypt::verify(prehash(&password), &hash).unwrap_or(false)
    })
    .await?)
}
