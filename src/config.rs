use anyhow::{Context, Result};
use rand::Rng;
use tracing::warn;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// HMAC key for bearer tokens ($ACCESS_TOKEN_SECRET).
    pub access_token_secret: String,
    /// Prefix of every generated text link ($PUBLIC_BASE_URL).
    pub public_base_url: String,
    pub bcrypt_cost: u32,
    /// Mount bearer verification on mutating routes ($REQUIRE_AUTH).
    pub require_auth: bool,
    pub cors_origins: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid PORT: {p}"))?,
            None => 5000,
        };
        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(c) => c
                .parse()
                .with_context(|| format!("invalid BCRYPT_COST: {c}"))?,
            None => bcrypt::DEFAULT_COST,
        };
        if !(4..=31).contains(&bcrypt_cost) {
            anyhow::bail!("BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}");
        }
        let require_auth = match lookup("REQUIRE_AUTH").as_deref() {
            None | Some("") | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => anyhow::bail!("invalid REQUIRE_AUTH: {other}"),
        };
        let access_token_secret = match lookup("ACCESS_TOKEN_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("ACCESS_TOKEN_SECRET not set; tokens will not survive a restart");
                generate_secret()
            }
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "sharelink.db".into()),
            access_token_secret,
            public_base_url: lookup("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            bcrypt_cost,
            require_auth,
            cors_origins: lookup("CORS_ORIGINS"),
        })
    }
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}
