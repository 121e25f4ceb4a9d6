//! Access gate shared by the file and text stores.
//!
//! `privacy` is the single source of truth: public artifacts are always
//! readable, private ones only with the exact password they were saved with.
//! The stored password hash is present if and only if the artifact is private.

use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::models::{FileArtifact, Privacy, TextArtifact};

pub trait Gated {
    fn id(&self) -> Uuid;
    fn privacy(&self) -> Privacy;
    fn password_hash(&self) -> Option<&str>;

    /// Drop whatever the gate protects, leaving only metadata.
    fn conceal(&mut self);

    /// Conceal unless public.
    fn redacted(mut self) -> Self
    where
        Self: Sized,
    {
        if self.privacy() == Privacy::Private {
            self.conceal();
        }
        self
    }
}

impl Gated for FileArtifact {
    fn id(&self) -> Uuid {
        self.id
    }

    fn privacy(&self) -> Privacy {
        self.privacy
    }

    fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    fn conceal(&mut self) {
        self.file_url.clear();
    }
}

impl Gated for TextArtifact {
    fn id(&self) -> Uuid {
        self.id
    }

    fn privacy(&self) -> Privacy {
        self.privacy
    }

    fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    fn conceal(&mut self) {
        self.content.clear();
    }
}

/// Decide whether `presented` unlocks `artifact`. An absent password never
/// matches a private artifact, not even one saved with the empty password.
pub async fn check_access(artifact: &impl Gated, presented: Option<&str>) -> ApiResult<()> {
    if artifact.privacy() == Privacy::Public {
        return Ok(());
    }

    let granted = match (artifact.password_hash(), presented) {
        (Some(hash), Some(password)) => {
            verify_password(password.to_string(), hash.to_string()).await?
        }
        _ => false,
    };

    if granted {
        Ok(())
    } else {
        tracing::warn!(id = %artifact.id(), "incorrect password");
        Err(ApiError::Forbidden("Incorrect password".into()))
    }
}

/// Privacy and password as they should be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protection {
    pub privacy: Privacy,
    pub password_hash: Option<String>,
}

/// Protection for a new artifact. Passwords on public artifacts are dropped;
/// a private artifact without one gets the empty password.
pub async fn protect_new(
    privacy: Privacy,
    password: Option<String>,
    bcrypt_cost: u32,
) -> ApiResult<Protection> {
    let password_hash = match privacy {
        Privacy::Public => None,
        Privacy::Private => Some(hash_password(password.unwrap_or_default(), bcrypt_cost).await?),
    };
    Ok(Protection {
        privacy,
        password_hash,
    })
}

/// Protection after an update, and whether it differs from `current`.
///
/// - privacy omitted: privacy kept; a password only applies to private artifacts
/// - `public`: password cleared
/// - `private`: password set to the given value, or the empty password
pub async fn protect_update(
    current: &impl Gated,
    privacy: Option<Privacy>,
    password: Option<String>,
    bcrypt_cost: u32,
) -> ApiResult<(Protection, bool)> {
    let target = privacy.unwrap_or(current.privacy());

    if target == Privacy::Public {
        let changed = current.privacy() != Privacy::Public;
        return Ok((
            Protection {
                privacy: Privacy::Public,
                password_hash: None,
            },
            changed,
        ));
    }

    let desired = match (password, privacy) {
        (Some(p), _) => Some(p),
        (None, Some(Privacy::Private)) => Some(String::new()),
        (None, _) => None,
    };

    if let Some(hash) = current.password_hash() {
        let keep = match &desired {
            None => true,
            Some(password) => verify_password(password.clone(), hash.to_string()).await?,
        };
        if keep {
            return Ok((
                Protection {
                    privacy: Privacy::Private,
                    password_hash: Some(hash.to_string()),
                },
                false,
            ));
        }
    }

    let hash = hash_password(desired.unwrap_or_default(), bcrypt_cost).await?;
    Ok((
        Protection {
            privacy: Privacy::Private,
            password_hash: Some(hash),
        },
        true,
    ))
}
