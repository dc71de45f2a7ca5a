// User accounts
//
// Users register with a username, email and password, then log in by email to
// obtain a bearer token. Only the salted password digest is ever stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{ExploraError, Result};

pub const MAX_USERNAME_LEN: usize = 80;
pub const MAX_EMAIL_LEN: usize = 120;

/// Prefix of every stored password digest
const HASH_SCHEME: &str = "sha256";

/// Opaque user identifier, assigned by the persistence layer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered account
///
/// Has no `Serialize` impl; HTTP responses use `api::types::UserView`.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn check_password(&self, password: &str) -> bool {
        verify_password(password, &self.password_hash)
    }
}

/// A validated account waiting for an id
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

impl NewUser {
    /// Validate the fields and hash `password`
    pub fn with_password(
        username: impl Into<String>,
        email: impl Into<String>,
        password: &str,
    ) -> Result<Self> {
        let username = username.into().trim().to_string();
        let email = email.into().trim().to_string();

        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(ExploraError::InvalidInput(
                "Missing username, email or password".to_string(),
            ));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(ExploraError::InvalidInput(format!(
                "username must be at most {} characters",
                MAX_USERNAME_LEN
            )));
        }
        if email.chars().count() > MAX_EMAIL_LEN {
            return Err(ExploraError::InvalidInput(format!(
                "email must be at most {} characters",
                MAX_EMAIL_LEN
            )));
        }

        Ok(Self {
            username,
            email,
            password_hash: hash_password(password),
            is_admin: false,
        })
    }

    pub fn admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            is_admin: self.is_admin,
            created_at: Utc::now(),
        }
    }
}

fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a password as `sha256$<salt>$<hex digest>` with a fresh random salt
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = salted_digest(&salt, password);
    format!("{}${}${}", HASH_SCHEME, salt, digest)
}

/// Check `password` against a value produced by [`hash_password`]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(scheme), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }

    let actual = salted_digest(salt, password);
    // Compare every byte so timing does not depend on the first mismatch
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
