//! Bearer token authentication primitives
//!
//! # Architecture
//!
//! - Every `/api` request carries `Authorization: Bearer <token>`
//! - Tokens are provisioned through the bootstrap TOML and stored hashed
//!   (SHA-256, hex) in the `api_tokens` table; the plain token never touches
//!   the database
//! - A resolved token yields an [`AuthContext`] (user id + role) which is
//!   passed explicitly into every operation that needs it
//!
//! This module contains ONLY pure functions and database operations.
//! No HTTP framework dependencies; the middleware lives in the service crate.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;

// ========================================
// Roles
// ========================================

/// Dashboard roles of the traceability product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Collector,
    Farmer,
    Tester,
    Manufacturer,
    Consumer,
}

impl Role {
    /// Downstream approver: may create batches and approve stages
    pub fn can_approve_stages(&self) -> bool {
        matches!(self, Role::Collector | Role::Admin)
    }

    /// Upstream party: may submit stage evidence
    pub fn can_submit_evidence(&self) -> bool {
        matches!(self, Role::Farmer | Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Collector => "collector",
            Role::Farmer => "farmer",
            Role::Tester => "tester",
            Role::Manufacturer => "manufacturer",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "collector" => Ok(Role::Collector),
            "farmer" => Ok(Role::Farmer),
            "tester" => Ok(Role::Tester),
            "manufacturer" => Ok(Role::Manufacturer),
            "consumer" => Ok(Role::Consumer),
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }
}

// ========================================
// Context and errors
// ========================================

/// Identity of the caller, resolved from its bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No Authorization header present
    MissingToken,

    /// Authorization header is not `Bearer <token>`
    MalformedHeader,

    /// Token is not provisioned
    UnknownToken,

    /// Role name not recognised
    UnknownRole(String),

    /// Database error looking up or storing tokens
    DatabaseError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing bearer token"),
            AuthError::MalformedHeader => write!(f, "Malformed Authorization header"),
            AuthError::UnknownToken => write!(f, "Unknown or revoked token"),
            AuthError::UnknownRole(role) => write!(f, "Unknown role: {}", role),
            AuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for AuthError {}

// ========================================
// Pure functions
// ========================================

/// SHA-256 hex digest of a token, as stored in `api_tokens`
///
/// ```
/// use ayu_common::auth::hash_token;
///
/// let hash = hash_token("secret");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, hash_token("secret"));
/// ```
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract the token from an Authorization header value
///
/// The scheme is matched case-insensitively; surrounding whitespace is ignored.
pub fn parse_bearer(header_value: Option<&str>) -> Result<&str, AuthError> {
    let value = header_value.ok_or(AuthError::MissingToken)?.trim();
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

// ========================================
// Token storage
// ========================================

/// Create the `api_tokens` table if missing
pub async fn ensure_token_table(db: &SqlitePool) -> Result<(), AuthError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_tokens (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(db)
    .await
    .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
    Ok(())
}

/// Store (or re-assign) a token for a user
pub async fn store_token(
    db: &SqlitePool,
    token: &str,
    context: &AuthContext,
) -> Result<(), AuthError> {
    sqlx::query(
        "INSERT OR REPLACE INTO api_tokens (token_hash, user_id, role) VALUES (?, ?, ?)",
    )
    .bind(hash_token(token))
    .bind(&context.user_id)
    .bind(context.role.as_str())
    .execute(db)
    .await
    .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
    Ok(())
}

/// Resolve a plain token to the caller's identity
pub async fn lookup_token(db: &SqlitePool, token: &str) -> Result<AuthContext, AuthError> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT user_id, role FROM api_tokens WHERE token_hash = ?")
            .bind(hash_token(token))
            .fetch_optional(db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

    let (user_id, role) = row.ok_or(AuthError::UnknownToken)?;
    Ok(AuthContext {
        user_id,
        role: role.parse()?,
    })
}
