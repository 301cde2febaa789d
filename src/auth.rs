//! Bearer-token authentication.
//!
//! Tokens are opaque random strings handed to the client once; only their
//! SHA-256 digest is stored. Passwords are kept as bcrypt hashes, and
//! logging in is how a user gets a fresh token once the old one expires.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

use crate::db::{DbUser, ScheduleDb, UserId};
use crate::error::ScheduleError;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;
/// Upper bound on a configured session lifetime.
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;
pub const MIN_PASSWORD_LEN: usize = 8;

#[cfg(not(test))]
const BCRYPT_COST: u32 = 10;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Validate and hash a new password for storage.
pub fn hash_password(raw: &str) -> Result<String, ScheduleError> {
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(ScheduleError::invalid(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    bcrypt::hash(raw, BCRYPT_COST)
        .map_err(|e| ScheduleError::Configuration(format!("password hashing failed: {}", e)))
}

fn password_matches(raw: &str, stored: &str) -> bool {
    match bcrypt::verify(raw, stored) {
        Ok(matches) => matches,
        Err(e) => {
            log::warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Resolves bearer tokens to users and mints new ones.
pub struct SessionAuthenticator {
    ttl: Duration,
}

impl SessionAuthenticator {
    /// Lifetimes outside `1..=MAX_SESSION_TTL_DAYS` are clamped.
    pub fn new(ttl_days: i64) -> Self {
        Self {
            ttl: Duration::days(ttl_days.clamp(1, MAX_SESSION_TTL_DAYS)),
        }
    }

    /// Mint a token for `user_id`. The raw token is only ever returned here.
    pub fn issue(&self, db: &ScheduleDb, user_id: UserId) -> Result<String, ScheduleError> {
        if db.get_user(user_id)?.is_none() {
            return Err(ScheduleError::NotFound(format!("User {}", user_id)));
        }
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let expires_at = Utc::now().checked_add_signed(self.ttl).ok_or_else(|| {
            ScheduleError::Configuration("session lifetime overflows the clock".to_string())
        })?;
        db.insert_session(&hash_token(&token), user_id, expires_at)?;
        Ok(token)
    }

    /// Exchange a username (or email) and password for a new token.
    ///
    /// Every mismatch reports `Unauthenticated` so callers cannot tell a
    /// missing account from a wrong password.
    pub fn login(
        &self,
        db: &ScheduleDb,
        identifier: &str,
        password: &str,
    ) -> Result<(DbUser, String), ScheduleError> {
        let (user, stored) = db
            .get_login(identifier.trim())?
            .ok_or(ScheduleError::Unauthenticated)?;
        let stored = stored.ok_or(ScheduleError::Unauthenticated)?;
        if !password_matches(password, &stored) {
            log::info!("Failed login for user {}", user.id);
            return Err(ScheduleError::Unauthenticated);
        }
        let token = self.issue(db, user.id)?;
        Ok((user, token))
    }

    pub fn verify(&self, db: &ScheduleDb, token: &str) -> Result<UserId, ScheduleError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ScheduleError::Unauthenticated);
        }
        let user_id = db
            .get_session_user(&hash_token(token), Utc::now())?
            .ok_or(ScheduleError::Unauthenticated)?;
        // A deleted account invalidates its sessions.
        if db.get_user(user_id)?.is_none() {
            return Err(ScheduleError::Unauthenticated);
        }
        Ok(user_id)
    }

    pub fn revoke(&self, db: &ScheduleDb, token: &str) -> Result<(), ScheduleError> {
        db.delete_session(&hash_token(token.trim()))?;
        Ok(())
    }
}

impl Default for SessionAuthenticator {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_DAYS)
    }
}
