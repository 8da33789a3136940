//! Local account handling: registration, login, remembered sessions. All
//! state lives in the database (users table plus one settings key), so a
//! restart resumes whatever session was last stored.

use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::UserRecord;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const SESSION_KEY: &str = "auth_session";
const MIN_PASSWORD_LEN: usize = 6;
const REMEMBER_TOKEN_BYTES: usize = 32;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

/// Why an auth attempt was refused. Distinct from `AppError`: a wrong
/// password is an expected outcome, not a failure of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDenied {
    EmailTaken,
    IncorrectCredentials,
}

#[derive(Debug)]
pub enum AuthOutcome {
    Granted(UserRecord),
    Denied(AuthDenied),
}

/// Session record persisted under a settings key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    user_id: i64,
    remember_token: Option<String>,
    logged_in_at: DateTime<Utc>,
}

pub struct AuthStore {
    db: Arc<Database>,
}

impl AuthStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Creates an account and opens a session for it. Input problems are
    /// `Validation` errors; a taken email is a typed denial.
    pub fn register(&self, name: &str, email: &str, password: &str) -> AppResult<AuthOutcome> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;
        if name.trim().is_empty() {
            return Err(AppError::Validation("name must not be blank".to_string()));
        }
        if self.db.user_by_email(&email)?.is_some() {
            return Ok(AuthOutcome::Denied(AuthDenied::EmailTaken));
        }

        let user = self
            .db
            .insert_user(name, &email, &hash_password(&email, password))?;
        self.db.touch_last_login(user.id)?;
        self.store_session(user.id, None)?;
        tracing::info!(user_id = user.id, "registered account");
        Ok(AuthOutcome::Granted(user))
    }

    /// Verifies credentials and opens a session. With `remember` set, a fresh
    /// random token is written to the user row so the session survives
    /// restarts until `logout` revokes it.
    pub fn login(&self, email: &str, password: &str, remember: bool) -> AppResult<AuthOutcome> {
        let email = normalize_email(email);
        let Some(user) = self
            .db
            .user_by_credentials(&email, &hash_password(&email, password))?
        else {
            return Ok(AuthOutcome::Denied(AuthDenied::IncorrectCredentials));
        };

        let token = if remember {
            let token = generate_remember_token();
            self.db.set_remember_token(user.id, Some(&token))?;
            Some(token)
        } else {
            self.db.set_remember_token(user.id, None)?;
            None
        };
        self.db.touch_last_login(user.id)?;
        self.store_session(user.id, token)?;
        tracing::info!(user_id = user.id, remember, "login");
        Ok(AuthOutcome::Granted(user))
    }

    /// Resumes the stored session, if any. A session carrying a remember
    /// token is checked against the user row; a mismatch (token revoked
    /// elsewhere) clears the stale session.
    pub fn current_user(&self) -> AppResult<Option<UserRecord>> {
        let Some(session) = self.db.get_setting::<StoredSession>(SESSION_KEY)? else {
            return Ok(None);
        };
        let user = match &session.remember_token {
            Some(token) => self.db.user_by_remember_token(session.user_id, token)?,
            None => self
                .db
                .user_by_id(session.user_id)?
                .filter(|user| user.is_active),
        };
        if user.is_none() {
            tracing::warn!(user_id = session.user_id, "clearing stale session");
            self.db.delete_setting(SESSION_KEY)?;
        }
        Ok(user)
    }

    /// Ends the session. With `forget` set the remember token is revoked,
    /// which also invalidates any other stored copy of it.
    pub fn logout(&self, forget: bool) -> AppResult<()> {
        if let Some(session) = self.db.get_setting::<StoredSession>(SESSION_KEY)? {
            if forget {
                self.db.set_remember_token(session.user_id, None)?;
            }
            tracing::info!(user_id = session.user_id, "logout");
        }
        self.db.delete_setting(SESSION_KEY)?;
        Ok(())
    }

    pub fn change_password(&self, email: &str, old: &str, new: &str) -> AppResult<AuthOutcome> {
        let email = normalize_email(email);
        validate_password(new)?;
        let Some(user) = self
            .db
            .user_by_credentials(&email, &hash_password(&email, old))?
        else {
            return Ok(AuthOutcome::Denied(AuthDenied::IncorrectCredentials));
        };
        self.db
            .set_password_hash(user.id, &hash_password(&email, new))?;
        // Old remember tokens die with the old password.
        self.db.set_remember_token(user.id, None)?;
        Ok(AuthOutcome::Granted(user))
    }

    fn store_session(&self, user_id: i64, remember_token: Option<String>) -> AppResult<()> {
        self.db.set_setting(
            SESSION_KEY,
            &StoredSession {
                user_id,
                remember_token,
                logged_in_at: Utc::now(),
            },
        )
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> AppResult<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("'{}' is not a valid email", email)))
    }
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// SHA-256 over email and password, hex encoded. The email acts as the salt,
/// so identical passwords on different accounts never share a digest.
fn hash_password(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b"\0");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

fn generate_remember_token() -> String {
    let mut bytes = [0u8; REMEMBER_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::{hash_password, AuthDenied, AuthOutcome, AuthStore};
    use crate::db::Database;
    use crate::errors::AppError;
    use std::sync::Arc;

    fn store(dir: &tempfile::TempDir) -> AuthStore {
        let db = Arc::new(Database::open(&dir.path().join("auth.db")).expect("db"));
        AuthStore::new(db)
    }

    #[test]
    fn register_then_login_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = store(&dir);

        let outcome = auth
            .register("Student", "student@example.com", "hunter22")
            .expect("register");
        assert!(matches!(outcome, AuthOutcome::Granted(_)));

        let outcome = auth
            .login("student@example.com", "hunter22", false)
            .expect("login");
        let AuthOutcome::Granted(user) = outcome else {
            panic!("expected granted login");
        };
        assert_eq!(user.email, "student@example.com");
    }

    #[test]
    fn wrong_password_is_a_denial_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = store(&dir);
        auth.register("Student", "student@example.com", "hunter22")
            .expect("register");

        let outcome = auth
            .login("student@example.com", "wrong-pass", false)
            .expect("login call");
        assert!(matches!(
            outcome,
            AuthOutcome::Denied(AuthDenied::IncorrectCredentials)
        ));
    }

    #[test]
    fn duplicate_email_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = store(&dir);
        auth.register("First", "dup@example.com", "hunter22")
            .expect("register");

        let outcome = auth
            .register("Second", "DUP@example.com", "hunter33")
            .expect("register call");
        assert!(matches!(outcome, AuthOutcome::Denied(AuthDenied::EmailTaken)));
    }

    #[test]
    fn malformed_email_fails_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = store(&dir);
        let result = auth.register("Student", "not-an-email", "hunter22");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn short_password_fails_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = store(&dir);
        let result = auth.register("Student", "student@example.com", "abc");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn remembered_session_survives_a_new_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::open(&dir.path().join("auth.db")).expect("db"));
        let auth = AuthStore::new(Arc::clone(&db));
        auth.register("Student", "student@example.com", "hunter22")
            .expect("register");
        auth.login("student@example.com", "hunter22", true)
            .expect("login");

        // A second store over the same database sees the session.
        let resumed = AuthStore::new(db);
        let user = resumed.current_user().expect("resume").expect("session");
        assert_eq!(user.email, "student@example.com");
    }

    #[test]
    fn logout_with_forget_revokes_the_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = store(&dir);
        auth.register("Student", "student@example.com", "hunter22")
            .expect("register");
        auth.login("student@example.com", "hunter22", true)
            .expect("login");

        auth.logout(true).expect("logout");
        assert!(auth.current_user().expect("resume").is_none());
    }

    #[test]
    fn change_password_invalidates_the_old_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = store(&dir);
        auth.register("Student", "student@example.com", "hunter22")
            .expect("register");

        let outcome = auth
            .change_password("student@example.com", "hunter22", "hunter99")
            .expect("change");
        assert!(matches!(outcome, AuthOutcome::Granted(_)));

        let old = auth
            .login("student@example.com", "hunter22", false)
            .expect("login call");
        assert!(matches!(old, AuthOutcome::Denied(_)));
        let new = auth
            .login("student@example.com", "hunter99", false)
            .expect("login call");
        assert!(matches!(new, AuthOutcome::Granted(_)));
    }

    #[test]
    fn digests_are_salted_by_email() {
        assert_ne!(
            hash_password("a@example.com", "same-password"),
            hash_password("b@example.com", "same-password")
        );
    }
}
