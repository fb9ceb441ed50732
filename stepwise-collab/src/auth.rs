use argon2::{
    password_hash::{self, Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use log::info;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::{
    util::random_string, DatabaseError, DatabaseResult, NewSession, NewUser, PrimaryKey, Profile,
    Role, SessionData, SharedDatabase, UpdatedUser, UserData,
};

pub struct Auth {
    db: SharedDatabase,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl From<DatabaseError> for AuthError {
    fn from(value: DatabaseError) -> Self {
        AuthError::Db(value)
    }
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: usize = 7;
    const TOKEN_LENGTH: usize = 32;

    pub fn new(db: &SharedDatabase) -> Self {
        Self { db: db.clone() }
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.db.clear_expired_sessions().await?;

        let user = self
            .db
            .user_by_username(&credentials.username)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        // Accounts created through an external login have no password to log in with
        let stored_password = user
            .password
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        let stored_password = PasswordHash::parse(stored_password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        Argon2::default()
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let expires_at = Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS as i64);

        let new_session = NewSession {
            token: random_string(Self::TOKEN_LENGTH),
            user_id: user.id,
            expires_at,
        };

        let new_session = self.db.create_session(new_session).await?;

        info!("User {} logged in", user.username);
        Ok(new_session)
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    /// Creates an account with a password. Registration is complete right away.
    pub async fn register(&self, new_account: NewAccount) -> Result<UserData, AuthError> {
        self.db
            .user_by_username(&new_account.username)
            .await
            .conflict_or_ok("user", "username", &new_account.username)?;

        let password =
            hash_secret(&new_account.password).map_err(|e| AuthError::HashError(e.to_string()))?;

        let user = self
            .db
            .create_user(NewUser {
                username: new_account.username,
                password: Some(password),
                email: new_account.email,
                first_name: new_account.first_name,
                last_name: new_account.last_name,
                role: Some(new_account.role),
                profile: new_account.profile.for_role(new_account.role),
                registration_complete: true,
            })
            .await?;

        info!("Registered {} as {}", user.username, new_account.role);
        Ok(user)
    }

    /// Sets the role and profile of an account that was created without them
    pub async fn complete_registration(
        &self,
        user_id: PrimaryKey,
        role: Role,
        profile: Profile,
    ) -> Result<UserData, DatabaseError> {
        self.db
            .update_user(UpdatedUser {
                id: user_id,
                role: Some(role),
                profile: Some(profile.for_role(role)),
                registration_complete: Some(true),
                ..Default::default()
            })
            .await
    }

    /// Changes the profile of a user. Fields that are [None] are left untouched.
    pub async fn update_profile(
        &self,
        user_id: PrimaryKey,
        changes: ProfileChanges,
    ) -> Result<UserData, DatabaseError> {
        let user = self.db.user_by_id(user_id).await?;

        let profile = Profile {
            affiliation: changes.affiliation.or(user.profile.affiliation),
            disability_type: changes.disability_type.or(user.profile.disability_type),
            disability_level: changes.disability_level.or(user.profile.disability_level),
            notes: changes.notes.or(user.profile.notes),
        };

        let profile = match user.role {
            Some(role) => profile.for_role(role),
            None => profile,
        };

        self.db
            .update_user(UpdatedUser {
                id: user_id,
                username: changes.username,
                first_name: changes.first_name,
                last_name: changes.last_name,
                profile: Some(profile),
                ..Default::default()
            })
            .await
    }

    /// Deletes a user completely. Rooms they created are kept.
    pub async fn delete_user(&self, user_id: PrimaryKey) -> Result<(), DatabaseError> {
        self.db.delete_user(user_id).await?;

        info!("Deleted user {}", user_id);
        Ok(())
    }

    pub async fn user(&self, user_id: PrimaryKey) -> Result<UserData, DatabaseError> {
        self.db.user_by_id(user_id).await
    }

    /// Returns a session if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<SessionData, DatabaseError> {
        let session = self.db.session_by_token(token).await?;

        if session.expires_at <= Utc::now() {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        Ok(session)
    }
}

/// Hashes a password or shared secret into a PHC string
pub(crate) fn hash_secret(secret: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// Checks a secret against a stored value.
/// Stored values that aren't hashes were written in plain text and are compared as is.
pub(crate) fn verify_secret(secret: &str, stored: &str) -> bool {
    match PasswordHash::parse(stored, Encoding::default()) {
        Ok(hash) => Argon2::default()
            .verify_password(secret.as_bytes(), &hash)
            .is_ok(),
        Err(_) => secret == stored,
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub profile: Profile,
}

#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub affiliation: Option<String>,
    pub disability_type: Option<String>,
    pub disability_level: Option<String>,
    pub notes: Option<String>,
}
