use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::StepSet;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type SharedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    /// Turns a violated uniqueness constraint into [DatabaseError::Conflict]
    fn conflict_or(self, resource: &'static str, field: &'static str, value: &str)
        -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                DatabaseError::NotFound {
                    resource: _,
                    identifier: _,
                } => Ok(()),
                e => Err(e),
            },
        }
    }
}

/// Represents a type that can store stepwise data.
///
/// Implementations must keep these guarantees:
/// - Room names are unique, the loser of a creation race gets [DatabaseError::Conflict].
/// - Adding a member twice leaves exactly one membership.
/// - Deleting a user keeps the rooms they created, with no creator.
/// - Room steps are normalized with [StepSet::migrate] on every read.
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;
    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()>;
    /// Overwrites the points of a single room key, returning the stored value
    async fn set_user_points(&self, user_id: PrimaryKey, room_key: &str, points: i64)
        -> Result<i64>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn room_by_name(&self, name: &str) -> Result<RoomData>;
    async fn list_room_summaries(&self) -> Result<Vec<RoomSummary>>;
    async fn rooms_created_by(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>>;
    async fn rooms_joined_by(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>>;
    async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<UserData>>;
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData>;
    async fn update_room_images(
        &self,
        room_id: PrimaryKey,
        normal_images: Vec<String>,
        abnormal_images: Vec<String>,
    ) -> Result<RoomData>;
    /// Adds a member to a room, doing nothing if they already are one
    async fn add_room_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
    async fn clear_room_members(&self, room_id: PrimaryKey) -> Result<()>;
    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct NewUser {
    pub username: String,
    /// Must already be hashed
    pub password: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub profile: Profile,
    pub registration_complete: bool,
}

/// Fields that are [None] are left untouched
#[derive(Debug, Default)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    /// Replaces the whole profile
    pub profile: Option<Profile>,
    pub registration_complete: Option<bool>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    /// Must already be hashed
    pub password: Option<String>,
    /// The owner of the new room
    pub creator_id: PrimaryKey,
    /// Stored together with the room, [StepSet::new] for an empty one
    pub steps: StepSet,
}

/// Fields that are [None] are left untouched
#[derive(Debug, Default)]
pub struct UpdatedRoom {
    pub id: PrimaryKey,
    pub name: Option<String>,
    /// `Some(None)` removes the password. Must already be hashed.
    pub password: Option<Option<String>>,
    /// Replaces the whole step-set
    pub steps: Option<StepSet>,
}
