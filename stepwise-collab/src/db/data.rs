use std::{collections::HashMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StepSet;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// What an account is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Creates and configures rooms
    #[serde(rename = "admin")]
    Admin,
    /// Joins rooms and follows their instructions
    #[serde(rename = "user")]
    Participant,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown role {0}")]
pub struct UnknownRole(String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Participant => "user",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::Participant),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile attributes of an account.
/// Which ones are kept depends on the [Role] of the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub affiliation: Option<String>,
    pub disability_type: Option<String>,
    pub disability_level: Option<String>,
    pub notes: Option<String>,
}

impl Profile {
    /// Drops the attributes that don't apply to the given role.
    /// Admins keep their affiliation, participants keep their disability information.
    pub fn for_role(self, role: Role) -> Self {
        match role {
            Role::Admin => Self {
                affiliation: self.affiliation,
                disability_type: None,
                disability_level: None,
                notes: self.notes,
            },
            Role::Participant => Self {
                affiliation: None,
                disability_type: self.disability_type,
                disability_level: self.disability_level,
                notes: self.notes,
            },
        }
    }
}

/// A stepwise account
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    /// The hashed password, missing for accounts created through an external login
    pub password: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Missing until registration is completed
    pub role: Option<Role>,
    pub profile: Profile,
    pub registration_complete: bool,
    /// Points per room, keyed by the room id rendered as a string
    pub points: HashMap<String, i64>,
}

impl UserData {
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    /// Returns the points in a room, or 0 if none were ever recorded
    pub fn points_in(&self, room_key: &str) -> i64 {
        self.points.get(room_key).copied().unwrap_or(0)
    }
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A room with its instructions, classification images, and members
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: PrimaryKey,
    /// Unique across all rooms
    pub name: String,
    /// The hashed shared secret required to join, if any
    pub password: Option<String>,
    /// Always normalized, see [StepSet::migrate]
    pub steps: StepSet,
    pub normal_images: Vec<String>,
    pub abnormal_images: Vec<String>,
    /// Missing if the creator deleted their account
    pub creator_id: Option<PrimaryKey>,
    pub members: Vec<UserData>,
}

impl RoomData {
    pub fn is_creator(&self, user_id: PrimaryKey) -> bool {
        self.creator_id == Some(user_id)
    }

    pub fn has_member(&self, user_id: PrimaryKey) -> bool {
        self.members.iter().any(|m| m.id == user_id)
    }

    /// Returns true if joining requires a password
    pub fn is_protected(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// The part of a room that anyone may see before joining
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub id: PrimaryKey,
    pub name: String,
}
