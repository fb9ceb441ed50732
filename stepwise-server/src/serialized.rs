//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use std::collections::BTreeMap;

use serde::Serialize;
use stepwise_collab::{
    effects::EffectReport, RoomData, RoomSummary as CollabRoomSummary, SessionData,
    Step as CollabStep, UserData,
};
use utoipa::ToSchema;

/// An account, without its password
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    username: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    /// "admin" or "user", missing until registration is completed
    role: Option<String>,
    affiliation: Option<String>,
    disability_type: Option<String>,
    disability_level: Option<String>,
    notes: Option<String>,
    registration_complete: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResult {
    token: String,
    user: User,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    image_urls: Vec<String>,
    description: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    id: i32,
    name: String,
    /// Whether joining requires a password
    protected: bool,
    creator_id: Option<i32>,
    /// Step sequences keyed by "default" or a user id
    steps: BTreeMap<String, Vec<Step>>,
    normal_images: Vec<String>,
    abnormal_images: Vec<String>,
    members: Vec<User>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSummary {
    id: i32,
    name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Points {
    points: i64,
}

/// What happened to the files of images that were removed
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageCleanup {
    attempted: usize,
    /// References whose files could not be deleted
    failed: Vec<String>,
}

impl Points {
    pub fn new(points: i64) -> Self {
        Self { points }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl<I, O> ToSerialized<Vec<O>> for [I]
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role.map(|r| r.to_string()),
            affiliation: self.profile.affiliation.clone(),
            disability_type: self.profile.disability_type.clone(),
            disability_level: self.profile.disability_level.clone(),
            notes: self.profile.notes.clone(),
            registration_complete: self.registration_complete,
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Step> for CollabStep {
    fn to_serialized(&self) -> Step {
        Step {
            image_urls: self.image_urls.clone(),
            description: self.description.clone(),
        }
    }
}

impl ToSerialized<Room> for RoomData {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id,
            name: self.name.clone(),
            protected: self.is_protected(),
            creator_id: self.creator_id,
            steps: self
                .steps
                .iter()
                .map(|(key, steps)| (key.to_string(), steps.to_serialized()))
                .collect(),
            normal_images: self.normal_images.clone(),
            abnormal_images: self.abnormal_images.clone(),
            members: self.members.to_serialized(),
        }
    }
}

impl ToSerialized<RoomSummary> for CollabRoomSummary {
    fn to_serialized(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl ToSerialized<ImageCleanup> for EffectReport {
    fn to_serialized(&self) -> ImageCleanup {
        ImageCleanup {
            attempted: self.attempted,
            failed: self.failures.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use stepwise_collab::{Profile, StepSet, StepSetKey};

    use super::*;

    #[test]
    fn rooms_never_expose_their_password() {
        let mut steps = StepSet::new();
        steps.set(StepSetKey::User(3), vec![CollabStep::new("Open the lid", vec![])]);

        let room = RoomData {
            id: 1,
            name: "Lab".to_string(),
            password: Some("$argon2id$v=19$...".to_string()),
            steps,
            normal_images: vec![],
            abnormal_images: vec![],
            creator_id: Some(2),
            members: vec![UserData {
                id: 3,
                username: "mina".to_string(),
                password: Some("$argon2id$v=19$...".to_string()),
                email: None,
                first_name: None,
                last_name: None,
                role: None,
                profile: Profile::default(),
                registration_complete: false,
                points: Default::default(),
            }],
        };

        let json = serde_json::to_value(room.to_serialized()).unwrap();
        let text = json.to_string();

        assert!(!text.contains("argon2"));
        assert_eq!(json["protected"], true);
        assert_eq!(json["steps"]["3"][0]["description"], "Open the lid");
        assert!(json["steps"]["default"].as_array().unwrap().is_empty());
    }
}
