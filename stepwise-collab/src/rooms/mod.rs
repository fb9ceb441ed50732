mod images;
mod steps;

use log::info;
use thiserror::Error;

use crate::{
    auth::{hash_secret, verify_secret},
    effects::EffectReport,
    files::delete_all,
    CollabContext, DatabaseError, NewRoom, PrimaryKey, RoomData, RoomSummary, UpdatedRoom,
    UserData,
};

pub use images::*;
pub use steps::*;

pub struct RoomManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("{resource} with this {identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("Only the creator of the room can do this")]
    NotCreator,
    #[error("Wrong room password")]
    WrongPassword,
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{0}")]
    InvalidArgument(String),
    /// The AI service failed or timed out, nothing was written
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("HashError: {0}")]
    HashError(String),
    #[error(transparent)]
    Database(DatabaseError),
}

/// The broad category of a [RoomError]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Conflict,
    InvalidArgument,
    GenerationFailed,
    Internal,
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::NotFound { .. } => ErrorKind::NotFound,
            RoomError::NotCreator | RoomError::WrongPassword => ErrorKind::Unauthorized,
            RoomError::Conflict { .. } => ErrorKind::Conflict,
            RoomError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RoomError::GenerationFailed(_) => ErrorKind::GenerationFailed,
            RoomError::HashError(_) | RoomError::Database(_) => ErrorKind::Internal,
        }
    }
}

impl From<DatabaseError> for RoomError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => RoomError::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => RoomError::Conflict {
                resource,
                field,
                value,
            },
            e => RoomError::Database(e),
        }
    }
}

impl From<StepSetError> for RoomError {
    fn from(value: StepSetError) -> Self {
        RoomError::InvalidArgument(value.to_string())
    }
}

/// Changes to a room. Fields that are [None] are left untouched.
#[derive(Debug, Default)]
pub struct RoomSettings {
    pub name: Option<String>,
    /// An empty password removes it
    pub password: Option<String>,
    /// Replaces the whole step-set, nothing is merged
    pub steps: Option<StepSet>,
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new room owned by `creator`, with an empty default step-set and no images
    pub async fn create_room(
        &self,
        name: &str,
        password: Option<&str>,
        creator: PrimaryKey,
    ) -> Result<RoomData, RoomError> {
        self.create_room_with_steps(name, password, creator, StepSet::new())
            .await
    }

    /// Creates a new room that starts out with the given instructions
    pub async fn create_room_with_steps(
        &self,
        name: &str,
        password: Option<&str>,
        creator: PrimaryKey,
        steps: StepSet,
    ) -> Result<RoomData, RoomError> {
        let name = valid_name(name)?;
        let password = password
            .filter(|p| !p.is_empty())
            .map(hash_password)
            .transpose()?;

        let room = self
            .context
            .database
            .create_room(NewRoom {
                name,
                password,
                creator_id: creator,
                steps,
            })
            .await?;

        info!("User {} created room {} ({})", creator, room.id, room.name);
        Ok(room)
    }

    /// Adds a user to the members of a room.
    /// Joining a room one is already a member of changes nothing.
    pub async fn join_room(
        &self,
        room_id: PrimaryKey,
        attempted_password: Option<&str>,
        user_id: PrimaryKey,
    ) -> Result<RoomData, RoomError> {
        let room = self.context.database.room_by_id(room_id).await?;

        if let Some(stored) = room.password.as_deref().filter(|p| !p.is_empty()) {
            let attempted = attempted_password.unwrap_or_default();

            if attempted.is_empty() || !verify_secret(attempted, stored) {
                return Err(RoomError::WrongPassword);
            }
        }

        if room.has_member(user_id) {
            return Ok(room);
        }

        self.context
            .database
            .add_room_member(room_id, user_id)
            .await?;

        info!("User {} joined room {}", user_id, room_id);
        Ok(self.context.database.room_by_id(room_id).await?)
    }

    /// Deletes a room, its memberships, and the files of its classification images.
    ///
    /// Files are deleted on a best-effort basis, the returned report tells which failed.
    pub async fn delete_room(
        &self,
        room_id: PrimaryKey,
        requester: PrimaryKey,
    ) -> Result<EffectReport, RoomError> {
        let room = self.context.room_owned_by(room_id, requester).await?;

        self.context.database.clear_room_members(room_id).await?;

        let images: Vec<String> = room
            .normal_images
            .into_iter()
            .chain(room.abnormal_images)
            .collect();

        let report = delete_all(self.context.files.as_ref(), &images).await;

        self.context.database.delete_room(room_id).await?;

        info!(
            "Deleted room {}, {} of {} image files removed",
            room_id,
            report.succeeded(),
            report.attempted
        );

        Ok(report)
    }

    /// Changes the name, password, and/or steps of a room
    pub async fn update_settings(
        &self,
        room_id: PrimaryKey,
        requester: PrimaryKey,
        settings: RoomSettings,
    ) -> Result<RoomData, RoomError> {
        self.context.room_owned_by(room_id, requester).await?;

        let name = settings.name.as_deref().map(valid_name).transpose()?;
        let password = settings
            .password
            .map(|p| {
                if p.is_empty() {
                    Ok(None)
                } else {
                    hash_password(&p).map(Some)
                }
            })
            .transpose()?;

        let room = self
            .context
            .database
            .update_room(UpdatedRoom {
                id: room_id,
                name,
                password,
                steps: settings.steps,
            })
            .await?;

        Ok(room)
    }

    /// Replaces the step-set of a room with a complete new one
    pub async fn replace_step_set(
        &self,
        room_id: PrimaryKey,
        requester: PrimaryKey,
        steps: StepSet,
    ) -> Result<RoomData, RoomError> {
        self.update_settings(
            room_id,
            requester,
            RoomSettings {
                steps: Some(steps),
                ..Default::default()
            },
        )
        .await
    }

    /// Returns the steps a viewer should see in a room
    pub async fn steps_for_viewer(
        &self,
        room_id: PrimaryKey,
        viewer_id: PrimaryKey,
    ) -> Result<Vec<Step>, RoomError> {
        let room = self.context.database.room_by_id(room_id).await?;
        Ok(room.steps.resolve(viewer_id).to_vec())
    }

    pub async fn room_with_members(&self, room_id: PrimaryKey) -> Result<RoomData, RoomError> {
        Ok(self.context.database.room_by_id(room_id).await?)
    }

    pub async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<UserData>, RoomError> {
        Ok(self.context.database.room_members(room_id).await?)
    }

    pub async fn list_created_by(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>, RoomError> {
        Ok(self.context.database.rooms_created_by(user_id).await?)
    }

    pub async fn list_joined_by(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>, RoomError> {
        Ok(self.context.database.rooms_joined_by(user_id).await?)
    }

    /// Lists every room by id and name, for discovery before joining
    pub async fn list_summaries(&self) -> Result<Vec<RoomSummary>, RoomError> {
        Ok(self.context.database.list_room_summaries().await?)
    }
}

fn valid_name(name: &str) -> Result<String, RoomError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(RoomError::InvalidArgument(
            "Room name must not be empty".to_string(),
        ));
    }

    Ok(name.to_string())
}

fn hash_password(password: &str) -> Result<String, RoomError> {
    hash_secret(password).map_err(|e| RoomError::HashError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{create_user, test_collab};
    use crate::Role;

    #[tokio::test]
    async fn room_names_are_unique() {
        let t = test_collab();
        let first = create_user(&t, "first", Role::Admin).await;
        let second = create_user(&t, "second", Role::Admin).await;

        t.collab.rooms.create_room("Lab", None, first.id).await.unwrap();

        for creator in [first.id, second.id] {
            let result = t.collab.rooms.create_room("Lab", None, creator).await;
            assert!(matches!(result, Err(RoomError::Conflict { .. })));
        }
    }

    #[tokio::test]
    async fn new_rooms_start_empty() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;

        let room = t.collab.rooms.create_room("Lab", Some(""), admin.id).await.unwrap();

        assert!(!room.is_protected());
        assert_eq!(room.steps, StepSet::new());
        assert!(room.normal_images.is_empty());
        assert!(room.abnormal_images.is_empty());
        assert!(room.is_creator(admin.id));
    }

    #[tokio::test]
    async fn rooms_can_start_with_instructions() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;

        let mut steps = StepSet::new();
        steps.set(
            StepSetKey::Default,
            vec![Step::new("Open the lid", vec![]), Step::new("Press start", vec![])],
        );

        let room = t
            .collab
            .rooms
            .create_room_with_steps("Lab", None, admin.id, steps.clone())
            .await
            .unwrap();
        assert_eq!(room.steps, steps);

        let stored = t.collab.rooms.room_with_members(room.id).await.unwrap();
        assert_eq!(stored.steps, steps);

        // A failed creation leaves nothing behind
        let result = t
            .collab
            .rooms
            .create_room_with_steps("Workshop", None, admin.id + 100, steps)
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(t.collab.rooms.list_summaries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_names_are_rejected() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;

        let result = t.collab.rooms.create_room("  ", None, admin.id).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn joining_twice_keeps_one_membership() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let user = create_user(&t, "user", Role::Participant).await;
        let room = t
            .collab
            .rooms
            .create_room("Lab", Some("secret1"), admin.id)
            .await
            .unwrap();

        t.collab
            .rooms
            .join_room(room.id, Some("secret1"), user.id)
            .await
            .unwrap();
        let room = t
            .collab
            .rooms
            .join_room(room.id, Some("secret1"), user.id)
            .await
            .unwrap();

        assert_eq!(room.members.len(), 1);
        assert_eq!(t.collab.rooms.list_joined_by(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn passwords_gate_joining() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let user = create_user(&t, "user", Role::Participant).await;
        let room = t
            .collab
            .rooms
            .create_room("Lab", Some("secret1"), admin.id)
            .await
            .unwrap();

        for attempt in [Some(""), None, Some("secret"), Some("secret1 ")] {
            let result = t.collab.rooms.join_room(room.id, attempt, user.id).await;

            assert!(matches!(result, Err(RoomError::WrongPassword)));
            assert_eq!(result.unwrap_err().kind(), ErrorKind::Unauthorized);
        }

        assert!(t
            .collab
            .rooms
            .join_room(room.id, Some("secret1"), user.id)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn passwords_are_not_stored_in_plain_text() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let room = t
            .collab
            .rooms
            .create_room("Lab", Some("secret1"), admin.id)
            .await
            .unwrap();

        assert_ne!(room.password.as_deref(), Some("secret1"));
        assert!(room.is_protected());
    }

    #[tokio::test]
    async fn joining_a_missing_room_fails() {
        let t = test_collab();
        let user = create_user(&t, "user", Role::Participant).await;

        let result = t.collab.rooms.join_room(404, None, user.id).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn deleting_cascades_to_members_and_files() {
        let t = test_collab();
        t.files.fail_on("/uploads/3.png");

        let admin = create_user(&t, "admin", Role::Admin).await;
        let room = t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();

        let mut members = vec![];
        for name in ["a", "b", "c"] {
            let user = create_user(&t, name, Role::Participant).await;
            t.collab.rooms.join_room(room.id, None, user.id).await.unwrap();
            members.push(user);
        }

        let images: Vec<String> = (1..=5).map(|i| format!("/uploads/{}.png", i)).collect();
        t.collab
            .images
            .append_images(room.id, admin.id, "normal", images[..2].to_vec())
            .await
            .unwrap();
        t.collab
            .images
            .append_images(room.id, admin.id, "abnormal", images[2..].to_vec())
            .await
            .unwrap();

        let report = t.collab.rooms.delete_room(room.id, admin.id).await.unwrap();

        assert_eq!(report.attempted, 5);
        assert_eq!(report.succeeded(), 4);
        assert_eq!(t.files.attempts(), images);

        for member in members {
            let joined = t.collab.rooms.list_joined_by(member.id).await.unwrap();
            assert!(joined.is_empty());
        }

        let result = t.collab.rooms.room_with_members(room.id).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn only_the_creator_may_delete() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let other = create_user(&t, "other", Role::Admin).await;
        let room = t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();

        let result = t.collab.rooms.delete_room(room.id, other.id).await;
        assert!(matches!(result, Err(RoomError::NotCreator)));

        let result = t.collab.rooms.delete_room(404, admin.id).await;
        assert!(matches!(result, Err(RoomError::NotFound { .. })));

        assert!(t.collab.rooms.room_with_members(room.id).await.is_ok());
    }

    #[tokio::test]
    async fn settings_can_rename_and_remove_the_password() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let user = create_user(&t, "user", Role::Participant).await;
        let room = t
            .collab
            .rooms
            .create_room("Lab", Some("secret1"), admin.id)
            .await
            .unwrap();

        let room = t
            .collab
            .rooms
            .update_settings(
                room.id,
                admin.id,
                RoomSettings {
                    name: Some("Workshop".to_string()),
                    password: Some(String::new()),
                    steps: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(room.name, "Workshop");
        assert!(!room.is_protected());
        assert!(t.collab.rooms.join_room(room.id, None, user.id).await.is_ok());
    }

    #[tokio::test]
    async fn renaming_to_a_taken_name_conflicts() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();
        let room = t.collab.rooms.create_room("Shop", None, admin.id).await.unwrap();

        let result = t
            .collab
            .rooms
            .update_settings(
                room.id,
                admin.id,
                RoomSettings {
                    name: Some("Lab".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn step_sets_are_replaced_not_merged() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let user = create_user(&t, "user", Role::Participant).await;
        let room = t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();

        let mut steps = StepSet::new();
        steps.set(StepSetKey::Default, vec![Step::new("A", vec![]), Step::new("B", vec![])]);
        steps.set(StepSetKey::User(user.id), vec![Step::new("X", vec![])]);
        t.collab
            .rooms
            .replace_step_set(room.id, admin.id, steps)
            .await
            .unwrap();

        let viewed = t.collab.rooms.steps_for_viewer(room.id, user.id).await.unwrap();
        assert_eq!(viewed, vec![Step::new("X", vec![])]);

        let mut steps = StepSet::new();
        steps.set(StepSetKey::Default, vec![Step::new("C", vec![])]);
        let room = t
            .collab
            .rooms
            .replace_step_set(room.id, admin.id, steps)
            .await
            .unwrap();

        assert_eq!(room.steps.get(StepSetKey::User(user.id)), None);

        let viewed = t.collab.rooms.steps_for_viewer(room.id, user.id).await.unwrap();
        assert_eq!(viewed, vec![Step::new("C", vec![])]);
    }

    #[tokio::test]
    async fn legacy_steps_are_migrated_on_read() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let room = t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();

        t.database
            .overwrite_raw_steps(
                room.id,
                json!([{ "imageUrls": ["/a.png"], "description": { "default": "Open the lid" } }]),
            )
            .unwrap();

        let room = t.collab.rooms.room_with_members(room.id).await.unwrap();
        assert_eq!(
            room.steps.default_steps(),
            &[Step::new("Open the lid", vec!["/a.png".to_string()])]
        );
    }

    #[tokio::test]
    async fn only_the_creator_may_change_settings() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let other = create_user(&t, "other", Role::Admin).await;
        let room = t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();

        let result = t
            .collab
            .rooms
            .replace_step_set(room.id, other.id, StepSet::new())
            .await;

        assert!(matches!(result, Err(RoomError::NotCreator)));
    }
}
