use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    Database, DatabaseError, NewRoom, NewSession, NewUser, PrimaryKey, Result, RoomData,
    RoomSummary, SessionData, StepSet, UpdatedRoom, UpdatedUser, UserData,
};

/// An in-process database, used in tests and when no database is configured.
/// All state lives behind one lock, so every operation is atomic.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_id: PrimaryKey,
    users: BTreeMap<PrimaryKey, UserData>,
    sessions: Vec<StoredSession>,
    rooms: BTreeMap<PrimaryKey, StoredRoom>,
    /// (room_id, user_id) in join order
    members: Vec<(PrimaryKey, PrimaryKey)>,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

struct StoredRoom {
    id: PrimaryKey,
    name: String,
    password: Option<String>,
    /// Kept as raw JSON, as a database column would be
    steps: Value,
    normal_images: Vec<String>,
    abnormal_images: Vec<String>,
    creator_id: Option<PrimaryKey>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored steps of a room with raw JSON, bypassing normalization.
    /// Used to simulate records written in an older format.
    pub fn overwrite_raw_steps(&self, room_id: PrimaryKey, raw: Value) -> Result<()> {
        let mut state = self.state.lock();
        let room = state.rooms.get_mut(&room_id).ok_or(DatabaseError::NotFound {
            resource: "room",
            identifier: "id",
        })?;

        room.steps = raw;
        Ok(())
    }
}

impl MemoryState {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<&UserData> {
        self.users.get(&user_id).ok_or(DatabaseError::NotFound {
            resource: "user",
            identifier: "id",
        })
    }

    fn stored_room(&self, room_id: PrimaryKey) -> Result<&StoredRoom> {
        self.rooms.get(&room_id).ok_or(DatabaseError::NotFound {
            resource: "room",
            identifier: "id",
        })
    }

    fn members_of(&self, room_id: PrimaryKey) -> Vec<UserData> {
        self.members
            .iter()
            .filter(|(r, _)| *r == room_id)
            .filter_map(|(_, u)| self.users.get(u).cloned())
            .collect()
    }

    fn room(&self, room_id: PrimaryKey) -> Result<RoomData> {
        let room = self.stored_room(room_id)?;

        Ok(RoomData {
            id: room.id,
            name: room.name.clone(),
            password: room.password.clone(),
            steps: StepSet::migrate(&room.steps),
            normal_images: room.normal_images.clone(),
            abnormal_images: room.abnormal_images.clone(),
            creator_id: room.creator_id,
            members: self.members_of(room.id),
        })
    }

    fn name_taken(&self, name: &str, except: Option<PrimaryKey>) -> bool {
        self.rooms
            .values()
            .any(|r| r.name == name && Some(r.id) != except)
    }

    fn session(&self, token: &str) -> Result<SessionData> {
        let session = self
            .sessions
            .iter()
            .find(|s| s.token == token)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        Ok(SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user: self.user(session.user_id)?.clone(),
        })
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state.lock().user(user_id).cloned()
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state.users.values().any(|u| u.username == new_user.username) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            });
        }

        let user = UserData {
            id: state.next_id(),
            username: new_user.username,
            password: new_user.password,
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            role: new_user.role,
            profile: new_user.profile,
            registration_complete: new_user.registration_complete,
            points: Default::default(),
        };

        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if let Some(username) = &updated_user.username {
            let taken = state
                .users
                .values()
                .any(|u| &u.username == username && u.id != updated_user.id);

            if taken {
                return Err(DatabaseError::Conflict {
                    resource: "user",
                    field: "username",
                    value: username.clone(),
                });
            }
        }

        let user = state
            .users
            .get_mut(&updated_user.id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        if let Some(username) = updated_user.username {
            user.username = username;
        }
        if let Some(first_name) = updated_user.first_name {
            user.first_name = Some(first_name);
        }
        if let Some(last_name) = updated_user.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(role) = updated_user.role {
            user.role = Some(role);
        }
        if let Some(profile) = updated_user.profile {
            user.profile = profile;
        }
        if let Some(complete) = updated_user.registration_complete {
            user.registration_complete = complete;
        }

        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.user(user_id)?;

        state.users.remove(&user_id);
        state.sessions.retain(|s| s.user_id != user_id);
        state.members.retain(|(_, u)| *u != user_id);

        // Rooms outlive their creator
        for room in state.rooms.values_mut() {
            if room.creator_id == Some(user_id) {
                room.creator_id = None;
            }
        }

        Ok(())
    }

    async fn set_user_points(
        &self,
        user_id: PrimaryKey,
        room_key: &str,
        points: i64,
    ) -> Result<i64> {
        let mut state = self.state.lock();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        user.points.insert(room_key.to_string(), points);
        Ok(points)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        self.state.lock().session(token)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();
        state.user(new_session.user_id)?;

        if state.sessions.iter().any(|s| s.token == new_session.token) {
            return Err(DatabaseError::Conflict {
                resource: "session",
                field: "token",
                value: new_session.token,
            });
        }

        let id = state.next_id();
        state.sessions.push(StoredSession {
            id,
            token: new_session.token.clone(),
            user_id: new_session.user_id,
            expires_at: new_session.expires_at,
        });

        state.session(&new_session.token)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.session(token)?;
        state.sessions.retain(|s| s.token != token);

        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.state.lock().sessions.retain(|s| s.expires_at > now);

        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.state.lock().room(room_id)
    }

    async fn room_by_name(&self, name: &str) -> Result<RoomData> {
        let state = self.state.lock();
        let room = state
            .rooms
            .values()
            .find(|r| r.name == name)
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "name",
            })?;

        state.room(room.id)
    }

    async fn list_room_summaries(&self) -> Result<Vec<RoomSummary>> {
        let summaries = self
            .state
            .lock()
            .rooms
            .values()
            .map(|r| RoomSummary {
                id: r.id,
                name: r.name.clone(),
            })
            .collect();

        Ok(summaries)
    }

    async fn rooms_created_by(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let state = self.state.lock();

        state
            .rooms
            .values()
            .filter(|r| r.creator_id == Some(user_id))
            .map(|r| state.room(r.id))
            .collect()
    }

    async fn rooms_joined_by(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let state = self.state.lock();

        state
            .members
            .iter()
            .filter(|(_, u)| *u == user_id)
            .map(|(r, _)| state.room(*r))
            .collect()
    }

    async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<UserData>> {
        let state = self.state.lock();
        state.stored_room(room_id)?;

        Ok(state.members_of(room_id))
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut state = self.state.lock();

        if state.name_taken(&new_room.name, None) {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "name",
                value: new_room.name,
            });
        }

        state.user(new_room.creator_id)?;

        let id = state.next_id();
        let steps = serde_json::to_value(&new_room.steps)
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        state.rooms.insert(
            id,
            StoredRoom {
                id,
                name: new_room.name,
                password: new_room.password,
                steps,
                normal_images: vec![],
                abnormal_images: vec![],
                creator_id: Some(new_room.creator_id),
            },
        );

        state.room(id)
    }

    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData> {
        let mut state = self.state.lock();
        state.stored_room(updated_room.id)?;

        if let Some(name) = &updated_room.name {
            if state.name_taken(name, Some(updated_room.id)) {
                return Err(DatabaseError::Conflict {
                    resource: "room",
                    field: "name",
                    value: name.clone(),
                });
            }
        }

        let steps = updated_room
            .steps
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        if let Some(room) = state.rooms.get_mut(&updated_room.id) {
            if let Some(name) = updated_room.name {
                room.name = name;
            }
            if let Some(password) = updated_room.password {
                room.password = password;
            }
            if let Some(steps) = steps {
                room.steps = steps;
            }
        }

        state.room(updated_room.id)
    }

    async fn update_room_images(
        &self,
        room_id: PrimaryKey,
        normal_images: Vec<String>,
        abnormal_images: Vec<String>,
    ) -> Result<RoomData> {
        let mut state = self.state.lock();
        let room = state
            .rooms
            .get_mut(&room_id)
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })?;

        room.normal_images = normal_images;
        room.abnormal_images = abnormal_images;

        state.room(room_id)
    }

    async fn add_room_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.stored_room(room_id)?;
        state.user(user_id)?;

        if !state.members.contains(&(room_id, user_id)) {
            state.members.push((room_id, user_id));
        }

        Ok(())
    }

    async fn clear_room_members(&self, room_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.stored_room(room_id)?;
        state.members.retain(|(r, _)| *r != room_id);

        Ok(())
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.stored_room(room_id)?;

        state.rooms.remove(&room_id);
        state.members.retain(|(r, _)| *r != room_id);

        Ok(())
    }
}
