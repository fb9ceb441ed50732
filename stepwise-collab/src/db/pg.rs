use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    postgres::PgPoolOptions, query, query_as, types::Json, Error as SqlxError, FromRow, PgPool,
};

use crate::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, NewRoom, NewSession, NewUser,
    PrimaryKey, Profile, Result, RoomData, RoomSummary, SessionData, StepSet, UpdatedRoom,
    UpdatedUser, UserData,
};

/// A postgres database implementation for stepwise
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    password: Option<String>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<String>,
    affiliation: Option<String>,
    disability_type: Option<String>,
    disability_level: Option<String>,
    notes: Option<String>,
    registration_complete: bool,
    points: Json<HashMap<String, i64>>,
}

#[derive(FromRow)]
struct SessionRow {
    session_id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: UserRow,
}

#[derive(FromRow)]
struct RoomRow {
    id: PrimaryKey,
    name: String,
    password: Option<String>,
    steps: Option<Json<Value>>,
    normal_images: Json<Vec<String>>,
    abnormal_images: Json<Vec<String>>,
    creator_id: Option<PrimaryKey>,
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password: row.password,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role: row.role.and_then(|r| r.parse().ok()),
            profile: Profile {
                affiliation: row.affiliation,
                disability_type: row.disability_type,
                disability_level: row.disability_level,
                notes: row.notes,
            },
            registration_complete: row.registration_complete,
            points: row.points.0,
        }
    }
}

impl RoomRow {
    fn into_room(self, members: Vec<UserData>) -> RoomData {
        let raw_steps = self.steps.map(|s| s.0).unwrap_or(Value::Null);

        RoomData {
            id: self.id,
            name: self.name,
            password: self.password,
            steps: StepSet::migrate(&raw_steps),
            normal_images: self.normal_images.0,
            abnormal_images: self.abnormal_images.0,
            creator_id: self.creator_id,
            members,
        }
    }
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn room_rows_to_data(&self, rows: Vec<RoomRow>) -> Result<Vec<RoomData>> {
        let mut rooms = Vec::with_capacity(rows.len());

        for row in rows {
            let members = self.room_members(row.id).await?;
            rooms.push(row.into_room(members));
        }

        Ok(rooms)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        query_as::<_, UserRow>(
            "
            INSERT INTO users (
                username, password, email, first_name, last_name, role,
                affiliation, disability_type, disability_level, notes, registration_complete
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *",
        )
        .bind(&new_user.username)
        .bind(new_user.password)
        .bind(new_user.email)
        .bind(new_user.first_name)
        .bind(new_user.last_name)
        .bind(new_user.role.map(|r| r.as_str()))
        .bind(new_user.profile.affiliation)
        .bind(new_user.profile.disability_type)
        .bind(new_user.profile.disability_level)
        .bind(new_user.profile.notes)
        .bind(new_user.registration_complete)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.conflict_or("user", "username", &new_user.username))
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let user = self.user_by_id(updated_user.id).await?;

        let username = updated_user.username.unwrap_or(user.username);
        let profile = updated_user.profile.unwrap_or(user.profile);
        let role = updated_user.role.or(user.role);

        query(
            "
            UPDATE users SET
                username = $1,
                first_name = $2,
                last_name = $3,
                role = $4,
                affiliation = $5,
                disability_type = $6,
                disability_level = $7,
                notes = $8,
                registration_complete = $9
            WHERE id = $10",
        )
        .bind(&username)
        .bind(updated_user.first_name.or(user.first_name))
        .bind(updated_user.last_name.or(user.last_name))
        .bind(role.map(|r| r.as_str()))
        .bind(profile.affiliation)
        .bind(profile.disability_type)
        .bind(profile.disability_level)
        .bind(profile.notes)
        .bind(
            updated_user
                .registration_complete
                .unwrap_or(user.registration_complete),
        )
        .bind(updated_user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.conflict_or("user", "username", &username))?;

        self.user_by_id(updated_user.id).await
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        // Sessions and memberships cascade, created rooms lose their creator
        query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn set_user_points(
        &self,
        user_id: PrimaryKey,
        room_key: &str,
        points: i64,
    ) -> Result<i64> {
        let result = query(
            "UPDATE users SET points = jsonb_set(points, ARRAY[$2::text], to_jsonb($3::bigint)) WHERE id = $1",
        )
        .bind(user_id)
        .bind(room_key)
        .bind(points)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            });
        }

        Ok(points)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = query_as::<_, SessionRow>(
            "SELECT
                sessions.id AS session_id,
                sessions.token,
                sessions.expires_at,
                users.*
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1
            ",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.session_id,
            token: row.token,
            expires_at: row.expires_at,
            user: row.user.into(),
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.conflict_or("session", "token", &new_session.token))?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE now() > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        let row = query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?;

        let members = self.room_members(room_id).await?;
        Ok(row.into_room(members))
    }

    async fn room_by_name(&self, name: &str) -> Result<RoomData> {
        let (id,): (PrimaryKey,) = query_as("SELECT id FROM rooms WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "name"))?;

        self.room_by_id(id).await
    }

    async fn list_room_summaries(&self) -> Result<Vec<RoomSummary>> {
        let rows: Vec<(PrimaryKey, String)> = query_as("SELECT id, name FROM rooms ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| RoomSummary { id, name })
            .collect())
    }

    async fn rooms_created_by(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let rows = query_as::<_, RoomRow>("SELECT * FROM rooms WHERE creator_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.room_rows_to_data(rows).await
    }

    async fn rooms_joined_by(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let rows = query_as::<_, RoomRow>(
            "
            SELECT rooms.* FROM rooms
                INNER JOIN room_members ON room_members.room_id = rooms.id
            WHERE room_members.user_id = $1
            ORDER BY room_members.joined_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.room_rows_to_data(rows).await
    }

    async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<UserData>> {
        let rows = query_as::<_, UserRow>(
            "
            SELECT users.* FROM room_members
                INNER JOIN users ON room_members.user_id = users.id
            WHERE room_members.room_id = $1
            ORDER BY room_members.joined_at",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        self.room_by_name(&new_room.name)
            .await
            .conflict_or_ok("room", "name", &new_room.name)?;

        let user = self.user_by_id(new_room.creator_id).await?;

        // The unique constraint decides races that get past the check above
        let (id,): (PrimaryKey,) = query_as(
            "
            INSERT INTO rooms (name, password, steps, creator_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id",
        )
        .bind(&new_room.name)
        .bind(new_room.password)
        .bind(Json(new_room.steps))
        .bind(user.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or("room", "name", &new_room.name))?;

        self.room_by_id(id).await
    }

    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData> {
        let room = self.room_by_id(updated_room.id).await?;

        let name = updated_room.name.unwrap_or(room.name);
        let password = updated_room.password.unwrap_or(room.password);
        let steps = updated_room.steps.unwrap_or(room.steps);

        query("UPDATE rooms SET name = $1, password = $2, steps = $3 WHERE id = $4")
            .bind(&name)
            .bind(password)
            .bind(Json(steps))
            .bind(updated_room.id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.conflict_or("room", "name", &name))?;

        self.room_by_id(updated_room.id).await
    }

    async fn update_room_images(
        &self,
        room_id: PrimaryKey,
        normal_images: Vec<String>,
        abnormal_images: Vec<String>,
    ) -> Result<RoomData> {
        let result =
            query("UPDATE rooms SET normal_images = $1, abnormal_images = $2 WHERE id = $3")
                .bind(Json(normal_images))
                .bind(Json(abnormal_images))
                .bind(room_id)
                .execute(&self.pool)
                .await
                .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            });
        }

        self.room_by_id(room_id).await
    }

    async fn add_room_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        // Ensure both sides exist, so a missing one is reported as such
        query("SELECT id FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?;

        let _ = self.user_by_id(user_id).await?;

        query(
            "
            INSERT INTO room_members (room_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn clear_room_members(&self, room_id: PrimaryKey) -> Result<()> {
        query("DELETE FROM room_members WHERE room_id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            });
        }

        Ok(())
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }

    fn conflict_or(self, resource: &'static str, field: &'static str, value: &str) -> DatabaseError {
        match self {
            SqlxError::Database(e) if e.is_unique_violation() => DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            },
            e => Self::any(e),
        }
    }
}
