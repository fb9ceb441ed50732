use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json,
};
use stepwise_collab::{PrimaryKey, RoomSettings};

use crate::{
    auth::Session,
    errors::ServerResult,
    schemas::{
        AppendImagesSchema, JoinRoomSchema, NewRoomSchema, ReplaceImagesSchema,
        RoomSettingsSchema, ValidatedJson,
    },
    serialized::{ImageCleanup, Room, RoomSummary, Step, ToSerialized, User},
    Router, ServerContext,
};

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room),
        (status = 409, description = "A room with this name already exists")
    )
)]
pub(crate) async fn create_room(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Room>> {
    session.require_admin()?;

    let room = context
        .collab
        .rooms
        .create_room_with_steps(
            &body.name,
            body.password.as_deref(),
            session.user.id,
            body.steps.unwrap_or_default(),
        )
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/all",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<RoomSummary>)
    )
)]
pub(crate) async fn list_summaries(
    _session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<RoomSummary>>> {
    let summaries = context.collab.rooms.list_summaries().await?;
    Ok(Json(summaries.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/created",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Room>)
    )
)]
pub(crate) async fn list_created(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Room>>> {
    session.require_admin()?;

    let rooms = context.collab.rooms.list_created_by(session.user.id).await?;
    Ok(Json(rooms.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/joined",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Room>)
    )
)]
pub(crate) async fn list_joined(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Room>>> {
    let rooms = context.collab.rooms.list_joined_by(session.user.id).await?;
    Ok(Json(rooms.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn room(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<PrimaryKey>,
) -> ServerResult<Json<Room>> {
    let room = context.collab.rooms.room_with_members(room_id).await?;
    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/steps",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The steps the requester should see", body = Vec<Step>)
    )
)]
pub(crate) async fn steps(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<Step>>> {
    let steps = context
        .collab
        .rooms
        .steps_for_viewer(room_id, session.user.id)
        .await?;

    Ok(Json(steps.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/join",
    tag = "rooms",
    request_body = JoinRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room),
        (status = 401, description = "The password is wrong")
    )
)]
pub(crate) async fn join_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<JoinRoomSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .rooms
        .join_room(room_id, body.password.as_deref(), session.user.id)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/rooms/{id}/settings",
    tag = "rooms",
    request_body = RoomSettingsSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn update_settings(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<RoomSettingsSchema>,
) -> ServerResult<Json<Room>> {
    let settings = RoomSettings {
        name: body.name,
        password: body.password,
        steps: body.steps,
    };

    let room = context
        .collab
        .rooms
        .update_settings(room_id, session.user.id, settings)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ImageCleanup)
    )
)]
pub(crate) async fn delete_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<PrimaryKey>,
) -> ServerResult<Json<ImageCleanup>> {
    let report = context
        .collab
        .rooms
        .delete_room(room_id, session.user.id)
        .await?;

    Ok(Json(report.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/users",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<User>)
    )
)]
pub(crate) async fn members(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<User>>> {
    session.require_admin()?;

    let members = context.collab.rooms.room_members(room_id).await?;
    Ok(Json(members.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/images",
    tag = "rooms",
    request_body = AppendImagesSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn append_images(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<AppendImagesSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .images
        .append_images(room_id, session.user.id, &body.kind, body.image_urls)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/rooms/{id}/images",
    tag = "rooms",
    request_body = ReplaceImagesSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ImageCleanup)
    )
)]
pub(crate) async fn replace_images(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<ReplaceImagesSchema>,
) -> ServerResult<Json<ImageCleanup>> {
    let report = context
        .collab
        .images
        .replace_image_lists(
            room_id,
            session.user.id,
            body.normal_images,
            body.abnormal_images,
        )
        .await?;

    Ok(Json(report.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/users/{user_id}/descriptions",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The generated steps of the user", body = Vec<Step>),
        (status = 502, description = "The AI service failed, nothing was changed")
    )
)]
pub(crate) async fn generate_descriptions(
    session: Session,
    State(context): State<ServerContext>,
    Path((room_id, user_id)): Path<(PrimaryKey, PrimaryKey)>,
) -> ServerResult<Json<Vec<Step>>> {
    let steps = context
        .collab
        .descriptions
        .generate_personalized_steps(room_id, user_id, session.user.id)
        .await?;

    Ok(Json(steps.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_room))
        .route("/all", get(list_summaries))
        .route("/created", get(list_created))
        .route("/joined", get(list_joined))
        .route("/:id", get(room).delete(delete_room))
        .route("/:id/steps", get(steps))
        .route("/:id/join", post(join_room))
        .route("/:id/settings", put(update_settings))
        .route("/:id/users", get(members))
        .route("/:id/images", post(append_images).put(replace_images))
        .route("/:id/users/:user_id/descriptions", post(generate_descriptions))
}
