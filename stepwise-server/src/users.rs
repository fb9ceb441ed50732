use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json,
};
use log::info;
use stepwise_collab::PrimaryKey;

use crate::{
    auth::Session,
    errors::{ServerError, ServerResult},
    schemas::{CompleteRegistrationSchema, PointsSchema, UpdateProfileSchema, ValidatedJson},
    serialized::{Points, ToSerialized, User},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/user",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User)
    )
)]
pub(crate) async fn user(session: Session) -> Json<User> {
    Json(session.user.to_serialized())
}

#[utoipa::path(
    put,
    path = "/v1/user/profile",
    tag = "users",
    request_body = UpdateProfileSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User)
    )
)]
pub(crate) async fn update_profile(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<UpdateProfileSchema>,
) -> ServerResult<Json<User>> {
    let user = context
        .collab
        .auth
        .update_profile(session.user.id, body.into())
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/user/registration",
    tag = "users",
    request_body = CompleteRegistrationSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User)
    )
)]
pub(crate) async fn complete_registration(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<CompleteRegistrationSchema>,
) -> ServerResult<Json<User>> {
    let role = body.role.into();

    let user = context
        .collab
        .auth
        .complete_registration(session.user.id, role, body.profile())
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/user",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The account was deleted, rooms it created are kept")
    )
)]
pub(crate) async fn delete_user(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<()> {
    context.collab.auth.delete_user(session.user.id).await?;
    Ok(())
}

/// Users may see and change their own points, admins those of anyone
fn check_points_access(session: &Session, user_id: PrimaryKey) -> ServerResult<()> {
    if session.user.id == user_id || session.user.is_admin() {
        Ok(())
    } else {
        Err(ServerError::Forbidden)
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{user_id}/rooms/{room_id}/points",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Points)
    )
)]
pub(crate) async fn points(
    session: Session,
    State(context): State<ServerContext>,
    Path((user_id, room_id)): Path<(PrimaryKey, PrimaryKey)>,
) -> ServerResult<Json<Points>> {
    check_points_access(&session, user_id)?;

    let points = context.collab.points.get_points(user_id, room_id).await?;
    Ok(Json(Points::new(points)))
}

#[utoipa::path(
    put,
    path = "/v1/users/{user_id}/rooms/{room_id}/points",
    tag = "users",
    request_body = PointsSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Points)
    )
)]
pub(crate) async fn set_points(
    session: Session,
    State(context): State<ServerContext>,
    Path((user_id, room_id)): Path<(PrimaryKey, PrimaryKey)>,
    ValidatedJson(body): ValidatedJson<PointsSchema>,
) -> ServerResult<Json<Points>> {
    check_points_access(&session, user_id)?;

    let points = context
        .collab
        .points
        .set_points(user_id, room_id, body.points)
        .await?;

    info!("User {} has {} points in room {}", user_id, points, room_id);
    Ok(Json(Points::new(points)))
}

pub fn router() -> Router {
    Router::new()
        .route("/user", get(user).delete(delete_user))
        .route("/user/profile", put(update_profile))
        .route("/user/registration", put(complete_registration))
        .route(
            "/users/:user_id/rooms/:room_id/points",
            get(points).put(set_points),
        )
}
