use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{auth, rooms, schemas, serialized, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::logout,
        users::user,
        users::update_profile,
        users::complete_registration,
        users::delete_user,
        users::points,
        users::set_points,
        rooms::create_room,
        rooms::list_summaries,
        rooms::list_created,
        rooms::list_joined,
        rooms::room,
        rooms::steps,
        rooms::join_room,
        rooms::update_settings,
        rooms::delete_room,
        rooms::members,
        rooms::append_images,
        rooms::replace_images,
        rooms::generate_descriptions,
    ),
    components(schemas(
        schemas::LoginSchema,
        schemas::RoleSchema,
        schemas::RegisterSchema,
        schemas::CompleteRegistrationSchema,
        schemas::UpdateProfileSchema,
        schemas::PointsSchema,
        schemas::NewRoomSchema,
        schemas::JoinRoomSchema,
        schemas::RoomSettingsSchema,
        schemas::AppendImagesSchema,
        schemas::ReplaceImagesSchema,
        serialized::User,
        serialized::LoginResult,
        serialized::Step,
        serialized::Room,
        serialized::RoomSummary,
        serialized::Points,
        serialized::ImageCleanup,
    )),
    modifiers(&Security),
    info(
        description = "stepwise-server exposes endpoints to manage rooms, their instructions, and their participants"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
