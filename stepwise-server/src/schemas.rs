use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use stepwise_collab::{Profile, ProfileChanges, Role, StepSet};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 128))]
    pub username: String,
    #[validate(length(max = 64))]
    pub password: String,
}

#[derive(Debug, Clone, Copy, ToSchema, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleSchema {
    Admin,
    User,
}

impl From<RoleSchema> for Role {
    fn from(value: RoleSchema) -> Self {
        match value {
            RoleSchema::Admin => Role::Admin,
            RoleSchema::User => Role::Participant,
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterSchema {
    #[validate(length(min = 2, max = 128))]
    pub username: String,
    #[validate(length(min = 6, max = 64))]
    pub password: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 128))]
    pub first_name: Option<String>,
    #[validate(length(max = 128))]
    pub last_name: Option<String>,
    pub role: RoleSchema,
    #[validate(length(max = 256))]
    pub affiliation: Option<String>,
    #[validate(length(max = 128))]
    pub disability_type: Option<String>,
    #[validate(length(max = 128))]
    pub disability_level: Option<String>,
    #[validate(length(max = 1024))]
    pub notes: Option<String>,
}

impl RegisterSchema {
    pub fn profile(&self) -> Profile {
        Profile {
            affiliation: self.affiliation.clone(),
            disability_type: self.disability_type.clone(),
            disability_level: self.disability_level.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompleteRegistrationSchema {
    pub role: RoleSchema,
    #[validate(length(max = 256))]
    pub affiliation: Option<String>,
    #[validate(length(max = 128))]
    pub disability_type: Option<String>,
    #[validate(length(max = 128))]
    pub disability_level: Option<String>,
    #[validate(length(max = 1024))]
    pub notes: Option<String>,
}

impl CompleteRegistrationSchema {
    pub fn profile(self) -> Profile {
        Profile {
            affiliation: self.affiliation,
            disability_type: self.disability_type,
            disability_level: self.disability_level,
            notes: self.notes,
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileSchema {
    #[validate(length(min = 2, max = 128))]
    pub username: Option<String>,
    #[validate(length(max = 128))]
    pub first_name: Option<String>,
    #[validate(length(max = 128))]
    pub last_name: Option<String>,
    #[validate(length(max = 256))]
    pub affiliation: Option<String>,
    #[validate(length(max = 128))]
    pub disability_type: Option<String>,
    #[validate(length(max = 128))]
    pub disability_level: Option<String>,
    #[validate(length(max = 1024))]
    pub notes: Option<String>,
}

impl From<UpdateProfileSchema> for ProfileChanges {
    fn from(value: UpdateProfileSchema) -> Self {
        Self {
            username: value.username,
            first_name: value.first_name,
            last_name: value.last_name,
            affiliation: value.affiliation,
            disability_type: value.disability_type,
            disability_level: value.disability_level,
            notes: value.notes,
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PointsSchema {
    pub points: i64,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRoomSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(length(min = 4, max = 64))]
    pub password: Option<String>,
    /// Step sequences keyed by "default" or a user id
    #[schema(value_type = Object)]
    pub steps: Option<StepSet>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinRoomSchema {
    #[validate(length(max = 64))]
    pub password: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoomSettingsSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    /// An empty password removes it
    #[validate(length(max = 64))]
    pub password: Option<String>,
    /// Replaces every step sequence of the room
    #[schema(value_type = Object)]
    pub steps: Option<StepSet>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppendImagesSchema {
    /// "normal" or "abnormal"
    pub kind: String,
    #[validate(length(min = 1))]
    pub image_urls: Vec<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReplaceImagesSchema {
    #[serde(default)]
    pub normal_images: Vec<String>,
    #[serde(default)]
    pub abnormal_images: Vec<String>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn short_room_passwords_are_invalid() {
        let schema: NewRoomSchema =
            serde_json::from_value(json!({ "name": "Lab", "password": "abc" })).unwrap();
        assert!(schema.validate().is_err());

        let schema: NewRoomSchema = serde_json::from_value(json!({ "name": "Lab" })).unwrap();
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn steps_must_use_known_keys() {
        let result = serde_json::from_value::<RoomSettingsSchema>(json!({
            "steps": { "default": [], "someone": [] }
        }));
        assert!(result.is_err());

        let schema: RoomSettingsSchema = serde_json::from_value(json!({
            "steps": { "7": [{ "imageUrls": [], "description": "Open the lid" }] }
        }))
        .unwrap();
        assert_eq!(schema.steps.unwrap().keys().count(), 2);
    }

    #[test]
    fn roles_use_their_stored_names() {
        let schema: CompleteRegistrationSchema =
            serde_json::from_value(json!({ "role": "user" })).unwrap();

        assert_eq!(Role::from(schema.role), Role::Participant);
    }
}
