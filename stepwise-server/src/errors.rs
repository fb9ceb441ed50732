use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use stepwise_collab::{AuthError, DatabaseError, ErrorKind, RoomError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Unauthorized(String),
    #[error("Only admins can do this")]
    Forbidden,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    GenerationFailed(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, self.to_string()).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            RoomError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => match e.kind() {
                ErrorKind::Unauthorized => Self::Unauthorized(e.to_string()),
                ErrorKind::InvalidArgument => Self::InvalidArgument(e.to_string()),
                ErrorKind::GenerationFailed => Self::GenerationFailed(e.to_string()),
                _ => Self::Unknown(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_errors_map_to_statuses() {
        let cases = [
            (
                RoomError::NotFound {
                    resource: "room",
                    identifier: "id",
                },
                StatusCode::NOT_FOUND,
            ),
            (RoomError::NotCreator, StatusCode::UNAUTHORIZED),
            (RoomError::WrongPassword, StatusCode::UNAUTHORIZED),
            (
                RoomError::Conflict {
                    resource: "room",
                    field: "name",
                    value: "Lab".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                RoomError::InvalidArgument("bad kind".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RoomError::GenerationFailed("timed out".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                RoomError::HashError("broken".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ServerError::from(error).as_status_code(), status);
        }
    }

    #[test]
    fn duplicate_usernames_conflict() {
        let error = AuthError::Db(DatabaseError::Conflict {
            resource: "user",
            field: "username",
            value: "mina".to_string(),
        });

        assert_eq!(
            ServerError::from(error).as_status_code(),
            StatusCode::CONFLICT
        );
    }
}
