use std::convert::Infallible;

use serde_json::{json, Value};
use thiserror::Error;
use warp::{http::StatusCode, reject::Rejection, reply::Reply};

/// Request-level error taxonomy. Every failure that can reach the HTTP
/// boundary is one of these; the recovery filter renders them as JSON.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Malformed or out-of-range input, keyed by the offending field.
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("You cannot subscribe to yourself")]
    SelfSubscription,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            // Business conflicts are reported as 400, not 409.
            Error::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            Error::SelfSubscription => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Error::Validation { field, message } => {
                let mut map = serde_json::Map::new();
                map.insert(field.to_string(), Value::String(message.clone()));
                Value::Object(map)
            }
            other => json!({ "errors": format!("{other}") }),
        }
    }
}

// warp's blanket `impl<T: Reject> From<T> for Rejection` gives the handlers
// their `?` conversion.
impl warp::reject::Reject for Error {}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::NotFound("No such record".to_string()),
            sqlx::Error::Database(e) => match e.kind() {
                // A racing insert that slips past the existence pre-check
                // still surfaces as a business conflict, not a 500.
                sqlx::error::ErrorKind::UniqueViolation => {
                    Self::AlreadyExists("Record already exists".to_string())
                }
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    Self::NotFound("Referenced record does not exist".to_string())
                }
                _ => Self::Internal(format!("{e}")),
            },
            e => Self::Internal(format!("{e}")),
        }
    }
}

/// Terminal recovery filter: turns rejections into JSON error replies.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(e) = err.find::<Error>() {
        if let Error::Internal(info) = e {
            log::error!("internal error: {info}");
        }
        (e.status(), e.body())
    } else if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            json!({ "errors": "Resource not found" }),
        )
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, json!({ "errors": format!("{e}") }))
    } else if err.find::<warp::reject::MissingHeader>().is_some() {
        (
            StatusCode::UNAUTHORIZED,
            json!({ "errors": "Authentication required" }),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "errors": "Method not allowed" }),
        )
    } else {
        log::error!("unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "errors": "Internal server error" }),
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_field_keyed() {
        let err = Error::validation("tags", "Tags must not repeat");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body(), json!({ "tags": "Tags must not repeat" }));
    }

    #[test]
    fn conflicts_map_to_bad_request() {
        let err = Error::AlreadyExists("Recipe is already in favorites".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.body(),
            json!({ "errors": "Recipe is already in favorites" })
        );
    }

    #[test]
    fn missing_rows_map_to_not_found() {
        let err = Error::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn errors_convert_into_rejections() {
        let rejection: Rejection = Error::Unauthenticated.into();
        assert!(rejection.find::<Error>().is_some());
    }

    #[test]
    fn self_subscription_is_a_bad_request() {
        let err = Error::SelfSubscription;
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.body(),
            json!({ "errors": "You cannot subscribe to yourself" })
        );
    }
}
