use warp::{reject::Rejection, Filter};

use crate::error::Error;

use super::jwt::{verify_session_token, SessionData};

fn token_from_header(header: &str) -> Option<&str> {
    header
        .strip_prefix("Token ")
        .or_else(|| header.strip_prefix("Bearer "))
}

fn decode_session(header: &str) -> Option<SessionData> {
    let token = token_from_header(header)?;
    verify_session_token(token).ok().map(SessionData::from)
}

/// Requires a valid session token in the `Authorization` header.
pub fn with_session() -> impl Filter<Extract = (SessionData,), Error = Rejection> + Copy {
    warp::header::<String>("authorization").and_then(|header: String| async move {
        match decode_session(&header) {
            Some(session) => Ok(session),
            None => Err(warp::reject::custom(Error::Unauthenticated)),
        }
    })
}

/// Extracts the session when present; anonymous callers pass through.
pub fn with_possible_session(
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Copy {
    warp::header::optional::<String>("authorization")
        .map(move |header: Option<String>| header.as_deref().and_then(decode_session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_token_and_bearer_prefixes_are_accepted() {
        assert_eq!(token_from_header("Token abc"), Some("abc"));
        assert_eq!(token_from_header("Bearer abc"), Some("abc"));
        assert_eq!(token_from_header("Basic abc"), None);
    }
}
