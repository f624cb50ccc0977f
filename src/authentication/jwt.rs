use chrono::Duration;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::schema::{User, Uuid};
use crate::error::Error;

const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    iat: i64,
    exp: i64,
}

impl TokenClaims {
    pub fn new(user: &User) -> Self {
        let now = Utc::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp();

        Self {
            user_id: user.id,
            username: user.username.to_owned(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            iat,
            exp,
        }
    }
}

/// Caller identity carried through a request, decoded from the session token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl SessionData {
    pub fn is_admin(&self) -> bool {
        self.is_staff || self.is_superuser
    }
}

impl From<TokenClaims> for SessionData {
    fn from(claims: TokenClaims) -> Self {
        SessionData {
            user_id: claims.user_id,
            username: claims.username,
            is_staff: claims.is_staff,
            is_superuser: claims.is_superuser,
        }
    }
}

fn signing_key() -> Result<Hmac<Sha256>, Error> {
    let secret = std::env::var("SESSION_SECRET").unwrap_or_else(|_| String::from("secret"));

    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::internal(format!("Invalid session secret: {e}")))
}

pub fn generate_session_token(user: &User) -> Result<String, Error> {
    let key = signing_key()?;
    let claims = TokenClaims::new(user);

    claims
        .sign_with_key(&key)
        .map_err(|e| Error::internal(format!("Failed to sign session token: {e}")))
}

pub fn verify_session_token(token: &str) -> Result<TokenClaims, Error> {
    let key = signing_key()?;

    let claims: TokenClaims = token
        .verify_with_key(&key)
        .map_err(|_| Error::Unauthenticated)?;

    let now = Utc::now().timestamp();
    if claims.exp <= now {
        return Err(Error::Unauthenticated);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password: String::new(),
            is_staff: false,
            is_superuser: false,
        }
    }

    #[test]
    fn token_round_trip() {
        let token = generate_session_token(&user()).unwrap();
        let claims = verify_session_token(&token).unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "ada");
        assert!(!SessionData::from(claims).is_admin());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify_session_token("not-a-token").is_err());
    }
}
