use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{
    config::SessionConfig,
    dto::auth::Claims,
    error::AppError,
    models::{Role, User},
    state::AppState,
};

pub const SESSION_COOKIE: &str = "session";

/// The authenticated caller, decoded from the session cookie or a bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub name: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn ensure_role(user: &AuthUser, role: Role) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::Admin)
}

pub fn issue_session_token(config: &SessionConfig, user: &User) -> Result<String, AppError> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(config.ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.as_str().to_string(),
        name: user.name.clone(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn decode_session_token(secret: &str, token: &str) -> Option<AuthUser> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    let claims = decoded.claims;
    Some(AuthUser {
        user_id: Uuid::parse_str(&claims.sub).ok()?,
        role: claims.role.parse().ok()?,
        name: claims.name,
    })
}

pub fn session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth_str.strip_prefix("Bearer ").map(str::trim)
}

/// The session cookie wins when it decodes; a stale one falls through to the bearer header.
fn user_from_headers(headers: &HeaderMap, secret: &str) -> Option<AuthUser> {
    let jar = CookieJar::from_headers(headers);
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| decode_session_token(secret, cookie.value()))
        .or_else(|| bearer_token(headers).and_then(|token| decode_session_token(secret, token)))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers, &state.config.session.secret).ok_or(AppError::Unauthorized)
    }
}

impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(user_from_headers(&parts.headers, &state.config.session.secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig {
            secret: "test-secret".into(),
            ttl_hours: 1,
            cookie_secure: false,
        }
    }

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            phone: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn session_token_carries_id_role_and_name() {
        let user = user(Role::Admin);
        let token = issue_session_token(&config(), &user).unwrap();
        let decoded = decode_session_token("test-secret", &token).unwrap();
        assert_eq!(decoded.user_id, user.id);
        assert_eq!(decoded.role, Role::Admin);
        assert_eq!(decoded.name, "Ana");
        assert!(ensure_admin(&decoded).is_ok());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_session_token(&config(), &user(Role::Client)).unwrap();
        assert!(decode_session_token("another-secret", &token).is_none());
    }

    #[test]
    fn client_is_forbidden_from_admin_operations() {
        let client = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Client,
            name: "Bo".into(),
        };
        assert!(matches!(ensure_admin(&client), Err(AppError::Forbidden)));
    }

    #[test]
    fn bearer_header_is_accepted_when_cookie_missing() {
        let admin = user(Role::Admin);
        let token = issue_session_token(&config(), &admin).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        let found = user_from_headers(&headers, "test-secret").unwrap();
        assert_eq!(found.user_id, admin.id);
    }

    #[test]
    fn stale_cookie_does_not_hide_valid_bearer() {
        let admin = user(Role::Admin);
        let client = user(Role::Client);
        let bearer = issue_session_token(&config(), &admin).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, format!("Bearer {bearer}").parse().unwrap());
        headers.insert(header::COOKIE, "session=expired.or.garbage".parse().unwrap());
        assert_eq!(user_from_headers(&headers, "test-secret").unwrap().user_id, admin.id);

        let cookie = issue_session_token(&config(), &client).unwrap();
        headers.insert(header::COOKIE, format!("session={cookie}").parse().unwrap());
        assert_eq!(user_from_headers(&headers, "test-secret").unwrap().user_id, client.id);
    }
}
