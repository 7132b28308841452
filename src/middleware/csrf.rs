use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use password_hash::rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;

use crate::error::AppError;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_FIELD: &str = "csrf_token";

/// Returns the token already bound to the browser, or mints and sets a new one.
pub fn ensure_token(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    if let Some(existing) = jar.get(CSRF_COOKIE) {
        let token = existing.value().to_string();
        return (jar, token);
    }

    let token = generate_token();
    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build();
    (jar.add(cookie), token)
}

pub fn verify(jar: &CookieJar, submitted: &str) -> Result<(), AppError> {
    let expected = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(invalid)?;

    if expected.is_empty() || !bool::from(expected.as_bytes().ct_eq(submitted.as_bytes())) {
        return Err(invalid());
    }
    Ok(())
}

fn invalid() -> AppError {
    AppError::BadRequest("Invalid security token".into())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
