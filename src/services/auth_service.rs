use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use uuid::Uuid;

use crate::{
    audit,
    dto::auth::{LoginRequest, RegisterRequest},
    entity::users::{Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    models::{Role, User},
    services::patient_service::{NewClient, create_client_with_patient},
    state::AppState,
    validation::{MIN_PASSWORD_LEN, is_valid_email},
};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

/// Hash of a random secret nobody knows; the account cannot log in until reset.
pub fn unusable_password_hash() -> AppResult<String> {
    hash_password(&Uuid::new_v4().to_string())
}

pub async fn register_user(state: &AppState, payload: RegisterRequest) -> AppResult<User> {
    let RegisterRequest {
        name,
        email,
        phone,
        password,
        password_confirmation,
    } = payload;
    let (name, email, phone) = (name.trim(), email.trim().to_lowercase(), phone.trim());

    if name.is_empty() || email.is_empty() || phone.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("Please fill in all fields".into()));
    }
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email format".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password != password_confirmation {
        return Err(AppError::BadRequest("Passwords do not match".into()));
    }

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    const DUPLICATE: &str = "Email is already registered";
    if exist.is_some() {
        return Err(AppError::BadRequest(DUPLICATE.into()));
    }

    let password_hash = hash_password(&password)?;

    let txn = state.orm.begin().await?;
    let (user, _patient) = create_client_with_patient(
        &txn,
        NewClient {
            name,
            email: &email,
            phone,
            weight: None,
            password_hash,
        },
    )
    .await
    .map_err(|e| e.or_duplicate(DUPLICATE))?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    user_from_entity(user)
}

pub async fn login_user(state: &AppState, payload: LoginRequest) -> AppResult<User> {
    let LoginRequest { email, password } = payload;
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("Please fill in all fields".into()));
    }

    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    audit::record(
        state,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    user_from_entity(user)
}

pub async fn find_user(state: &AppState, user_id: Uuid) -> AppResult<User> {
    let user = Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    user_from_entity(user)
}

pub fn user_from_entity(model: UserModel) -> AppResult<User> {
    let role: Role = model
        .role
        .parse()
        .map_err(|_| AppError::Internal(anyhow::anyhow!("user {} has unknown role", model.id)))?;
    Ok(User {
        id: model.id,
        name: model.name,
        email: model.email,
        phone: model.phone,
        role,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("secret1").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default().verify_password(b"secret1", &parsed).is_ok());
        assert!(Argon2::default().verify_password(b"secret2", &parsed).is_err());
    }
}
