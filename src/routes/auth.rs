use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::{
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest, UserEnvelope},
    error::{AppError, AppResult},
    middleware::{
        auth::{AuthUser, clear_session, issue_session_token, session_cookie},
        csrf,
    },
    models::User,
    response::ApiResponse,
    routes::pages::{CsrfForm, Layout, NoticeQuery, PageResult, home_for, render},
    services::auth_service::{login_user, register_user},
    state::AppState,
};

/// JSON account endpoints under `/api/auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn page_router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/register", get(register_page).post(register_submit))
        .route("/logout", post(logout))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register a client account", body = UserEnvelope),
        (status = 400, description = "Invalid fields or email already registered")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserEnvelope>>)> {
    let user = register_user(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Registered", UserEnvelope { user })),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token for the Authorization header", body = LoginResponse),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let user = login_user(&state, payload).await?;
    let token = issue_session_token(&state.config.session, &user)?;
    Ok(Json(ApiResponse::success(
        "Logged in",
        LoginResponse { token, user },
    )))
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginPage {
    layout: Layout,
    email: String,
    error: Option<String>,
    notice: Option<String>,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterPage {
    layout: Layout,
    name: String,
    email: String,
    phone: String,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(flatten)]
    credentials: LoginRequest,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(flatten)]
    account: RegisterRequest,
}

fn session_user(user: &User) -> AuthUser {
    AuthUser {
        user_id: user.id,
        role: user.role,
        name: user.name.clone(),
    }
}

pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Query(query): Query<NoticeQuery>,
) -> PageResult<Response> {
    if let Some(user) = user {
        return Ok(Redirect::to(home_for(&user)).into_response());
    }
    let (jar, token) = csrf::ensure_token(jar, state.config.session.cookie_secure);
    let page = LoginPage {
        layout: Layout::new(&state, "Log in", None, token),
        email: String::new(),
        error: None,
        notice: query.text(),
    };
    Ok((jar, render(&page)?).into_response())
}

pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> PageResult<Response> {
    csrf::verify(&jar, &form.csrf_token)?;
    let email = form.credentials.email.trim().to_string();

    match login_user(&state, form.credentials).await {
        Ok(user) => {
            let token = issue_session_token(&state.config.session, &user)?;
            let jar = jar.add(session_cookie(&state.config.session, token));
            tracing::info!(user_id = %user.id, "user logged in");
            Ok((jar, Redirect::to(home_for(&session_user(&user)))).into_response())
        }
        Err(AppError::BadRequest(message)) => {
            let page = LoginPage {
                layout: Layout::new(&state, "Log in", None, form.csrf_token),
                email,
                error: Some(message),
                notice: None,
            };
            Ok((StatusCode::BAD_REQUEST, render(&page)?).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn register_page(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
) -> PageResult<Response> {
    if let Some(user) = user {
        return Ok(Redirect::to(home_for(&user)).into_response());
    }
    let (jar, token) = csrf::ensure_token(jar, state.config.session.cookie_secure);
    let page = RegisterPage {
        layout: Layout::new(&state, "Create account", None, token),
        name: String::new(),
        email: String::new(),
        phone: String::new(),
        error: None,
    };
    Ok((jar, render(&page)?).into_response())
}

pub async fn register_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> PageResult<Response> {
    csrf::verify(&jar, &form.csrf_token)?;
    let (name, email, phone) = (
        form.account.name.clone(),
        form.account.email.clone(),
        form.account.phone.clone(),
    );

    match register_user(&state, form.account).await {
        Ok(_) => Ok(Redirect::to("/login?notice=registered").into_response()),
        Err(AppError::BadRequest(message)) => {
            let page = RegisterPage {
                layout: Layout::new(&state, "Create account", None, form.csrf_token),
                name,
                email,
                phone,
                error: Some(message),
            };
            Ok((StatusCode::BAD_REQUEST, render(&page)?).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn logout(jar: CookieJar, Form(form): Form<CsrfForm>) -> PageResult<Response> {
    csrf::verify(&jar, &form.csrf_token)?;
    Ok((clear_session(jar), Redirect::to("/login")).into_response())
}
