use askama::Template;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::{
    error::AppError,
    middleware::auth::AuthUser,
    models::Role,
    state::AppState,
};

/// What every page passes to `base.html`.
pub struct Layout {
    pub title: &'static str,
    pub doctor_name: String,
    pub doctor_specialty: String,
    pub user: Option<NavUser>,
    pub csrf_token: String,
}

pub struct NavUser {
    pub name: String,
    pub is_admin: bool,
}

impl Layout {
    pub fn new(
        state: &AppState,
        title: &'static str,
        user: Option<&AuthUser>,
        csrf_token: String,
    ) -> Self {
        let doctor = &state.config.clinic.doctor;
        Self {
            title,
            doctor_name: doctor.name.clone(),
            doctor_specialty: doctor.specialty.clone(),
            user: user.map(|u| NavUser {
                name: u.name.clone(),
                is_admin: u.is_admin(),
            }),
            csrf_token,
        }
    }

    fn bare(title: &'static str) -> Self {
        Self {
            title,
            doctor_name: String::new(),
            doctor_specialty: String::new(),
            user: None,
            csrf_token: String::new(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorPage {
    layout: Layout,
    status: u16,
    message: String,
}

pub fn render<T: Template>(template: &T) -> Result<Html<String>, AppError> {
    template
        .render()
        .map(Html)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

/// Failure of an HTML page: either a redirect or an error page.
#[derive(Debug)]
pub enum PageError {
    Redirect(&'static str),
    App(AppError),
}

pub type PageResult<T> = Result<T, PageError>;

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        PageError::App(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let err = match self {
            PageError::Redirect(to) => return Redirect::to(to).into_response(),
            PageError::App(AppError::Unauthorized) => return Redirect::to("/login").into_response(),
            PageError::App(err) => err,
        };

        err.log();
        let status = err.status();
        let page = ErrorPage {
            layout: Layout::bare("Error"),
            status: status.as_u16(),
            message: err.public_message(),
        };
        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(_) => (status, err.public_message()).into_response(),
        }
    }
}

pub fn home_for(user: &AuthUser) -> &'static str {
    match user.role {
        Role::Admin => "/admin/dashboard",
        Role::Client => "/client/book",
    }
}

/// Logged-in user with `role`; anyone else is sent to login or their own home page.
pub fn require_role(user: Option<AuthUser>, role: Role) -> PageResult<AuthUser> {
    let user = user.ok_or(PageError::Redirect("/login"))?;
    if user.role != role {
        return Err(PageError::Redirect(home_for(&user)));
    }
    Ok(user)
}

pub async fn home(user: Option<AuthUser>) -> Redirect {
    match user {
        Some(user) => Redirect::to(home_for(&user)),
        None => Redirect::to("/login"),
    }
}

/// Form carrying nothing but the anti-forgery token.
#[derive(Debug, Default, Deserialize)]
pub struct CsrfForm {
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

impl NoticeQuery {
    pub fn text(&self) -> Option<String> {
        let text = match self.notice.as_deref()? {
            "registered" => "Account created. You can log in now.",
            "booked" => "Appointment requested. You will receive an email once it is reviewed.",
            "status" => "Appointment status updated.",
            "deleted" => "Appointment deleted.",
            "hours_added" => "Custom hours saved.",
            "hours_removed" => "Custom hours removed.",
            _ => return None,
        };
        Some(text.to_string())
    }
}
