use askama::Template;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    dto::{
        appointments::{AppointmentPatch, AppointmentStats},
        blocked_days::NewBlockedDayRequest,
    },
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, csrf},
    models::{AppointmentStatus, AppointmentView, BlockedDay, Role},
    routes::pages::{CsrfForm, Layout, NoticeQuery, PageResult, render, require_role},
    services::{appointment_service, blocked_day_service, notification_service::DISPLAY_FORMAT},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/appointments/{id}/status", post(change_status))
        .route("/appointments/{id}/delete", post(delete_appointment))
        .route("/blocked-days", post(add_blocked_day))
        .route("/blocked-days/{date}/delete", post(delete_blocked_day))
}

struct DashboardRow {
    id: Uuid,
    patient_name: String,
    patient_email: String,
    patient_phone: String,
    patient_weight: String,
    date: String,
    notes: String,
    status: &'static str,
    status_label: &'static str,
    created_by: &'static str,
}

struct BlockedRow {
    date: String,
    label: String,
    open: String,
    close: String,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage {
    layout: Layout,
    stats: AppointmentStats,
    appointments: Vec<DashboardRow>,
    blocked_days: Vec<BlockedRow>,
    default_open: String,
    default_close: String,
    notice: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct BlockedDayForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(flatten)]
    day: NewBlockedDayRequest,
}

fn dashboard_row(view: AppointmentView) -> DashboardRow {
    DashboardRow {
        id: view.id,
        patient_name: view.patient_name,
        patient_email: view.patient_email,
        patient_phone: view.patient_phone,
        patient_weight: view
            .patient_weight
            .map(|w| format!("{w} kg"))
            .unwrap_or_default(),
        date: view.date.format(DISPLAY_FORMAT).to_string(),
        notes: view.notes,
        status: view.status.as_str(),
        status_label: view.status.label(),
        created_by: view.created_by.as_str(),
    }
}

fn blocked_row(day: BlockedDay) -> BlockedRow {
    BlockedRow {
        date: day.date.format("%Y-%m-%d").to_string(),
        label: day.date.format("%d/%m/%Y").to_string(),
        open: day.open_time.format("%H:%M").to_string(),
        close: day.close_time.format("%H:%M").to_string(),
    }
}

async fn render_dashboard(
    state: &AppState,
    user: &AuthUser,
    csrf_token: String,
    notice: Option<String>,
    error: Option<String>,
) -> PageResult<Response> {
    let stats = appointment_service::count_stats(state, Local::now().date_naive()).await?;
    let appointments = appointment_service::all_appointments(state).await?;
    let blocked_days = blocked_day_service::list_blocked_days(state).await?;
    let hours = state.config.clinic.default_hours;

    let page = DashboardPage {
        layout: Layout::new(state, "Dashboard", Some(user), csrf_token),
        stats,
        appointments: appointments.into_iter().map(dashboard_row).collect(),
        blocked_days: blocked_days.into_iter().map(blocked_row).collect(),
        default_open: hours.open.format("%H:%M").to_string(),
        default_close: hours.close.format("%H:%M").to_string(),
        notice,
        error,
    };
    let status = if page.error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, render(&page)?).into_response())
}

pub async fn dashboard(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Query(query): Query<NoticeQuery>,
) -> PageResult<Response> {
    let user = require_role(user, Role::Admin)?;
    let (jar, token) = csrf::ensure_token(jar, state.config.session.cookie_secure);
    let page = render_dashboard(&state, &user, token, query.text(), None).await?;
    Ok((jar, page).into_response())
}

/// Redirects back with `notice` on success; validation and not-found failures
/// are shown on the dashboard itself.
async fn finish(
    state: &AppState,
    user: &AuthUser,
    csrf_token: String,
    result: AppResult<()>,
    notice: &str,
) -> PageResult<Response> {
    match result {
        Ok(()) => Ok(Redirect::to(&format!("/admin/dashboard?notice={notice}")).into_response()),
        Err(err @ (AppError::BadRequest(_) | AppError::NotFound(_))) => {
            render_dashboard(state, user, csrf_token, None, Some(err.to_string())).await
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn change_status(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Path(id): Path<Uuid>,
    Form(form): Form<StatusForm>,
) -> PageResult<Response> {
    let user = require_role(user, Role::Admin)?;
    csrf::verify(&jar, &form.csrf_token)?;

    let result = async {
        let status: AppointmentStatus = form.status.parse()?;
        let patch = AppointmentPatch {
            status: Some(status),
            ..Default::default()
        };
        appointment_service::update_appointment(&state, &user, id, patch).await?;
        Ok::<(), AppError>(())
    }
    .await;
    finish(&state, &user, form.csrf_token, result, "status").await
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Path(id): Path<Uuid>,
    Form(form): Form<CsrfForm>,
) -> PageResult<Response> {
    let user = require_role(user, Role::Admin)?;
    csrf::verify(&jar, &form.csrf_token)?;

    let result = appointment_service::delete_appointment(&state, &user, id)
        .await
        .map(|_| ());
    finish(&state, &user, form.csrf_token, result, "deleted").await
}

pub async fn add_blocked_day(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Form(form): Form<BlockedDayForm>,
) -> PageResult<Response> {
    let user = require_role(user, Role::Admin)?;
    csrf::verify(&jar, &form.csrf_token)?;

    let result = blocked_day_service::add_blocked_day(&state, &user, form.day)
        .await
        .map(|_| ());
    finish(&state, &user, form.csrf_token, result, "hours_added").await
}

pub async fn delete_blocked_day(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Path(date): Path<NaiveDate>,
    Form(form): Form<CsrfForm>,
) -> PageResult<Response> {
    let user = require_role(user, Role::Admin)?;
    csrf::verify(&jar, &form.csrf_token)?;

    let result = blocked_day_service::delete_blocked_day(&state, &user, date)
        .await
        .map(|_| ());
    finish(&state, &user, form.csrf_token, result, "hours_removed").await
}
