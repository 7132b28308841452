use askama::Template;
use axum::{
    Form, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::{
    error::AppError,
    middleware::{auth::AuthUser, csrf},
    models::{AppointmentStatus, AppointmentView, Role},
    routes::pages::{Layout, NoticeQuery, PageResult, render, require_role},
    services::{
        appointment_service::{self, BookingRequest},
        auth_service, patient_service,
        notification_service::DISPLAY_FORMAT,
        schedule_service::{effective_hours, find_blocked_day},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/book", get(book_page).post(book_submit))
        .route("/appointments", get(my_appointments))
}

/// Values of the booking form, echoed back when it has to be shown again.
#[derive(Debug, Default, Deserialize)]
pub struct BookingForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(default)]
    patient_name: String,
    #[serde(default)]
    patient_email: String,
    #[serde(default)]
    patient_phone: String,
    #[serde(default)]
    patient_weight: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    time: String,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    date: Option<String>,
    #[serde(flatten)]
    notice: NoticeQuery,
}

#[derive(Template)]
#[template(path = "book.html")]
struct BookPage {
    layout: Layout,
    form: BookingForm,
    day: String,
    day_label: String,
    min_date: String,
    open: String,
    close: String,
    custom_hours: bool,
    slots: Vec<String>,
    error: Option<String>,
    notice: Option<String>,
}

struct AppointmentLine {
    date: String,
    notes: String,
    status: &'static str,
    status_label: &'static str,
}

#[derive(Template)]
#[template(path = "my_appointments.html")]
struct MyAppointmentsPage {
    layout: Layout,
    appointments: Vec<AppointmentLine>,
    pending: usize,
    approved: usize,
    rejected: usize,
    notice: Option<String>,
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

async fn render_book_page(
    state: &AppState,
    user: &AuthUser,
    form: BookingForm,
    day: NaiveDate,
    error: Option<String>,
    notice: Option<String>,
) -> PageResult<Html<String>> {
    let blocked = find_blocked_day(&state.orm, day).await?;
    let hours = effective_hours(blocked.as_ref(), state.config.clinic.default_hours);
    let slots = hours
        .slots(state.config.clinic.slot_minutes)
        .iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect();

    let page = BookPage {
        layout: Layout::new(state, "Book an appointment", Some(user), form.csrf_token.clone()),
        form,
        day: day.format("%Y-%m-%d").to_string(),
        day_label: day.format("%d/%m/%Y").to_string(),
        min_date: Local::now().date_naive().format("%Y-%m-%d").to_string(),
        open: hours.open.format("%H:%M").to_string(),
        close: hours.close.format("%H:%M").to_string(),
        custom_hours: blocked.is_some(),
        slots,
        error,
        notice,
    };
    Ok(render(&page)?)
}

pub async fn book_page(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Query(query): Query<BookQuery>,
) -> PageResult<Response> {
    let user = require_role(user, Role::Client)?;
    let (jar, token) = csrf::ensure_token(jar, state.config.session.cookie_secure);

    let account = auth_service::find_user(&state, user.user_id).await?;
    let patient = patient_service::find_patient_for_user(&state, user.user_id).await?;
    let day = query
        .date
        .as_deref()
        .and_then(parse_day)
        .unwrap_or_else(|| Local::now().date_naive());

    let form = BookingForm {
        csrf_token: token,
        patient_name: account.name,
        patient_email: patient
            .as_ref()
            .map(|p| p.email.clone())
            .filter(|e| !e.is_empty())
            .unwrap_or(account.email),
        patient_phone: patient
            .as_ref()
            .map(|p| p.phone.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or(account.phone),
        patient_weight: patient
            .and_then(|p| p.weight)
            .map(|w| w.to_string())
            .unwrap_or_default(),
        date: day.format("%Y-%m-%d").to_string(),
        ..Default::default()
    };

    let html = render_book_page(&state, &user, form, day, None, query.notice.text()).await?;
    Ok((jar, html).into_response())
}

pub async fn book_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Form(form): Form<BookingForm>,
) -> PageResult<Response> {
    let user = require_role(user, Role::Client)?;
    csrf::verify(&jar, &form.csrf_token)?;

    let result = match parse_weight(&form.patient_weight) {
        Ok(patient_weight) => {
            let request = BookingRequest {
                patient_name: form.patient_name.clone(),
                patient_email: form.patient_email.clone(),
                patient_phone: form.patient_phone.clone(),
                patient_weight,
                date: format!("{} {}", form.date.trim(), form.time.trim()),
                notes: form.notes.clone(),
            };
            appointment_service::book_for_client(&state, &user, request).await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(appointment) => {
            tracing::info!(appointment_id = %appointment.id, "client booked appointment");
            Ok(Redirect::to("/client/appointments?notice=booked").into_response())
        }
        Err(AppError::BadRequest(message)) => {
            let day = parse_day(&form.date).unwrap_or_else(|| Local::now().date_naive());
            let html = render_book_page(&state, &user, form, day, Some(message), None).await?;
            Ok((StatusCode::BAD_REQUEST, html).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

fn parse_weight(raw: &str) -> Result<Option<f64>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| AppError::BadRequest("Weight must be a number".into()))
}

pub async fn my_appointments(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
    Query(query): Query<NoticeQuery>,
) -> PageResult<Response> {
    let user = require_role(user, Role::Client)?;
    let (jar, token) = csrf::ensure_token(jar, state.config.session.cookie_secure);

    let appointments = appointment_service::list_for_user(&state, user.user_id).await?;
    let count = |status: AppointmentStatus| appointments.iter().filter(|a| a.status == status).count();

    let page = MyAppointmentsPage {
        layout: Layout::new(&state, "My appointments", Some(&user), token),
        pending: count(AppointmentStatus::Pending),
        approved: count(AppointmentStatus::Approved),
        rejected: count(AppointmentStatus::Rejected),
        appointments: appointments.iter().map(appointment_line).collect(),
        notice: query.text(),
    };
    Ok((jar, render(&page)?).into_response())
}

fn appointment_line(view: &AppointmentView) -> AppointmentLine {
    AppointmentLine {
        date: view.date.format(DISPLAY_FORMAT).to_string(),
        notes: view.notes.clone(),
        status: view.status.as_str(),
        status_label: view.status.label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_weight_is_optional_but_text_is_rejected() {
        assert_eq!(parse_weight("  ").unwrap(), None);
        assert_eq!(parse_weight("72.5").unwrap(), Some(72.5));
        assert!(parse_weight("heavy").is_err());
    }

    #[test]
    fn booking_day_parses_iso_dates_only() {
        assert_eq!(parse_day("2025-01-20"), NaiveDate::from_ymd_opt(2025, 1, 20));
        assert_eq!(parse_day("20/01/2025"), None);
    }
}
