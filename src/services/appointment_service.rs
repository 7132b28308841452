use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set,
    prelude::DateTimeWithTimeZone,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::appointments::{
        AppointmentEnvelope, AppointmentList, AppointmentPatch, AppointmentStats, CreatedAppointment,
        NewAppointmentRequest, StatsEnvelope,
    },
    entity::{
        appointments::{
            self, ActiveModel as AppointmentActive, Column as AppCol, Entity as Appointments,
            Model as AppointmentModel,
        },
        patients::{self, Column as PatientCol},
        users::Column as UserCol,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Appointment, AppointmentStatus, AppointmentView, Role},
    response::ApiResponse,
    services::{
        notification_service::{self, AppointmentEmailData},
        patient_service::{self, ContactUpdate},
        schedule_service::ensure_schedulable,
    },
    state::AppState,
    validation::{optional_phone, optional_weight, require_datetime, require_email},
};

#[derive(Debug, FromQueryResult)]
struct AppointmentRow {
    id: Uuid,
    patient_id: Uuid,
    scheduled_at: NaiveDateTime,
    notes: String,
    status: String,
    created_by: String,
    created_at: DateTimeWithTimeZone,
    patient_name: String,
    patient_email: String,
    patient_phone: String,
    patient_weight: Option<f64>,
}

fn view_query() -> Select<Appointments> {
    Appointments::find()
        .select_only()
        .columns([
            AppCol::Id,
            AppCol::PatientId,
            AppCol::ScheduledAt,
            AppCol::Notes,
            AppCol::Status,
            AppCol::CreatedBy,
            AppCol::CreatedAt,
        ])
        .column_as(UserCol::Name, "patient_name")
        .column_as(PatientCol::Email, "patient_email")
        .column_as(PatientCol::Phone, "patient_phone")
        .column_as(PatientCol::Weight, "patient_weight")
        .join(JoinType::InnerJoin, appointments::Relation::Patients.def())
        .join(JoinType::InnerJoin, patients::Relation::Users.def())
}

async fn fetch_views<C: ConnectionTrait>(
    db: &C,
    query: Select<Appointments>,
) -> AppResult<Vec<AppointmentView>> {
    query
        .into_model::<AppointmentRow>()
        .all(db)
        .await?
        .into_iter()
        .map(view_from_row)
        .collect()
}

pub async fn all_appointments(state: &AppState) -> AppResult<Vec<AppointmentView>> {
    fetch_views(&state.orm, view_query().order_by_desc(AppCol::ScheduledAt)).await
}

pub async fn list_appointments(
    state: &AppState,
    _user: &AuthUser,
) -> AppResult<ApiResponse<AppointmentList>> {
    let appointments = all_appointments(state).await?;
    Ok(ApiResponse::data(AppointmentList { appointments }))
}

/// Appointments booked by or for the patient behind `user_id`.
pub async fn list_for_user(state: &AppState, user_id: Uuid) -> AppResult<Vec<AppointmentView>> {
    fetch_views(
        &state.orm,
        view_query()
            .filter(PatientCol::UserId.eq(user_id))
            .order_by_desc(AppCol::ScheduledAt),
    )
    .await
}

pub async fn get_appointment(
    state: &AppState,
    _user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<AppointmentEnvelope>> {
    let appointment = fetch_views(&state.orm, view_query().filter(AppCol::Id.eq(id)))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("Appointment"))?;
    Ok(ApiResponse::data(AppointmentEnvelope { appointment }))
}

/// Admin booking on behalf of a patient, matched or created by email.
pub async fn create_appointment(
    state: &AppState,
    user: &AuthUser,
    payload: NewAppointmentRequest,
) -> AppResult<ApiResponse<CreatedAppointment>> {
    ensure_admin(user)?;

    let name = payload.patient_name.trim();
    let email = payload.patient_email.trim().to_lowercase();
    if name.is_empty() || email.is_empty() || payload.date.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Patient name, email and date are required".into(),
        ));
    }
    require_email(&email)?;
    let phone = payload.patient_phone.as_deref().map(str::trim);
    optional_phone(phone)?;
    optional_weight(payload.patient_weight)?;
    let scheduled_at = require_datetime(&payload.date)?;
    ensure_schedulable(&state.orm, state.config.clinic.default_hours, scheduled_at).await?;

    let patient = patient_service::upsert_patient_by_email(
        state,
        name,
        &email,
        ContactUpdate {
            phone: phone.filter(|p| !p.is_empty()),
            weight: payload.patient_weight,
            email: None,
        },
    )
    .await?;

    let notes = payload.notes.unwrap_or_default().trim().to_string();
    let appointment =
        insert_appointment(&state.orm, patient.id, scheduled_at, &notes, Role::Admin).await?;

    audit::record(
        state,
        Some(user.user_id),
        "appointment_create",
        "appointments",
        serde_json::json!({ "appointment_id": appointment.id, "patient_id": patient.id }),
    )
    .await;

    notification_service::notify_patient(
        state,
        &patient.email,
        &AppointmentEmailData {
            patient_name: name.to_string(),
            date: scheduled_at,
            notes,
            status: AppointmentStatus::Pending,
        },
    )
    .await;

    Ok(ApiResponse::success(
        "Appointment created",
        CreatedAppointment { id: appointment.id },
    ))
}

pub struct BookingRequest {
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub patient_weight: Option<f64>,
    pub date: String,
    pub notes: String,
}

/// A client requesting an appointment for themself.
pub async fn book_for_client(
    state: &AppState,
    user: &AuthUser,
    request: BookingRequest,
) -> AppResult<Appointment> {
    let name = request.patient_name.trim();
    let email = request.patient_email.trim().to_lowercase();
    let phone = request.patient_phone.trim();
    if name.is_empty() || email.is_empty() || request.date.trim().is_empty() {
        return Err(AppError::BadRequest("Please fill in all required fields".into()));
    }
    require_email(&email)?;
    optional_phone(Some(phone))?;
    optional_weight(request.patient_weight)?;
    let scheduled_at = require_datetime(&request.date)?;
    ensure_schedulable(&state.orm, state.config.clinic.default_hours, scheduled_at).await?;

    let patient = patient_service::upsert_patient_for_user(
        state,
        user.user_id,
        ContactUpdate {
            phone: Some(phone),
            weight: request.patient_weight,
            email: Some(&email),
        },
    )
    .await?;

    let notes = request.notes.trim().to_string();
    let appointment =
        insert_appointment(&state.orm, patient.id, scheduled_at, &notes, Role::Client).await?;

    audit::record(
        state,
        Some(user.user_id),
        "appointment_request",
        "appointments",
        serde_json::json!({ "appointment_id": appointment.id }),
    )
    .await;

    let data = AppointmentEmailData {
        patient_name: name.to_string(),
        date: scheduled_at,
        notes,
        status: AppointmentStatus::Pending,
    };
    notification_service::notify_patient(state, &email, &data).await;
    notification_service::notify_admin_new_request(state, &data, &email, phone).await;

    appointment_from_entity(appointment)
}

async fn insert_appointment<C: ConnectionTrait>(
    db: &C,
    patient_id: Uuid,
    scheduled_at: NaiveDateTime,
    notes: &str,
    created_by: Role,
) -> AppResult<AppointmentModel> {
    let appointment = AppointmentActive {
        id: Set(Uuid::new_v4()),
        patient_id: Set(patient_id),
        scheduled_at: Set(scheduled_at),
        notes: Set(notes.to_string()),
        status: Set(AppointmentStatus::Pending.as_str().to_string()),
        created_by: Set(created_by.as_str().to_string()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(db)
    .await?;
    Ok(appointment)
}

pub async fn update_appointment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AppointmentPatch,
) -> AppResult<ApiResponse<AppointmentEnvelope>> {
    ensure_admin(user)?;
    let patch = payload.validate()?;

    let existing = Appointments::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(a) => a,
        None => return Err(AppError::not_found("Appointment")),
    };
    let previous_status: AppointmentStatus = existing.status.parse().map_err(|_| corrupt(id))?;

    if let Some(date) = patch.date.filter(|d| *d != existing.scheduled_at) {
        ensure_schedulable(&state.orm, state.config.clinic.default_hours, date).await?;
    }

    let mut active: AppointmentActive = existing.into();
    if let Some(date) = patch.date {
        active.scheduled_at = Set(date);
    }
    if let Some(notes) = patch.notes {
        active.notes = Set(notes);
    }
    if let Some(status) = patch.status {
        active.status = Set(status.as_str().to_string());
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "appointment_update",
        "appointments",
        serde_json::json!({ "appointment_id": updated.id, "status": updated.status }),
    )
    .await;

    if let Some(status) = patch.status.filter(|s| *s != previous_status) {
        send_status_change(state, &updated, status).await;
    }

    Ok(updated_response(get_appointment(state, user, id).await, updated.id))
}

/// The row is already saved; a failed reload only drops the payload.
fn updated_response(
    reloaded: AppResult<ApiResponse<AppointmentEnvelope>>,
    id: Uuid,
) -> ApiResponse<AppointmentEnvelope> {
    let data = match reloaded {
        Ok(resp) => resp.data,
        Err(err) => {
            tracing::warn!(appointment_id = %id, error = %err, "reload after update failed");
            None
        }
    };
    ApiResponse {
        success: true,
        message: Some("Appointment updated".into()),
        data,
    }
}

async fn send_status_change(
    state: &AppState,
    appointment: &AppointmentModel,
    status: AppointmentStatus,
) {
    let contact = match patient_service::find_contact(&state.orm, appointment.patient_id).await {
        Ok(contact) => contact,
        Err(err) => {
            tracing::warn!(appointment_id = %appointment.id, error = %err, "contact lookup for status notification failed");
            return;
        }
    };
    let Some((patient_name, email)) = contact else {
        tracing::warn!(appointment_id = %appointment.id, "no contact for status notification");
        return;
    };

    notification_service::notify_patient(
        state,
        &email,
        &AppointmentEmailData {
            patient_name,
            date: appointment.scheduled_at,
            notes: appointment.notes.clone(),
            status,
        },
    )
    .await;
}

pub async fn delete_appointment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<()>> {
    ensure_admin(user)?;
    let result = Appointments::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("Appointment"));
    }

    audit::record(
        state,
        Some(user.user_id),
        "appointment_delete",
        "appointments",
        serde_json::json!({ "appointment_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Appointment deleted"))
}

/// Half-open `[start, end)` windows for today, this Monday-Sunday week and this month.
pub fn stats_windows(today: NaiveDate) -> [(NaiveDateTime, NaiveDateTime); 3] {
    let day_start = |d: NaiveDate| d.and_time(NaiveTime::MIN);
    let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let month_start = today.with_day(1).unwrap_or(today);
    let next_month = if today.month() == 12 {
        NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
    }
    .unwrap_or(today);

    [
        (day_start(today), day_start(today + Duration::days(1))),
        (day_start(week_start), day_start(week_start + Duration::days(7))),
        (day_start(month_start), day_start(next_month)),
    ]
}

pub async fn appointment_stats(
    state: &AppState,
    user: &AuthUser,
    today: NaiveDate,
) -> AppResult<ApiResponse<StatsEnvelope>> {
    ensure_admin(user)?;
    let stats = count_stats(state, today).await?;
    Ok(ApiResponse::data(StatsEnvelope { stats }))
}

pub async fn count_stats(state: &AppState, today: NaiveDate) -> AppResult<AppointmentStats> {
    let [day, week, month] = stats_windows(today);
    Ok(AppointmentStats {
        today: count_between(&state.orm, day).await?,
        week: count_between(&state.orm, week).await?,
        month: count_between(&state.orm, month).await?,
    })
}

async fn count_between<C: ConnectionTrait>(
    db: &C,
    (start, end): (NaiveDateTime, NaiveDateTime),
) -> AppResult<u64> {
    let count = Appointments::find()
        .filter(AppCol::ScheduledAt.gte(start))
        .filter(AppCol::ScheduledAt.lt(end))
        .count(db)
        .await?;
    Ok(count)
}

fn corrupt(id: Uuid) -> AppError {
    AppError::Internal(anyhow::anyhow!("appointment {id} has an unknown status or creator"))
}

fn view_from_row(row: AppointmentRow) -> AppResult<AppointmentView> {
    Ok(AppointmentView {
        id: row.id,
        patient_id: row.patient_id,
        patient_name: row.patient_name,
        patient_email: row.patient_email,
        patient_phone: row.patient_phone,
        patient_weight: row.patient_weight,
        date: row.scheduled_at,
        notes: row.notes,
        status: row.status.parse().map_err(|_| corrupt(row.id))?,
        created_by: row.created_by.parse().map_err(|_| corrupt(row.id))?,
        created_at: row.created_at.with_timezone(&Utc),
    })
}

fn appointment_from_entity(model: AppointmentModel) -> AppResult<Appointment> {
    Ok(Appointment {
        id: model.id,
        patient_id: model.patient_id,
        date: model.scheduled_at,
        notes: model.notes,
        status: model.status.parse().map_err(|_| corrupt(model.id))?,
        created_by: model.created_by.parse().map_err(|_| corrupt(model.id))?,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sea_orm::{DatabaseConnection, DbErr};

    use crate::{
        config::{AppConfig, ClinicConfig, SessionConfig},
        mailer::RecordingMailer,
    };

    fn offline_state(mailer: Arc<RecordingMailer>) -> AppState {
        let config = AppConfig {
            database_url: String::new(),
            host: "127.0.0.1".into(),
            port: 0,
            session: SessionConfig {
                secret: "unit-secret".into(),
                ttl_hours: 1,
                cookie_secure: false,
            },
            clinic: ClinicConfig::default(),
            smtp: None,
        };
        AppState::new(DatabaseConnection::Disconnected, config, mailer)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn stats_windows_cover_day_week_and_month() {
        // Wednesday
        let [day, week, month] = stats_windows(ymd(2025, 1, 22));
        assert_eq!(day.0.date(), ymd(2025, 1, 22));
        assert_eq!(day.1.date(), ymd(2025, 1, 23));
        assert_eq!(week.0.date(), ymd(2025, 1, 20));
        assert_eq!(week.1.date(), ymd(2025, 1, 27));
        assert_eq!(month.0.date(), ymd(2025, 1, 1));
        assert_eq!(month.1.date(), ymd(2025, 2, 1));
    }

    #[test]
    fn december_month_window_rolls_into_next_year() {
        let [_, week, month] = stats_windows(ymd(2024, 12, 29));
        assert_eq!(week.0.date(), ymd(2024, 12, 23));
        assert_eq!(month.1.date(), ymd(2025, 1, 1));
    }

    #[tokio::test]
    async fn status_email_lookup_failure_is_swallowed() {
        let mailer = Arc::new(RecordingMailer::new());
        let state = offline_state(mailer.clone());
        let appointment = AppointmentModel {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            scheduled_at: ymd(2031, 3, 4).and_hms_opt(10, 0, 0).unwrap(),
            notes: String::new(),
            status: AppointmentStatus::Approved.as_str().to_string(),
            created_by: Role::Admin.as_str().to_string(),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        };

        send_status_change(&state, &appointment, AppointmentStatus::Approved).await;
        assert!(mailer.sent().is_empty());
    }

    #[test]
    fn failed_reload_still_reports_the_update() {
        let resp = updated_response(
            Err(AppError::Orm(DbErr::Custom("connection reset".into()))),
            Uuid::new_v4(),
        );
        assert!(resp.success);
        assert_eq!(resp.message.as_deref(), Some("Appointment updated"));
        assert!(resp.data.is_none());
    }
}
