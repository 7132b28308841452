use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clinic_appointments::{
    config::{AppConfig, ClinicConfig, SessionConfig},
    db::{create_orm_conn, run_migrations},
    dto::{
        appointments::{AppointmentPatch, NewAppointmentRequest},
        auth::{LoginRequest, RegisterRequest},
        blocked_days::NewBlockedDayRequest,
    },
    entity::{
        appointments::Column as AppCol,
        blocked_days::Column as BlockedCol,
        users::{ActiveModel as UserActive, Column as UserCol},
        Appointments, BlockedDays, Users,
    },
    error::AppError,
    mailer::RecordingMailer,
    middleware::auth::AuthUser,
    models::{AppointmentStatus, Role},
    services::{
        appointment_service::{self, BookingRequest},
        auth_service, blocked_day_service,
        patient_service::{NewClient, create_client_with_patient},
        schedule_service::{available_slots, can_schedule},
    },
    state::AppState,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use uuid::Uuid;

// Allow skipping when no DB is configured in the environment.
fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
            None
        }
    }
}

async fn setup_state(database_url: &str, mailer: RecordingMailer) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        session: SessionConfig {
            secret: "test-secret".into(),
            ttl_hours: 1,
            cookie_secure: false,
        },
        clinic: ClinicConfig::default(),
        smtp: None,
    };
    Ok(AppState::new(orm, config, Arc::new(mailer)))
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}+{}@example.com", Uuid::new_v4().simple())
}

async fn create_admin(state: &AppState) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set("Admin".into()),
        email: Set(unique_email("admin")),
        password_hash: Set("dummy".into()),
        phone: Set(String::new()),
        role: Set(Role::Admin.as_str().into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: Role::Admin,
        name: user.name,
    })
}

async fn clear_blocked_day(state: &AppState, day: NaiveDate) -> anyhow::Result<()> {
    BlockedDays::delete_many()
        .filter(BlockedCol::Day.eq(day))
        .exec(&state.orm)
        .await?;
    Ok(())
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
}

fn new_request(email: &str, date: &str) -> NewAppointmentRequest {
    NewAppointmentRequest {
        patient_name: "Ana Ruiz".into(),
        patient_email: email.into(),
        patient_phone: Some("555-123-4567".into()),
        patient_weight: Some(64.5),
        date: date.into(),
        notes: Some("check-up".into()),
    }
}

// Admin creates, edits, approves and deletes; only real status changes send mail.
#[tokio::test]
async fn appointment_lifecycle_sends_one_email_per_status_change() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let mailer = RecordingMailer::new();
    let state = setup_state(&url, mailer.clone()).await?;
    let admin = create_admin(&state).await?;
    let date = day(2031, 3, 17);
    clear_blocked_day(&state, date).await?;
    let email = unique_email("ana");

    // 07:59 is before opening: rejected, and nothing is written.
    let early = appointment_service::create_appointment(
        &state,
        &admin,
        new_request(&email, "2031-03-17T07:59"),
    )
    .await;
    assert!(matches!(early, Err(AppError::BadRequest(_))));
    let users = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .count(&state.orm)
        .await?;
    assert_eq!(users, 0);
    assert!(mailer.sent().is_empty());

    let created = appointment_service::create_appointment(
        &state,
        &admin,
        new_request(&email, "2031-03-17T08:00"),
    )
    .await?;
    let id = created.data.expect("created id").id;
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(mailer.sent()[0].to, email);
    assert_eq!(mailer.sent()[0].subject, "Appointment request received");

    // Notes only: no email.
    appointment_service::update_appointment(
        &state,
        &admin,
        id,
        AppointmentPatch {
            notes: Some("bring lab results".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(mailer.sent().len(), 1);

    let approved = appointment_service::update_appointment(
        &state,
        &admin,
        id,
        AppointmentPatch {
            status: Some(AppointmentStatus::Approved),
            ..Default::default()
        },
    )
    .await?;
    let view = approved.data.expect("appointment").appointment;
    assert_eq!(view.status, AppointmentStatus::Approved);
    assert_eq!(view.notes, "bring lab results");
    assert_eq!(view.patient_name, "Ana Ruiz");
    assert_eq!(view.patient_weight, Some(64.5));
    assert_eq!(mailer.sent().len(), 2);
    assert_eq!(mailer.sent()[1].subject, "Appointment confirmed");

    // Same status again is not a change.
    appointment_service::update_appointment(
        &state,
        &admin,
        id,
        AppointmentPatch {
            status: Some(AppointmentStatus::Approved),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(mailer.sent().len(), 2);

    // Moving to 17:01 fails the availability check and leaves the row untouched.
    let moved = appointment_service::update_appointment(
        &state,
        &admin,
        id,
        AppointmentPatch {
            date: Some("2031-03-17 17:01".into()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(moved, Err(AppError::BadRequest(_))));
    let stored = Appointments::find_by_id(id).one(&state.orm).await?.expect("row");
    assert_eq!(stored.scheduled_at, at(date, 8, 0));

    let empty = appointment_service::update_appointment(&state, &admin, id, AppointmentPatch::default()).await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    appointment_service::delete_appointment(&state, &admin, id).await?;
    let again = appointment_service::delete_appointment(&state, &admin, id).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));

    let missing = appointment_service::update_appointment(
        &state,
        &admin,
        Uuid::new_v4(),
        AppointmentPatch {
            notes: Some("x".into()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    Ok(())
}

// Custom hours replace the defaults for one date and can be removed again.
#[tokio::test]
async fn blocked_day_overrides_hours_and_rejects_duplicates() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url, RecordingMailer::new()).await?;
    let admin = create_admin(&state).await?;
    let date = day(2031, 4, 8);
    clear_blocked_day(&state, date).await?;
    let defaults = state.config.clinic.default_hours;

    let request = || NewBlockedDayRequest {
        date: "2031-04-08".into(),
        open_time: "10:00".into(),
        close_time: "12:00".into(),
    };
    blocked_day_service::add_blocked_day(&state, &admin, request()).await?;
    let duplicate = blocked_day_service::add_blocked_day(&state, &admin, request()).await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

    assert!(!can_schedule(&state.orm, defaults, at(date, 9, 0)).await?);
    assert!(can_schedule(&state.orm, defaults, at(date, 10, 0)).await?);
    assert!(can_schedule(&state.orm, defaults, at(date, 12, 0)).await?);
    assert!(!can_schedule(&state.orm, defaults, at(date, 12, 1)).await?);

    let slots = available_slots(&state.orm, defaults, date, 30).await?;
    assert_eq!(slots.len(), 4);

    let afternoon = appointment_service::create_appointment(
        &state,
        &admin,
        new_request(&unique_email("late"), "2031-04-08 15:00"),
    )
    .await;
    assert!(matches!(afternoon, Err(AppError::BadRequest(_))));

    let listed = blocked_day_service::list_blocked_days(&state).await?;
    assert!(listed.iter().any(|d| d.date == date));

    blocked_day_service::delete_blocked_day(&state, &admin, date).await?;
    let again = blocked_day_service::delete_blocked_day(&state, &admin, date).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));
    assert!(can_schedule(&state.orm, defaults, at(date, 9, 0)).await?);

    let inverted = blocked_day_service::add_blocked_day(
        &state,
        &admin,
        NewBlockedDayRequest {
            date: "2031-04-09".into(),
            open_time: "14:00".into(),
            close_time: "09:00".into(),
        },
    )
    .await;
    assert!(matches!(inverted, Err(AppError::BadRequest(_))));

    Ok(())
}

// A dead SMTP relay never undoes the booking or the status change.
#[tokio::test]
async fn email_failure_does_not_fail_the_mutation() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let mailer = RecordingMailer::failing();
    let state = setup_state(&url, mailer.clone()).await?;
    let admin = create_admin(&state).await?;
    clear_blocked_day(&state, day(2031, 5, 6)).await?;

    let created = appointment_service::create_appointment(
        &state,
        &admin,
        new_request(&unique_email("nomail"), "2031-05-06T11:30"),
    )
    .await?;
    let id = created.data.expect("created id").id;

    appointment_service::update_appointment(
        &state,
        &admin,
        id,
        AppointmentPatch {
            status: Some(AppointmentStatus::Rejected),
            ..Default::default()
        },
    )
    .await?;

    let stored = Appointments::find_by_id(id).one(&state.orm).await?.expect("row");
    assert_eq!(stored.status, "rejected");
    assert_eq!(mailer.sent().len(), 2);

    appointment_service::delete_appointment(&state, &admin, id).await?;
    Ok(())
}

// Register, log in, book as a client; the client sees only their own bookings.
#[tokio::test]
async fn client_registers_logs_in_and_books() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let mailer = RecordingMailer::new();
    let state = setup_state(&url, mailer.clone()).await?;
    clear_blocked_day(&state, day(2031, 6, 10)).await?;
    let email = unique_email("bo");

    let register = || RegisterRequest {
        name: "Bo Lind".into(),
        email: email.clone(),
        phone: "555 987 6543".into(),
        password: "secret1".into(),
        password_confirmation: "secret1".into(),
    };
    let user = auth_service::register_user(&state, register()).await?;
    assert_eq!(user.role, Role::Client);
    let duplicate = auth_service::register_user(&state, register()).await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

    let wrong = auth_service::login_user(
        &state,
        LoginRequest {
            email: email.clone(),
            password: "nope123".into(),
        },
    )
    .await;
    assert!(matches!(wrong, Err(AppError::BadRequest(_))));
    let logged_in = auth_service::login_user(
        &state,
        LoginRequest {
            email: email.to_uppercase(),
            password: "secret1".into(),
        },
    )
    .await?;
    assert_eq!(logged_in.id, user.id);

    let client = AuthUser {
        user_id: user.id,
        role: Role::Client,
        name: user.name.clone(),
    };
    let forbidden = appointment_service::create_appointment(
        &state,
        &client,
        new_request(&email, "2031-06-10T09:00"),
    )
    .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    let booked = appointment_service::book_for_client(
        &state,
        &client,
        BookingRequest {
            patient_name: "Bo Lind".into(),
            patient_email: email.clone(),
            patient_phone: "555-987-6543".into(),
            patient_weight: Some(80.0),
            date: "2031-06-10 09:00".into(),
            notes: "cough".into(),
        },
    )
    .await?;
    assert_eq!(booked.status, AppointmentStatus::Pending);
    assert_eq!(booked.created_by, Role::Client);

    // Patient confirmation plus the clinic's new-request notice.
    let sent = mailer.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().any(|m| m.to == email));
    assert!(sent.iter().any(|m| m.subject == "New appointment request"));

    let mine = appointment_service::list_for_user(&state, user.id).await?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].patient_phone, "555-987-6543");

    let count = Appointments::find()
        .filter(AppCol::Id.eq(booked.id))
        .count(&state.orm)
        .await?;
    assert_eq!(count, 1);
    Ok(())
}

// A patient row the database refuses takes its freshly inserted user down with it.
#[tokio::test]
async fn failed_patient_insert_leaves_no_user_behind() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url, RecordingMailer::new()).await?;
    let email = unique_email("orphan");

    let txn = state.orm.begin().await?;
    let created = create_client_with_patient(
        &txn,
        NewClient {
            name: "Cy Orphan",
            email: &email,
            phone: "555-111-2222",
            // Violates the patients weight range check after the user row is written.
            weight: Some(0.0),
            password_hash: "dummy".into(),
        },
    )
    .await;
    assert!(matches!(created, Err(AppError::Orm(_))));
    txn.rollback().await?;

    let users = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .count(&state.orm)
        .await?;
    assert_eq!(users, 0);
    Ok(())
}

// Two admins adding the same date at once: one wins, the other gets the usual rejection.
#[tokio::test]
async fn concurrent_duplicate_writes_are_rejected_as_bad_request() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url, RecordingMailer::new()).await?;
    let admin = create_admin(&state).await?;
    let date = day(2031, 7, 15);
    clear_blocked_day(&state, date).await?;

    let request = || NewBlockedDayRequest {
        date: "2031-07-15".into(),
        open_time: "09:00".into(),
        close_time: "11:00".into(),
    };
    let (a, b) = tokio::join!(
        blocked_day_service::add_blocked_day(&state, &admin, request()),
        blocked_day_service::add_blocked_day(&state, &admin, request()),
    );
    let results = [a.map(|_| ()), b.map(|_| ())];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(AppError::BadRequest(_)))));
    clear_blocked_day(&state, date).await?;

    let email = unique_email("race");
    let register = || RegisterRequest {
        name: "Di Race".into(),
        email: email.clone(),
        phone: "555-333-4444".into(),
        password: "secret1".into(),
        password_confirmation: "secret1".into(),
    };
    let (a, b) = tokio::join!(
        auth_service::register_user(&state, register()),
        auth_service::register_user(&state, register()),
    );
    let results = [a.map(|_| ()), b.map(|_| ())];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(AppError::BadRequest(_)))));
    Ok(())
}
