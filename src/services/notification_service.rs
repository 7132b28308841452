use askama::Template;
use chrono::NaiveDateTime;

use crate::{
    config::DoctorInfo,
    error::{AppError, AppResult},
    mailer::OutgoingEmail,
    models::AppointmentStatus,
    state::AppState,
};

pub const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M";

/// What a patient-facing appointment email is about.
#[derive(Debug, Clone)]
pub struct AppointmentEmailData {
    pub patient_name: String,
    pub date: NaiveDateTime,
    pub notes: String,
    pub status: AppointmentStatus,
}

#[derive(Template)]
#[template(path = "email/appointment_status.html")]
pub struct AppointmentStatusEmail {
    pub subject: &'static str,
    pub patient_name: String,
    pub date: String,
    pub notes: String,
    pub status_label: &'static str,
    pub status_message: &'static str,
    pub approved: bool,
    pub doctor_name: String,
    pub doctor_address: String,
    pub doctor_phone: String,
}

impl AppointmentStatusEmail {
    pub fn new(data: &AppointmentEmailData, doctor: &DoctorInfo) -> Self {
        let (subject, status_message) = match data.status {
            AppointmentStatus::Pending => (
                "Appointment request received",
                "Your appointment is waiting for approval. You will be notified once the doctor reviews it.",
            ),
            AppointmentStatus::Approved => (
                "Appointment confirmed",
                "Your appointment has been approved.",
            ),
            AppointmentStatus::Rejected => (
                "Appointment request not approved",
                "Your appointment was not approved. Please contact the clinic or request another date.",
            ),
        };
        Self {
            subject,
            patient_name: data.patient_name.clone(),
            date: data.date.format(DISPLAY_FORMAT).to_string(),
            notes: data.notes.clone(),
            status_label: data.status.label(),
            status_message,
            approved: data.status == AppointmentStatus::Approved,
            doctor_name: doctor.name.clone(),
            doctor_address: doctor.address.clone(),
            doctor_phone: doctor.phone.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "email/admin_new_request.html")]
pub struct NewRequestEmail {
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub date: String,
    pub notes: String,
}

pub fn render_status_email(
    to: &str,
    data: &AppointmentEmailData,
    doctor: &DoctorInfo,
) -> AppResult<OutgoingEmail> {
    let template = AppointmentStatusEmail::new(data, doctor);
    Ok(OutgoingEmail {
        to: to.to_string(),
        subject: template.subject.to_string(),
        html: template
            .render()
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?,
    })
}

pub fn render_new_request_email(
    to: &str,
    data: &AppointmentEmailData,
    patient_email: &str,
    patient_phone: &str,
) -> AppResult<OutgoingEmail> {
    let template = NewRequestEmail {
        patient_name: data.patient_name.clone(),
        patient_email: patient_email.to_string(),
        patient_phone: patient_phone.to_string(),
        date: data.date.format(DISPLAY_FORMAT).to_string(),
        notes: data.notes.clone(),
    };
    Ok(OutgoingEmail {
        to: to.to_string(),
        subject: "New appointment request".to_string(),
        html: template
            .render()
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?,
    })
}

/// Best effort: a failed delivery is logged and never fails the caller.
pub async fn deliver(state: &AppState, email: AppResult<OutgoingEmail>) -> bool {
    let email = match email {
        Ok(email) => email,
        Err(err) => {
            tracing::warn!(error = %err, "email rendering failed");
            return false;
        }
    };
    let to = email.to.clone();
    match state.mailer.send(email).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, to = %to, "email delivery failed");
            false
        }
    }
}

pub async fn notify_patient(state: &AppState, to: &str, data: &AppointmentEmailData) -> bool {
    let email = render_status_email(to, data, &state.config.clinic.doctor);
    deliver(state, email).await
}

pub async fn notify_admin_new_request(
    state: &AppState,
    data: &AppointmentEmailData,
    patient_email: &str,
    patient_phone: &str,
) -> bool {
    let email = render_new_request_email(
        &state.config.clinic.admin_email,
        data,
        patient_email,
        patient_phone,
    );
    deliver(state, email).await
}
