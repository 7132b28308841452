use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{AppointmentStatus, AppointmentView},
    validation::require_datetime,
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointmentRequest {
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub patient_email: String,
    pub patient_phone: Option<String>,
    pub patient_weight: Option<f64>,
    /// `YYYY-MM-DDTHH:MM[:SS]` or `YYYY-MM-DD HH:MM[:SS]`.
    #[serde(default)]
    #[schema(example = "2025-01-20T09:30")]
    pub date: String,
    pub notes: Option<String>,
}

/// Fields an administrator may change on an existing appointment.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AppointmentPatch {
    #[schema(example = "2025-01-20T10:00")]
    pub date: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Default, PartialEq)]
pub struct ValidatedPatch {
    pub date: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentPatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.notes.is_none() && self.status.is_none()
    }

    pub fn validate(self) -> AppResult<ValidatedPatch> {
        if self.is_empty() {
            return Err(AppError::BadRequest("No fields to update".into()));
        }
        let date = self.date.as_deref().map(require_datetime).transpose()?;
        Ok(ValidatedPatch {
            date,
            notes: self.notes.map(|n| n.trim().to_string()),
            status: self.status,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppointmentList {
    pub appointments: Vec<AppointmentView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppointmentEnvelope {
    pub appointment: AppointmentView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedAppointment {
    pub id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AppointmentStats {
    pub today: u64,
    pub week: u64,
    pub month: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsEnvelope {
    pub stats: AppointmentStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlotList {
    pub date: NaiveDate,
    /// `HH:MM` start times.
    pub slots: Vec<String>,
}
