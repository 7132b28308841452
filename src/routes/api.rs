use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    dto::{
        appointments::{AppointmentPatch, NewAppointmentRequest, SlotList},
        blocked_days::NewBlockedDayRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::{appointment_service, blocked_day_service, schedule_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/appointments", get(query_action).post(command_action))
}

/// Query string of `GET /api/appointments`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActionQuery {
    /// getAll, getById, getBlockedDays, getAvailableSlots or getStats
    pub action: Option<String>,
    pub id: Option<Uuid>,
    #[param(value_type = Option<String>, example = "2025-01-20")]
    pub date: Option<NaiveDate>,
    /// Slot length in minutes.
    pub duration: Option<u32>,
}

/// Body of `POST /api/appointments`, selected by its `action` field.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ApiCommand {
    GetAll,
    GetById {
        id: Uuid,
    },
    Add {
        appointment: NewAppointmentRequest,
    },
    Update {
        id: Uuid,
        appointment: AppointmentPatch,
    },
    Delete {
        id: Uuid,
    },
    GetBlockedDays,
    AddBlockedDay {
        #[serde(rename = "blockedDay")]
        blocked_day: NewBlockedDayRequest,
    },
    DeleteBlockedDay {
        #[schema(value_type = String, example = "2025-01-21")]
        date: NaiveDate,
    },
    GetAvailableSlots {
        #[schema(value_type = String, example = "2025-01-20")]
        date: NaiveDate,
        duration: Option<u32>,
    },
    GetStats,
}

const MUTATING_ACTIONS: [&str; 5] = ["add", "update", "delete", "addBlockedDay", "deleteBlockedDay"];

impl ActionQuery {
    fn into_command(self) -> AppResult<ApiCommand> {
        let action = self.action.unwrap_or_default();
        let command = match action.as_str() {
            "getAll" => ApiCommand::GetAll,
            "getById" => ApiCommand::GetById {
                id: self.id.ok_or_else(|| missing("id"))?,
            },
            "getBlockedDays" => ApiCommand::GetBlockedDays,
            "getAvailableSlots" => ApiCommand::GetAvailableSlots {
                date: self.date.ok_or_else(|| missing("date"))?,
                duration: self.duration,
            },
            "getStats" => ApiCommand::GetStats,
            "" => return Err(AppError::BadRequest("Missing action".into())),
            other if MUTATING_ACTIONS.contains(&other) => {
                return Err(AppError::BadRequest(format!("Action {other} requires POST")));
            }
            other => return Err(AppError::BadRequest(format!("Invalid action: {other}"))),
        };
        Ok(command)
    }
}

fn missing(field: &str) -> AppError {
    AppError::BadRequest(format!("Missing parameter: {field}"))
}

fn json<T: Serialize>(resp: ApiResponse<T>) -> Response {
    Json(resp).into_response()
}

#[utoipa::path(
    get,
    path = "/api/appointments",
    params(ActionQuery),
    responses(
        (status = 200, description = "Result of a read action, payload under appointments, appointment, blockedDays, slots or stats"),
        (status = 400, description = "Unknown action, missing parameter, or a mutating action sent over GET"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Appointments"
)]
pub async fn query_action(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<ActionQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    dispatch(&state, &user, query.into_command()?).await
}

#[utoipa::path(
    post,
    path = "/api/appointments",
    request_body = ApiCommand,
    responses(
        (status = 200, description = "Action result in the standard envelope"),
        (status = 400, description = "Validation failed, unschedulable date or duplicate blocked day"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Appointments"
)]
pub async fn command_action(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<ApiCommand>, JsonRejection>,
) -> AppResult<Response> {
    let Json(command) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    dispatch(&state, &user, command).await
}

async fn dispatch(state: &AppState, user: &AuthUser, command: ApiCommand) -> AppResult<Response> {
    tracing::debug!(user_id = %user.user_id, ?command, "appointments action");
    let resp = match command {
        ApiCommand::GetAll => json(appointment_service::list_appointments(state, user).await?),
        ApiCommand::GetById { id } => {
            json(appointment_service::get_appointment(state, user, id).await?)
        }
        ApiCommand::Add { appointment } => {
            json(appointment_service::create_appointment(state, user, appointment).await?)
        }
        ApiCommand::Update { id, appointment } => {
            json(appointment_service::update_appointment(state, user, id, appointment).await?)
        }
        ApiCommand::Delete { id } => {
            json(appointment_service::delete_appointment(state, user, id).await?)
        }
        ApiCommand::GetBlockedDays => json(blocked_day_service::get_blocked_days(state, user).await?),
        ApiCommand::AddBlockedDay { blocked_day } => {
            json(blocked_day_service::add_blocked_day(state, user, blocked_day).await?)
        }
        ApiCommand::DeleteBlockedDay { date } => {
            json(blocked_day_service::delete_blocked_day(state, user, date).await?)
        }
        ApiCommand::GetAvailableSlots { date, duration } => {
            let minutes = duration.unwrap_or(state.config.clinic.slot_minutes);
            let slots = schedule_service::available_slots(
                &state.orm,
                state.config.clinic.default_hours,
                date,
                minutes,
            )
            .await?;
            json(ApiResponse::data(SlotList {
                date,
                slots: slots.iter().map(|t| t.format("%H:%M").to_string()).collect(),
            }))
        }
        ApiCommand::GetStats => {
            let today = Local::now().date_naive();
            json(appointment_service::appointment_stats(state, user, today).await?)
        }
    };
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutating_actions_are_refused_over_get() {
        for action in MUTATING_ACTIONS {
            let query = ActionQuery {
                action: Some(action.to_string()),
                ..Default::default()
            };
            let err = query.into_command().unwrap_err();
            assert!(err.to_string().contains("requires POST"), "{action}");
        }
    }

    #[test]
    fn get_by_id_needs_an_id() {
        let query = ActionQuery {
            action: Some("getById".into()),
            ..Default::default()
        };
        assert_eq!(query.into_command().unwrap_err().to_string(), "Missing parameter: id");
    }

    #[test]
    fn post_body_selects_command_by_action() {
        let cmd: ApiCommand = serde_json::from_value(serde_json::json!({
            "action": "addBlockedDay",
            "blockedDay": { "date": "2025-01-21", "openTime": "10:00", "closeTime": "12:00" }
        }))
        .unwrap();
        match cmd {
            ApiCommand::AddBlockedDay { blocked_day } => {
                assert_eq!(blocked_day.date, "2025-01-21");
                assert_eq!(blocked_day.open_time, "10:00");
            }
            other => panic!("unexpected {other:?}"),
        }

        let cmd: ApiCommand = serde_json::from_value(serde_json::json!({
            "action": "update",
            "id": "6f1c2c8e-8f0e-4a53-9d1b-6f3a2b7c1d00",
            "appointment": { "status": "approved" }
        }))
        .unwrap();
        assert!(matches!(cmd, ApiCommand::Update { .. }));
    }

    #[test]
    fn unknown_post_action_fails_to_parse() {
        let parsed: Result<ApiCommand, _> =
            serde_json::from_value(serde_json::json!({ "action": "truncate" }));
        assert!(parsed.is_err());
    }
}
