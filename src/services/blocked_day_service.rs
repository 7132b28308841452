use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::blocked_days::{BlockedDayList, NewBlockedDayRequest},
    entity::blocked_days::{ActiveModel, Column, Entity as BlockedDays, Model as BlockedDayModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::BlockedDay,
    response::ApiResponse,
    services::schedule_service::{OpeningHours, find_blocked_day},
    state::AppState,
    validation::parse_clock_time,
};

pub async fn list_blocked_days(state: &AppState) -> AppResult<Vec<BlockedDay>> {
    let rows = BlockedDays::find()
        .order_by_asc(Column::Day)
        .all(&state.orm)
        .await?;
    Ok(rows.into_iter().map(blocked_day_from_entity).collect())
}

pub async fn get_blocked_days(
    state: &AppState,
    _user: &AuthUser,
) -> AppResult<ApiResponse<BlockedDayList>> {
    let blocked_days = list_blocked_days(state).await?;
    Ok(ApiResponse::data(BlockedDayList { blocked_days }))
}

pub async fn add_blocked_day(
    state: &AppState,
    user: &AuthUser,
    payload: NewBlockedDayRequest,
) -> AppResult<ApiResponse<BlockedDay>> {
    ensure_admin(user)?;

    let (date, open, close) = (
        payload.date.trim(),
        payload.open_time.trim(),
        payload.close_time.trim(),
    );
    if date.is_empty() || open.is_empty() || close.is_empty() {
        return Err(AppError::BadRequest(
            "Date, opening time and closing time are required".into(),
        ));
    }

    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date: {date}")))?;
    let open = parse_clock_time(open)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid opening time: {open}")))?;
    let close = parse_clock_time(close)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid closing time: {close}")))?;
    let hours = OpeningHours::new(open, close).ok_or_else(|| {
        AppError::BadRequest("Opening time must not be after closing time".into())
    })?;

    const DUPLICATE: &str = "That day already has custom hours";
    if find_blocked_day(&state.orm, day).await?.is_some() {
        return Err(AppError::BadRequest(DUPLICATE.into()));
    }

    let row = ActiveModel {
        id: Set(Uuid::new_v4()),
        day: Set(day),
        open_time: Set(hours.open),
        close_time: Set(hours.close),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::from(e).or_duplicate(DUPLICATE))?;

    audit::record(
        state,
        Some(user.user_id),
        "blocked_day_add",
        "blocked_days",
        serde_json::json!({ "date": day, "open": hours.open, "close": hours.close }),
    )
    .await;

    Ok(ApiResponse::success(
        "Custom hours saved",
        blocked_day_from_entity(row),
    ))
}

pub async fn delete_blocked_day(
    state: &AppState,
    user: &AuthUser,
    day: NaiveDate,
) -> AppResult<ApiResponse<()>> {
    ensure_admin(user)?;
    let result = BlockedDays::delete_many()
        .filter(Column::Day.eq(day))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("Blocked day"));
    }

    audit::record(
        state,
        Some(user.user_id),
        "blocked_day_delete",
        "blocked_days",
        serde_json::json!({ "date": day }),
    )
    .await;

    Ok(ApiResponse::message("Custom hours removed"))
}

pub fn blocked_day_from_entity(model: BlockedDayModel) -> BlockedDay {
    BlockedDay {
        id: model.id,
        date: model.day,
        open_time: model.open_time,
        close_time: model.close_time,
    }
}
