use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::{
    entity::blocked_days::{Column, Entity as BlockedDays, Model as BlockedDayModel},
    error::{AppError, AppResult},
};

pub const MIN_SLOT_MINUTES: u32 = 5;
pub const MAX_SLOT_MINUTES: u32 = 240;

/// Inclusive `[open, close]` window of bookable clock times for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl OpeningHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Option<Self> {
        (open <= close).then_some(Self { open, close })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.open <= time && time <= self.close
    }

    /// Slot start times beginning at `open`; a slot is kept only if it ends by `close`.
    pub fn slots(&self, minutes: u32) -> Vec<NaiveTime> {
        let Some(step) = minutes.checked_mul(60).filter(|s| *s > 0) else {
            return Vec::new();
        };
        let close = self.close.num_seconds_from_midnight();
        let mut start = self.open.num_seconds_from_midnight();
        let mut slots = Vec::new();
        while let Some(end) = start.checked_add(step).filter(|end| *end <= close) {
            if let Some(slot) = NaiveTime::from_num_seconds_from_midnight_opt(start, 0) {
                slots.push(slot);
            }
            start = end;
        }
        slots
    }
}

impl Default for OpeningHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Hours in force on a day: the override row when present, otherwise the defaults.
/// An override narrows or widens the day; it never closes it.
pub fn effective_hours(blocked: Option<&BlockedDayModel>, defaults: OpeningHours) -> OpeningHours {
    match blocked {
        Some(day) => OpeningHours {
            open: day.open_time,
            close: day.close_time,
        },
        None => defaults,
    }
}

pub fn is_bookable(at: NaiveDateTime, blocked: Option<&BlockedDayModel>, defaults: OpeningHours) -> bool {
    effective_hours(blocked, defaults).contains(at.time())
}

pub async fn find_blocked_day<C: ConnectionTrait>(
    db: &C,
    date: NaiveDate,
) -> AppResult<Option<BlockedDayModel>> {
    let row = BlockedDays::find()
        .filter(Column::Day.eq(date))
        .one(db)
        .await?;
    Ok(row)
}

pub async fn hours_on<C: ConnectionTrait>(
    db: &C,
    defaults: OpeningHours,
    date: NaiveDate,
) -> AppResult<OpeningHours> {
    let blocked = find_blocked_day(db, date).await?;
    Ok(effective_hours(blocked.as_ref(), defaults))
}

pub async fn can_schedule<C: ConnectionTrait>(
    db: &C,
    defaults: OpeningHours,
    at: NaiveDateTime,
) -> AppResult<bool> {
    let blocked = find_blocked_day(db, at.date()).await?;
    Ok(is_bookable(at, blocked.as_ref(), defaults))
}

pub async fn ensure_schedulable<C: ConnectionTrait>(
    db: &C,
    defaults: OpeningHours,
    at: NaiveDateTime,
) -> AppResult<()> {
    if can_schedule(db, defaults, at).await? {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "Cannot book at that time: outside opening hours for that day".into(),
        ))
    }
}

pub async fn available_slots<C: ConnectionTrait>(
    db: &C,
    defaults: OpeningHours,
    date: NaiveDate,
    minutes: u32,
) -> AppResult<Vec<NaiveTime>> {
    if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&minutes) {
        return Err(AppError::BadRequest(format!(
            "duration must be between {MIN_SLOT_MINUTES} and {MAX_SLOT_MINUTES} minutes"
        )));
    }
    Ok(hours_on(db, defaults, date).await?.slots(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(date: &str, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap().and_time(t(h, m))
    }

    fn blocked(date: &str, open: NaiveTime, close: NaiveTime) -> BlockedDayModel {
        BlockedDayModel {
            id: Uuid::new_v4(),
            day: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open_time: open,
            close_time: close,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn default_hours_bounds_are_inclusive() {
        let defaults = OpeningHours::default();
        assert!(!is_bookable(at("2025-01-20", 7, 59), None, defaults));
        assert!(is_bookable(at("2025-01-20", 8, 0), None, defaults));
        assert!(is_bookable(at("2025-01-20", 17, 0), None, defaults));
        assert!(!is_bookable(at("2025-01-20", 17, 1), None, defaults));
    }

    #[test]
    fn seconds_past_close_are_rejected() {
        let defaults = OpeningHours::default();
        let late = at("2025-01-20", 17, 0) + chrono::Duration::seconds(30);
        assert!(!is_bookable(late, None, defaults));
    }

    #[test]
    fn override_replaces_default_hours_entirely() {
        let defaults = OpeningHours::default();
        let day = blocked("2025-01-21", t(10, 0), t(12, 0));
        assert!(!is_bookable(at("2025-01-21", 9, 0), Some(&day), defaults));
        assert!(is_bookable(at("2025-01-21", 10, 0), Some(&day), defaults));
        assert!(is_bookable(at("2025-01-21", 12, 0), Some(&day), defaults));
        assert!(!is_bookable(at("2025-01-21", 15, 0), Some(&day), defaults));

        let wider = blocked("2025-01-22", t(6, 0), t(20, 0));
        assert!(is_bookable(at("2025-01-22", 19, 30), Some(&wider), defaults));
    }

    #[test]
    fn slots_end_no_later_than_close() {
        let hours = OpeningHours::new(t(8, 0), t(10, 0)).unwrap();
        assert_eq!(hours.slots(30), vec![t(8, 0), t(8, 30), t(9, 0), t(9, 30)]);
        assert_eq!(hours.slots(45), vec![t(8, 0), t(8, 45)]);
        assert!(hours.slots(0).is_empty());
    }

    #[test]
    fn default_day_has_eighteen_half_hour_slots() {
        let slots = OpeningHours::default().slots(30);
        assert_eq!(slots.len(), 18);
        assert_eq!(slots.first(), Some(&t(8, 0)));
        assert_eq!(slots.last(), Some(&t(16, 30)));
    }

    #[test]
    fn huge_slot_length_yields_nothing() {
        assert!(OpeningHours::default().slots(80_000_000).is_empty());
        assert!(OpeningHours::default().slots(u32::MAX).is_empty());
    }

    #[test]
    fn window_shorter_than_slot_has_no_slots() {
        let hours = OpeningHours::new(t(9, 0), t(9, 20)).unwrap();
        assert!(hours.slots(30).is_empty());
        assert!(OpeningHours::new(t(12, 0), t(11, 0)).is_none());
    }
}
