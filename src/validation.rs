use std::sync::LazyLock;

use chrono::{NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::error::{AppError, AppResult};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

// 555-123-4567, 555.123.4567, 555 123 4567 or 5551234567
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{3}[-.\s]?\d{3}[-.\s]?\d{4}|\d{10})$").expect("phone pattern compiles")
});

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn parse_appointment_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone.trim())
}

pub fn is_valid_weight(weight: f64) -> bool {
    (1.0..=300.0).contains(&weight)
}

pub fn require_datetime(raw: &str) -> AppResult<NaiveDateTime> {
    parse_appointment_datetime(raw)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid appointment date: {raw}")))
}

pub fn require_email(email: &str) -> AppResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid email format".into()))
    }
}

/// Empty phone numbers are allowed; anything else must match the phone pattern.
pub fn optional_phone(phone: Option<&str>) -> AppResult<()> {
    match phone.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) if !is_valid_phone(p) => Err(AppError::BadRequest("Invalid phone format".into())),
        _ => Ok(()),
    }
}

pub fn optional_weight(weight: Option<f64>) -> AppResult<()> {
    match weight {
        Some(w) if !is_valid_weight(w) => Err(AppError::BadRequest(
            "Weight must be between 1 and 300 kg".into(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_form_and_api_datetimes() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 20)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(parse_appointment_datetime("2025-01-20T08:00"), Some(expected));
        assert_eq!(parse_appointment_datetime("2025-01-20 08:00:00"), Some(expected));
        assert_eq!(parse_appointment_datetime(" 2025-01-20 08:00 "), Some(expected));
        assert_eq!(parse_appointment_datetime("20/01/2025 08:00"), None);
        assert_eq!(parse_appointment_datetime("2025-01-20"), None);
    }

    #[test]
    fn parses_clock_times_with_and_without_seconds() {
        assert_eq!(parse_clock_time("08:00"), NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(parse_clock_time("17:00:30"), NaiveTime::from_hms_opt(17, 0, 30));
        assert_eq!(parse_clock_time("25:00"), None);
    }

    #[test]
    fn phone_patterns() {
        assert!(is_valid_phone("555-123-4567"));
        assert!(is_valid_phone("555 123 4567"));
        assert!(is_valid_phone("5551234567"));
        assert!(!is_valid_phone("12345"));
        assert!(optional_phone(None).is_ok());
        assert!(optional_phone(Some("")).is_ok());
        assert!(optional_phone(Some("abc")).is_err());
    }

    #[test]
    fn email_and_weight_bounds() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana@"));
        assert!(!is_valid_email("not an email"));
        assert!(is_valid_weight(1.0));
        assert!(is_valid_weight(300.0));
        assert!(!is_valid_weight(0.5));
        assert!(optional_weight(Some(301.0)).is_err());
    }
}
