use std::env;

use anyhow::{Context, anyhow};
use chrono::NaiveTime;

use crate::{
    services::schedule_service::{MAX_SLOT_MINUTES, MIN_SLOT_MINUTES, OpeningHours},
    validation::parse_clock_time,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
    pub clinic: ClinicConfig,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_hours: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone)]
pub struct ClinicConfig {
    pub default_hours: OpeningHours,
    pub slot_minutes: u32,
    pub admin_email: String,
    pub doctor: DoctorInfo,
}

#[derive(Debug, Clone)]
pub struct DoctorInfo {
    pub name: String,
    pub specialty: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    pub from_name: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let session = SessionConfig {
            secret: env::var("SESSION_SECRET").context("SESSION_SECRET is not set")?,
            ttl_hours: parsed_or("SESSION_TTL_HOURS", 24),
            cookie_secure: parsed_or("COOKIE_SECURE", false),
        };

        let open = time_var("DEFAULT_OPEN_TIME", "08:00")?;
        let close = time_var("DEFAULT_CLOSE_TIME", "17:00")?;
        let default_hours = OpeningHours::new(open, close)
            .ok_or_else(|| anyhow!("DEFAULT_OPEN_TIME must not be after DEFAULT_CLOSE_TIME"))?;

        let slot_minutes = slot_minutes(env::var("SLOT_MINUTES").ok().as_deref())?;

        let clinic = ClinicConfig {
            default_hours,
            slot_minutes,
            admin_email: var_or("ADMIN_EMAIL", "admin@clinic.local"),
            doctor: DoctorInfo {
                name: var_or("DOCTOR_NAME", "Clinic Physician"),
                specialty: var_or("DOCTOR_SPECIALTY", "General practice"),
                address: var_or("DOCTOR_ADDRESS", "Main street 1"),
                phone: var_or("DOCTOR_PHONE", "555-000-0000"),
            },
        };

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(SmtpConfig {
                host,
                port: parsed_or("SMTP_PORT", 587),
                username: env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty()),
                password: env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty()),
                from_email: var_or("SMTP_FROM_EMAIL", "noreply@clinic.local"),
                from_name: var_or("SMTP_FROM_NAME", "Clinic"),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            host,
            port,
            session,
            clinic,
            smtp,
        })
    }
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            default_hours: OpeningHours::default(),
            slot_minutes: 30,
            admin_email: "admin@clinic.local".to_string(),
            doctor: DoctorInfo {
                name: "Clinic Physician".to_string(),
                specialty: "General practice".to_string(),
                address: "Main street 1".to_string(),
                phone: "555-000-0000".to_string(),
            },
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn slot_minutes(raw: Option<&str>) -> anyhow::Result<u32> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(30);
    };
    let minutes: u32 = raw
        .parse()
        .with_context(|| format!("SLOT_MINUTES is not a number: {raw}"))?;
    if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&minutes) {
        return Err(anyhow!(
            "SLOT_MINUTES must be between {MIN_SLOT_MINUTES} and {MAX_SLOT_MINUTES}, got {minutes}"
        ));
    }
    Ok(minutes)
}

fn time_var(key: &str, default: &str) -> anyhow::Result<NaiveTime> {
    let raw = var_or(key, default);
    parse_clock_time(&raw).ok_or_else(|| anyhow!("{key} is not a valid HH:MM time: {raw}"))
}
