use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        appointments::{
            AppointmentEnvelope, AppointmentList, AppointmentPatch, AppointmentStats,
            CreatedAppointment, NewAppointmentRequest, SlotList, StatsEnvelope,
        },
        auth::{LoginRequest, LoginResponse, RegisterRequest, UserEnvelope},
        blocked_days::{BlockedDayList, NewBlockedDayRequest},
    },
    middleware::auth::SESSION_COOKIE,
    models::{Appointment, AppointmentStatus, AppointmentView, BlockedDay, Patient, Role, User},
    routes::{api, auth, health},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        api::query_action,
        api::command_action
    ),
    components(
        schemas(
            Role,
            User,
            Patient,
            Appointment,
            AppointmentStatus,
            AppointmentView,
            BlockedDay,
            api::ApiCommand,
            NewAppointmentRequest,
            AppointmentPatch,
            NewBlockedDayRequest,
            AppointmentList,
            AppointmentEnvelope,
            CreatedAppointment,
            AppointmentStats,
            StatsEnvelope,
            SlotList,
            BlockedDayList,
            LoginRequest,
            LoginResponse,
            RegisterRequest,
            UserEnvelope,
            health::HealthData
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Account endpoints"),
        (name = "Appointments", description = "Action endpoint for appointments and custom opening hours"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
