use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    entity::{
        patients::{ActiveModel as PatientActive, Column as PatientCol, Entity as Patients, Model as PatientModel},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::AppResult,
    models::{Patient, Role},
    services::auth_service::unusable_password_hash,
    state::AppState,
};

pub struct NewClient<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub weight: Option<f64>,
    pub password_hash: String,
}

/// Contact details to refresh on an existing patient. `None` keeps the stored value.
#[derive(Debug, Default, Clone)]
pub struct ContactUpdate<'a> {
    pub phone: Option<&'a str>,
    pub weight: Option<f64>,
    pub email: Option<&'a str>,
}

/// Inserts a client account and its patient row. Run it inside a transaction so a
/// failed patient insert leaves no orphaned user.
pub async fn create_client_with_patient<C: ConnectionTrait>(
    db: &C,
    client: NewClient<'_>,
) -> AppResult<(UserModel, PatientModel)> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(client.name.to_string()),
        email: Set(client.email.to_string()),
        password_hash: Set(client.password_hash),
        phone: Set(client.phone.to_string()),
        role: Set(Role::Client.as_str().to_string()),
        created_at: NotSet,
    }
    .insert(db)
    .await?;

    let patient = insert_patient(db, user.id, client.email, client.phone, client.weight).await?;
    Ok((user, patient))
}

async fn insert_patient<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    email: &str,
    phone: &str,
    weight: Option<f64>,
) -> AppResult<PatientModel> {
    let patient = PatientActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        phone: Set(phone.to_string()),
        weight: Set(weight),
        email: Set(email.to_string()),
        created_at: NotSet,
    }
    .insert(db)
    .await?;
    Ok(patient)
}

async fn refresh_contact<C: ConnectionTrait>(
    db: &C,
    patient: PatientModel,
    contact: &ContactUpdate<'_>,
) -> AppResult<PatientModel> {
    let phone = contact.phone.filter(|p| *p != patient.phone);
    let email = contact.email.filter(|e| *e != patient.email);
    let weight = contact.weight.filter(|w| Some(*w) != patient.weight);
    if phone.is_none() && email.is_none() && weight.is_none() {
        return Ok(patient);
    }

    let mut active: PatientActive = patient.into();
    if let Some(phone) = phone {
        active.phone = Set(phone.to_string());
    }
    if let Some(email) = email {
        active.email = Set(email.to_string());
    }
    if let Some(weight) = weight {
        active.weight = Set(Some(weight));
    }
    Ok(active.update(db).await?)
}

/// Finds the patient whose account has `email`, creating account and patient when absent.
pub async fn upsert_patient_by_email(
    state: &AppState,
    name: &str,
    email: &str,
    contact: ContactUpdate<'_>,
) -> AppResult<PatientModel> {
    let user = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(&state.orm)
        .await?;

    if let Some(user) = user {
        let patient = Patients::find()
            .filter(PatientCol::UserId.eq(user.id))
            .one(&state.orm)
            .await?;
        return match patient {
            Some(patient) => refresh_contact(&state.orm, patient, &contact).await,
            None => {
                insert_patient(
                    &state.orm,
                    user.id,
                    email,
                    contact.phone.unwrap_or(&user.phone),
                    contact.weight,
                )
                .await
            }
        };
    }

    let password_hash = unusable_password_hash()?;
    let txn = state.orm.begin().await?;
    let (user, patient) = create_client_with_patient(
        &txn,
        NewClient {
            name,
            email,
            phone: contact.phone.unwrap_or_default(),
            weight: contact.weight,
            password_hash,
        },
    )
    .await?;
    txn.commit().await?;

    tracing::info!(user_id = %user.id, patient_id = %patient.id, "created patient account");
    Ok(patient)
}

/// Patient row of a logged-in client, created on first booking.
pub async fn upsert_patient_for_user(
    state: &AppState,
    user_id: Uuid,
    contact: ContactUpdate<'_>,
) -> AppResult<PatientModel> {
    let patient = Patients::find()
        .filter(PatientCol::UserId.eq(user_id))
        .one(&state.orm)
        .await?;
    match patient {
        Some(patient) => refresh_contact(&state.orm, patient, &contact).await,
        None => {
            insert_patient(
                &state.orm,
                user_id,
                contact.email.unwrap_or_default(),
                contact.phone.unwrap_or_default(),
                contact.weight,
            )
            .await
        }
    }
}

pub async fn find_patient_for_user(state: &AppState, user_id: Uuid) -> AppResult<Option<Patient>> {
    let patient = Patients::find()
        .filter(PatientCol::UserId.eq(user_id))
        .one(&state.orm)
        .await?;
    Ok(patient.map(patient_from_entity))
}

/// Name and contact email used for notifications.
pub async fn find_contact<C: ConnectionTrait>(
    db: &C,
    patient_id: Uuid,
) -> AppResult<Option<(String, String)>> {
    let found = Patients::find_by_id(patient_id)
        .find_also_related(Users)
        .one(db)
        .await?;
    Ok(found.and_then(|(patient, user)| user.map(|u| (u.name, patient.email))))
}

pub fn patient_from_entity(model: PatientModel) -> Patient {
    Patient {
        id: model.id,
        user_id: model.user_id,
        phone: model.phone,
        weight: model.weight,
        email: model.email,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
