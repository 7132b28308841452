use clinic_appointments::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    let pool = orm.get_postgres_connection_pool();

    let admin_email = config.clinic.admin_email.clone();
    let admin_id = ensure_user(pool, "Clinic Admin", &admin_email, "admin123", "admin").await?;
    let client_id =
        ensure_user(pool, "Demo Patient", "patient@example.com", "patient123", "client").await?;
    ensure_patient(pool, client_id, "patient@example.com", "555-123-4567").await?;

    println!("Seed completed. Admin ID: {admin_id}, Client ID: {client_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, phone, role)
        VALUES ($1, $2, $3, $4, '', $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_patient(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    email: &str,
    phone: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO patients (id, user_id, phone, email)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(phone)
    .bind(email)
    .execute(pool)
    .await?;

    println!("Ensured patient row for {email}");
    Ok(())
}
