use std::{env, fs, path::Path};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::ROLE_CLERK,
};

/// All stored timestamps use this format. Whole-second RFC3339 in UTC keeps
/// SQL string comparison chronological and slot timestamps exact-matchable.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_clerk(pool).await?;
    seed_catalog(pool).await?;
    Ok(())
}

async fn seed_clerk(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>(
        "SELECT id FROM profiles WHERE role = ? LIMIT 1",
    )
    .bind(ROLE_CLERK)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Ok(());
    }

    let email = env::var("CLERK_EMAIL").unwrap_or_else(|_| "clerk@salondesk.local".to_string());
    let username = env::var("CLERK_USER").unwrap_or_else(|_| "clerk".to_string());
    let password = env::var("CLERK_PASSWORD").unwrap_or_else(|_| "clerk".to_string());

    if password == "clerk" {
        log::warn!("CLERK_PASSWORD not set. Using default password 'clerk'. Set CLERK_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO profiles (id, email, username, role, password_hash, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(email)
    .bind(username)
    .bind(ROLE_CLERK)
    .bind(password_hash)
    .bind(now_timestamp())
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_catalog(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let services: &[(&str, i64, i64)] = &[
        ("Classic Cut & Style", 200, 1),
        ("Colour Treatment", 450, 1),
        ("Blow Wave", 150, 0),
        ("Manicure", 180, 1),
        ("Full Treatment Package", 650, 1),
    ];

    for (name, price, has_add_ons) in services {
        sqlx::query(
            "INSERT INTO services (id, name, price, has_add_on_options) VALUES (?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(name)
        .bind(price)
        .bind(has_add_ons)
        .execute(pool)
        .await?;
    }

    let add_ons: &[(&str, i64)] = &[
        ("Deep Conditioning", 50),
        ("Scalp Massage", 60),
        ("Gel Finish", 40),
        ("Hair Mask", 80),
    ];

    for (name, price) in add_ons {
        sqlx::query("INSERT INTO add_ons (id, name, price) VALUES (?, ?, ?)")
            .bind(new_id())
            .bind(name)
            .bind(price)
            .execute(pool)
            .await?;
    }

    Ok(())
}
