use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{basic_validator, hash_password, new_id, AuthUser},
    db::now_timestamp,
    error::OpError,
    models::{AddOnRow, ServiceRow, ROLE_USER},
    state::AppState,
};

#[derive(Deserialize)]
struct SignupForm {
    email: String,
    username: String,
    password: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/services").route(web::get().to(list_services)))
        .service(web::resource("/add-ons").route(web::get().to(list_add_ons)))
        .service(web::resource("/signup").route(web::post().to(signup)))
        .service(
            web::resource("/session")
                .wrap(HttpAuthentication::basic(basic_validator))
                .route(web::get().to(session)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn list_services(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    let services = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, price, has_add_on_options FROM services ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(services))
}

async fn list_add_ons(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    let add_ons =
        sqlx::query_as::<_, AddOnRow>("SELECT id, name, price FROM add_ons ORDER BY name")
            .fetch_all(&state.db)
            .await?;

    Ok(HttpResponse::Ok().json(add_ons))
}

async fn signup(
    state: web::Data<AppState>,
    form: web::Json<SignupForm>,
) -> Result<HttpResponse, OpError> {
    let form = form.into_inner();
    if form.email.trim().is_empty() || !form.email.contains('@') {
        return Err(OpError::Validation("A valid email is required.".to_string()));
    }
    if form.username.trim().is_empty() {
        return Err(OpError::Validation("Username is required.".to_string()));
    }
    if form.password.len() < 6 {
        return Err(OpError::Validation(
            "Password must be at least 6 characters.".to_string(),
        ));
    }

    let password_hash = hash_password(&form.password)
        .map_err(|_| OpError::Validation("Password could not be processed.".to_string()))?;

    let id = new_id();
    let result = sqlx::query(
        r#"INSERT INTO profiles (id, email, username, role, password_hash, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(form.email.trim())
    .bind(form.username.trim())
    .bind(ROLE_USER)
    .bind(password_hash)
    .bind(now_timestamp())
    .execute(&state.db)
    .await;

    match result {
        Ok(_) => Ok(HttpResponse::Created().json(json!({ "id": id }))),
        Err(err) => {
            let duplicate = err
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false);
            if duplicate {
                Err(OpError::Conflict(
                    "An account with that email already exists.".to_string(),
                ))
            } else {
                Err(OpError::Db(err))
            }
        }
    }
}

async fn session(auth: web::ReqData<AuthUser>) -> HttpResponse {
    HttpResponse::Ok().json(auth.into_inner())
}
