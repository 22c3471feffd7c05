use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::clerk_validator,
    booking,
    db::timestamp,
    error::OpError,
    models::{PAYMENT_DEPOSIT, SLOT_AVAILABLE},
    pricing,
    schedule,
    state::AppState,
};

#[derive(Clone, Debug, Serialize)]
struct StatCard {
    label: String,
    value: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PendingRow {
    id: String,
    payment_method: String,
    username: String,
    service_name: String,
    service_price: i64,
    slot_datetime: Option<String>,
}

#[derive(Serialize)]
struct PendingView {
    id: String,
    username: String,
    description: String,
    total_price: i64,
    payment_method: String,
    slot_datetime: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReceiptDetailRow {
    id: String,
    appointment_id: String,
    total_price: i64,
    remaining_due: i64,
    is_paid: i64,
    created_at: String,
    updated_at: String,
    username: String,
    service_name: String,
}

#[derive(Serialize)]
struct ReceiptView {
    id: String,
    appointment_id: String,
    username: String,
    description: String,
    total_price: i64,
    remaining_due: i64,
    is_paid: bool,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
struct RoutineRow {
    id: String,
    username: String,
    slot_datetime: Option<String>,
}

#[derive(Deserialize)]
struct SlotInsertForm {
    datetime: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/clerk")
            .wrap(HttpAuthentication::basic(clerk_validator))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/appointments/pending").route(web::get().to(pending)))
            .service(web::resource("/appointments/{id}/confirm").route(web::post().to(confirm)))
            .service(web::resource("/appointments/{id}/complete").route(web::post().to(complete)))
            .service(web::resource("/routine").route(web::get().to(routine)))
            .service(web::resource("/receipts/deposited").route(web::get().to(deposited_receipts)))
            .service(web::resource("/receipts/paid").route(web::get().to(paid_receipts)))
            .service(web::resource("/receipts/{id}/paid").route(web::post().to(mark_paid)))
            .service(web::resource("/schedule/candidates").route(web::get().to(candidates)))
            .service(web::resource("/schedule/slots").route(web::post().to(insert_slot))),
    );
}

async fn dashboard(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    let pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE is_confirmed = 0")
            .fetch_one(&state.db)
            .await?;
    let scheduled: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments WHERE is_confirmed = 1 AND is_completed = 0",
    )
    .fetch_one(&state.db)
    .await?;
    let completed: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE is_completed = 1")
            .fetch_one(&state.db)
            .await?;
    let outstanding: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM receipts WHERE is_paid = 0")
        .fetch_one(&state.db)
        .await?;
    let open_slots: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM work_schedule WHERE state = ?")
            .bind(SLOT_AVAILABLE)
            .fetch_one(&state.db)
            .await?;

    let stats = vec![
        StatCard {
            label: "Pending approval".to_string(),
            value: pending,
        },
        StatCard {
            label: "Scheduled".to_string(),
            value: scheduled,
        },
        StatCard {
            label: "Completed".to_string(),
            value: completed,
        },
        StatCard {
            label: "Receipts outstanding".to_string(),
            value: outstanding,
        },
        StatCard {
            label: "Open slots".to_string(),
            value: open_slots,
        },
    ];

    Ok(HttpResponse::Ok().json(stats))
}

async fn pending(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    let rows = sqlx::query_as::<_, PendingRow>(
        r#"SELECT a.id, a.payment_method, p.username,
                  s.name AS service_name, s.price AS service_price,
                  w.datetime AS slot_datetime
           FROM appointments a
           JOIN cart_items c ON a.cart_item_id = c.id
           JOIN profiles p ON c.user_id = p.id
           JOIN services s ON c.service_id = s.id
           LEFT JOIN work_schedule w ON a.reserved_date = w.id
           WHERE a.is_confirmed = 0
           ORDER BY a.created_at DESC"#,
    )
    .fetch_all(&state.db)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let add_ons = appointment_add_ons(&state, &row.id).await?;
        let prices: Vec<i64> = add_ons.iter().map(|(_, price)| *price).collect();
        let total = pricing::total_price(row.service_price, &prices);
        let description = describe(&row.service_name, &add_ons);
        views.push(PendingView {
            id: row.id,
            username: row.username,
            description,
            total_price: total,
            payment_method: row.payment_method,
            slot_datetime: row.slot_datetime,
        });
    }

    Ok(HttpResponse::Ok().json(views))
}

async fn confirm(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, OpError> {
    let receipt = booking::confirm_appointment(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Created().json(receipt))
}

async fn complete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, OpError> {
    booking::mark_appointment_completed(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn routine(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    let rows = sqlx::query_as::<_, RoutineRow>(
        r#"SELECT a.id, p.username, w.datetime AS slot_datetime
           FROM appointments a
           JOIN cart_items c ON a.cart_item_id = c.id
           JOIN profiles p ON c.user_id = p.id
           LEFT JOIN work_schedule w ON a.reserved_date = w.id
           WHERE a.is_confirmed = 1 AND a.is_completed = 0
           ORDER BY w.datetime ASC"#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn deposited_receipts(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    receipts_where(&state, false).await
}

async fn paid_receipts(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    receipts_where(&state, true).await
}

async fn receipts_where(
    state: &web::Data<AppState>,
    paid: bool,
) -> Result<HttpResponse, OpError> {
    // Unpaid receipts only arise from deposit bookings.
    let rows = if paid {
        sqlx::query_as::<_, ReceiptDetailRow>(
            r#"SELECT r.id, r.appointment_id, r.total_price, r.remaining_due, r.is_paid,
                      r.created_at, r.updated_at, p.username, s.name AS service_name
               FROM receipts r
               JOIN appointments a ON r.appointment_id = a.id
               JOIN cart_items c ON a.cart_item_id = c.id
               JOIN profiles p ON c.user_id = p.id
               JOIN services s ON c.service_id = s.id
               WHERE r.is_paid = 1
               ORDER BY r.created_at DESC"#,
        )
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, ReceiptDetailRow>(
            r#"SELECT r.id, r.appointment_id, r.total_price, r.remaining_due, r.is_paid,
                      r.created_at, r.updated_at, p.username, s.name AS service_name
               FROM receipts r
               JOIN appointments a ON r.appointment_id = a.id
               JOIN cart_items c ON a.cart_item_id = c.id
               JOIN profiles p ON c.user_id = p.id
               JOIN services s ON c.service_id = s.id
               WHERE r.is_paid = 0 AND a.payment_method = ?
               ORDER BY r.created_at DESC"#,
        )
        .bind(PAYMENT_DEPOSIT)
        .fetch_all(&state.db)
        .await?
    };

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let add_ons = appointment_add_ons(state, &row.appointment_id).await?;
        let description = describe(&row.service_name, &add_ons);
        views.push(ReceiptView {
            id: row.id,
            appointment_id: row.appointment_id,
            username: row.username,
            description,
            total_price: row.total_price,
            remaining_due: row.remaining_due,
            is_paid: row.is_paid != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        });
    }

    Ok(HttpResponse::Ok().json(views))
}

async fn mark_paid(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, OpError> {
    booking::mark_receipt_paid(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn candidates(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    let slots = schedule::generate_candidates(&state.db, Utc::now()).await?;
    let stamps: Vec<String> = slots.into_iter().map(timestamp).collect();
    Ok(HttpResponse::Ok().json(stamps))
}

async fn insert_slot(
    state: web::Data<AppState>,
    form: web::Json<SlotInsertForm>,
) -> Result<HttpResponse, OpError> {
    let parsed = DateTime::parse_from_rfc3339(&form.datetime)
        .map_err(|_| OpError::Validation("Invalid slot datetime.".to_string()))?
        .with_timezone(&Utc);

    let slot = schedule::insert_slot(&state.db, parsed, Utc::now()).await?;
    Ok(HttpResponse::Created().json(json!({
        "id": slot.id,
        "datetime": slot.datetime,
        "state": slot.state,
    })))
}

async fn appointment_add_ons(
    state: &web::Data<AppState>,
    appointment_id: &str,
) -> Result<Vec<(String, i64)>, OpError> {
    let add_ons = sqlx::query_as::<_, (String, i64)>(
        r#"SELECT ad.name, ad.price FROM appointments a
           JOIN cart_item_add_ons rel ON rel.cart_item_id = a.cart_item_id
           JOIN add_ons ad ON rel.add_on_id = ad.id
           WHERE a.id = ?
           ORDER BY ad.name"#,
    )
    .bind(appointment_id)
    .fetch_all(&state.db)
    .await?;
    Ok(add_ons)
}

/// "Service (Add-on, Add-on)" — how a booking is described to the clerk
/// everywhere.
fn describe(service_name: &str, add_ons: &[(String, i64)]) -> String {
    if add_ons.is_empty() {
        service_name.to_string()
    } else {
        let names: Vec<&str> = add_ons.iter().map(|(name, _)| name.as_str()).collect();
        format!("{} ({})", service_name, names.join(", "))
    }
}
