use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{user_validator, AuthUser},
    booking,
    error::OpError,
    models::AddOnRow,
    pricing,
    schedule,
    state::AppState,
};

#[derive(Debug, Clone, sqlx::FromRow)]
struct CartItemDetailRow {
    id: String,
    service_name: String,
    service_price: i64,
    created_at: String,
}

#[derive(Serialize)]
struct CartItemView {
    id: String,
    service_name: String,
    service_price: i64,
    add_ons: Vec<AddOnRow>,
    total_price: i64,
    deposit_remaining: i64,
    created_at: String,
}

#[derive(Serialize)]
struct SlotView {
    id: String,
    datetime: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
struct HistoryRow {
    id: String,
    service_name: String,
    slot_datetime: Option<String>,
    payment_method: String,
}

#[derive(Deserialize)]
struct AddToCartForm {
    service_id: String,
    #[serde(default)]
    add_on_ids: Vec<String>,
}

#[derive(Deserialize)]
struct ReservationForm {
    cart_item_id: String,
    slot_id: String,
    payment_method: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/account")
            .wrap(HttpAuthentication::basic(user_validator))
            .service(
                web::resource("/cart")
                    .route(web::get().to(list_cart))
                    .route(web::post().to(add_to_cart)),
            )
            .service(web::resource("/cart/{id}").route(web::delete().to(cancel_cart_item)))
            .service(web::resource("/slots").route(web::get().to(open_slots)))
            .service(
                web::resource("/appointments")
                    .route(web::get().to(appointment_history))
                    .route(web::post().to(reserve)),
            ),
    );
}

async fn list_cart(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, OpError> {
    let rows = sqlx::query_as::<_, CartItemDetailRow>(
        r#"SELECT c.id, s.name AS service_name, s.price AS service_price, c.created_at
           FROM cart_items c
           JOIN services s ON c.service_id = s.id
           WHERE c.user_id = ?
             AND NOT EXISTS (SELECT 1 FROM appointments a WHERE a.cart_item_id = c.id)
           ORDER BY c.created_at DESC"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let add_ons = sqlx::query_as::<_, AddOnRow>(
            r#"SELECT a.id, a.name, a.price FROM cart_item_add_ons rel
               JOIN add_ons a ON rel.add_on_id = a.id
               WHERE rel.cart_item_id = ?
               ORDER BY a.name"#,
        )
        .bind(&row.id)
        .fetch_all(&state.db)
        .await?;

        let prices: Vec<i64> = add_ons.iter().map(|a| a.price).collect();
        let total = pricing::total_price(row.service_price, &prices);
        items.push(CartItemView {
            id: row.id,
            service_name: row.service_name,
            service_price: row.service_price,
            add_ons,
            total_price: total,
            deposit_remaining: pricing::quoted_remaining(total, crate::models::PAYMENT_DEPOSIT),
            created_at: row.created_at,
        });
    }

    Ok(HttpResponse::Ok().json(items))
}

async fn add_to_cart(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<AddToCartForm>,
) -> Result<HttpResponse, OpError> {
    let form = form.into_inner();
    let id = booking::add_to_cart(&state.db, &auth, &form.service_id, &form.add_on_ids).await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

async fn cancel_cart_item(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, OpError> {
    booking::cancel_cart_item(&state.db, &auth, &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn open_slots(state: web::Data<AppState>) -> Result<HttpResponse, OpError> {
    let slots = schedule::open_slots(&state.db).await?;
    let views: Vec<SlotView> = slots
        .into_iter()
        .map(|slot| SlotView {
            id: slot.id,
            datetime: slot.datetime,
        })
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

async fn reserve(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<ReservationForm>,
) -> Result<HttpResponse, OpError> {
    let form = form.into_inner();
    let appointment = booking::reserve_slot(
        &state.db,
        &auth,
        &form.cart_item_id,
        &form.slot_id,
        &form.payment_method,
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "id": appointment.id,
        "cart_item_id": appointment.cart_item_id,
        "slot_id": appointment.reserved_date,
        "payment_method": appointment.payment_method,
        "is_confirmed": false,
    })))
}

async fn appointment_history(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, OpError> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"SELECT a.id, s.name AS service_name, w.datetime AS slot_datetime, a.payment_method
           FROM appointments a
           JOIN cart_items c ON a.cart_item_id = c.id
           JOIN services s ON c.service_id = s.id
           LEFT JOIN work_schedule w ON a.reserved_date = w.id
           WHERE c.user_id = ? AND a.is_confirmed = 1 AND a.is_completed = 1
           ORDER BY w.datetime DESC"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}
