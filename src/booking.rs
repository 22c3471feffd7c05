use sqlx::SqlitePool;

use crate::{
    auth::{new_id, AuthUser},
    db::now_timestamp,
    error::OpError,
    models::{
        AppointmentRow, ReceiptRow, PAYMENT_DEPOSIT, PAYMENT_FULL, SLOT_AVAILABLE, SLOT_RESERVED,
    },
    pricing,
};

fn valid_payment_method(method: &str) -> bool {
    method == PAYMENT_DEPOSIT || method == PAYMENT_FULL
}

/// Put a service (plus optional add-ons) in the acting user's cart.
pub async fn add_to_cart(
    pool: &SqlitePool,
    actor: &AuthUser,
    service_id: &str,
    add_on_ids: &[String],
) -> Result<String, OpError> {
    if actor.is_clerk() {
        return Err(OpError::Forbidden(
            "Clerks cannot add services to the cart.".to_string(),
        ));
    }

    let service = sqlx::query_as::<_, (i64,)>(
        "SELECT has_add_on_options FROM services WHERE id = ?",
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await?
    .ok_or(OpError::NotFound("service"))?;

    if !add_on_ids.is_empty() && service.0 == 0 {
        return Err(OpError::Validation(
            "This service does not offer add-ons.".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let cart_item_id = new_id();
    sqlx::query(
        "INSERT INTO cart_items (id, user_id, service_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&cart_item_id)
    .bind(&actor.id)
    .bind(service_id)
    .bind(now_timestamp())
    .execute(&mut *tx)
    .await?;

    for add_on_id in add_on_ids {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM add_ons WHERE id = ?")
            .bind(add_on_id)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(OpError::NotFound("add-on"));
        }
        sqlx::query("INSERT INTO cart_item_add_ons (cart_item_id, add_on_id) VALUES (?, ?)")
            .bind(&cart_item_id)
            .bind(add_on_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(cart_item_id)
}

/// Drop a cart item the acting user owns. Items already converted into an
/// appointment cannot be cancelled.
pub async fn cancel_cart_item(
    pool: &SqlitePool,
    actor: &AuthUser,
    cart_item_id: &str,
) -> Result<(), OpError> {
    let booked: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE cart_item_id = ?")
            .bind(cart_item_id)
            .fetch_one(pool)
            .await?;
    if booked > 0 {
        return Err(OpError::Conflict(
            "This cart item has already been booked.".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM cart_items WHERE id = ? AND user_id = ?")
        .bind(cart_item_id)
        .bind(&actor.id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(OpError::NotFound("cart item"));
    }
    Ok(())
}

/// Bind a cart item to a chosen open slot: the slot flips
/// available -> reserved and an unconfirmed appointment is created, both in
/// one transaction. A slot claimed by a concurrent session surfaces as a
/// conflict instead of a double booking.
pub async fn reserve_slot(
    pool: &SqlitePool,
    actor: &AuthUser,
    cart_item_id: &str,
    slot_id: &str,
    payment_method: &str,
) -> Result<AppointmentRow, OpError> {
    if slot_id.trim().is_empty() {
        return Err(OpError::Validation(
            "Please select a reserved date.".to_string(),
        ));
    }
    if !valid_payment_method(payment_method) {
        return Err(OpError::Validation(
            "Payment method must be 'deposit' or 'full'.".to_string(),
        ));
    }
    if actor.is_clerk() {
        return Err(OpError::Forbidden(
            "Clerks are not allowed to make appointments.".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let owned: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE id = ? AND user_id = ?")
            .bind(cart_item_id)
            .bind(&actor.id)
            .fetch_one(&mut *tx)
            .await?;
    if owned == 0 {
        return Err(OpError::NotFound("cart item"));
    }

    let booked: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE cart_item_id = ?")
            .bind(cart_item_id)
            .fetch_one(&mut *tx)
            .await?;
    if booked > 0 {
        return Err(OpError::Conflict(
            "This cart item has already been booked.".to_string(),
        ));
    }

    let claimed = sqlx::query("UPDATE work_schedule SET state = ? WHERE id = ? AND state = ?")
        .bind(SLOT_RESERVED)
        .bind(slot_id)
        .bind(SLOT_AVAILABLE)
        .execute(&mut *tx)
        .await?;

    if claimed.rows_affected() == 0 {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_schedule WHERE id = ?")
            .bind(slot_id)
            .fetch_one(&mut *tx)
            .await?;
        return Err(if exists == 0 {
            OpError::NotFound("work slot")
        } else {
            OpError::Conflict("That slot is no longer available.".to_string())
        });
    }

    let appointment = AppointmentRow {
        id: new_id(),
        cart_item_id: cart_item_id.to_string(),
        reserved_date: slot_id.to_string(),
        payment_method: payment_method.to_string(),
        is_confirmed: 0,
        is_completed: 0,
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"INSERT INTO appointments
           (id, cart_item_id, reserved_date, payment_method, is_confirmed, is_completed, created_at)
           VALUES (?, ?, ?, ?, 0, 0, ?)"#,
    )
    .bind(&appointment.id)
    .bind(&appointment.cart_item_id)
    .bind(&appointment.reserved_date)
    .bind(&appointment.payment_method)
    .bind(&appointment.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(appointment)
}

/// Clerk confirmation: price the appointment's cart item, write the receipt
/// and flag the appointment confirmed in one transaction.
pub async fn confirm_appointment(
    pool: &SqlitePool,
    appointment_id: &str,
) -> Result<ReceiptRow, OpError> {
    let mut tx = pool.begin().await?;

    let appointment = sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, cart_item_id, reserved_date, payment_method, is_confirmed, is_completed, created_at
           FROM appointments WHERE id = ?"#,
    )
    .bind(appointment_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(OpError::NotFound("appointment"))?;

    if appointment.is_confirmed != 0 {
        return Err(OpError::Conflict(
            "Appointment is already confirmed.".to_string(),
        ));
    }

    let service_price: i64 = sqlx::query_scalar(
        r#"SELECT s.price FROM cart_items c
           JOIN services s ON c.service_id = s.id
           WHERE c.id = ?"#,
    )
    .bind(&appointment.cart_item_id)
    .fetch_one(&mut *tx)
    .await?;

    let add_on_prices: Vec<i64> = sqlx::query_scalar(
        r#"SELECT a.price FROM cart_item_add_ons rel
           JOIN add_ons a ON rel.add_on_id = a.id
           WHERE rel.cart_item_id = ?"#,
    )
    .bind(&appointment.cart_item_id)
    .fetch_all(&mut *tx)
    .await?;

    let total = pricing::total_price(service_price, &add_on_prices);
    let remaining = pricing::receipt_remaining(total, &appointment.payment_method);
    let is_paid = i64::from(appointment.payment_method == PAYMENT_FULL);
    let now = now_timestamp();

    let receipt = ReceiptRow {
        id: new_id(),
        appointment_id: appointment.id.clone(),
        total_price: total,
        remaining_due: remaining,
        is_paid,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"INSERT INTO receipts
           (id, appointment_id, total_price, remaining_due, is_paid, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&receipt.id)
    .bind(&receipt.appointment_id)
    .bind(receipt.total_price)
    .bind(receipt.remaining_due)
    .bind(receipt.is_paid)
    .bind(&receipt.created_at)
    .bind(&receipt.updated_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE appointments SET is_confirmed = 1 WHERE id = ?")
        .bind(&appointment.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(receipt)
}

/// Settle the outstanding balance on a deposited receipt.
pub async fn mark_receipt_paid(pool: &SqlitePool, receipt_id: &str) -> Result<(), OpError> {
    let result = sqlx::query(
        "UPDATE receipts SET is_paid = 1, remaining_due = 0, updated_at = ? WHERE id = ? AND is_paid = 0",
    )
    .bind(now_timestamp())
    .bind(receipt_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM receipts WHERE id = ?")
            .bind(receipt_id)
            .fetch_one(pool)
            .await?;
        return Err(if exists == 0 {
            OpError::NotFound("receipt")
        } else {
            OpError::Conflict("Receipt is already paid.".to_string())
        });
    }
    Ok(())
}

/// Close out a confirmed appointment. Unconfirmed appointments cannot be
/// completed.
pub async fn mark_appointment_completed(
    pool: &SqlitePool,
    appointment_id: &str,
) -> Result<(), OpError> {
    let result = sqlx::query(
        "UPDATE appointments SET is_completed = 1 WHERE id = ? AND is_confirmed = 1 AND is_completed = 0",
    )
    .bind(appointment_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT is_confirmed, is_completed FROM appointments WHERE id = ?",
        )
        .bind(appointment_id)
        .fetch_optional(pool)
        .await?;
        return Err(match row {
            None => OpError::NotFound("appointment"),
            Some((_, 1)) => OpError::Conflict("Appointment is already completed.".to_string()),
            Some((0, _)) => OpError::Conflict(
                "Appointment must be confirmed before it can be completed.".to_string(),
            ),
            Some(_) => OpError::Conflict("Appointment could not be completed.".to_string()),
        });
    }
    Ok(())
}
