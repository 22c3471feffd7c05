use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use salondesk::{
    auth::AuthUser,
    booking, chat, db,
    error::OpError,
    models::{
        ReceiptRow, ROLE_CLERK, ROLE_USER, PAYMENT_DEPOSIT, PAYMENT_FULL, SLOT_AVAILABLE,
        SLOT_RESERVED,
    },
    schedule,
    state::AppState,
};

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    db::run_migrations(&pool).await.expect("run migrations");
    pool
}

fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().unwrap()
}

async fn insert_profile(pool: &SqlitePool, username: &str, role: &str) -> AuthUser {
    let id = salondesk::auth::new_id();
    let email = format!("{username}@example.test");
    sqlx::query(
        "INSERT INTO profiles (id, email, username, role, password_hash, created_at) VALUES (?, ?, ?, ?, 'x', ?)",
    )
    .bind(&id)
    .bind(&email)
    .bind(username)
    .bind(role)
    .bind(db::now_timestamp())
    .execute(pool)
    .await
    .unwrap();
    AuthUser {
        id,
        username: username.to_string(),
        email,
        role: role.to_string(),
    }
}

async fn insert_service(pool: &SqlitePool, name: &str, price: i64, has_add_ons: bool) -> String {
    let id = salondesk::auth::new_id();
    sqlx::query("INSERT INTO services (id, name, price, has_add_on_options) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(price)
        .bind(i64::from(has_add_ons))
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn insert_add_on(pool: &SqlitePool, name: &str, price: i64) -> String {
    let id = salondesk::auth::new_id();
    sqlx::query("INSERT INTO add_ons (id, name, price) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(price)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn slot_state(pool: &SqlitePool, slot_id: &str) -> String {
    sqlx::query_scalar("SELECT state FROM work_schedule WHERE id = ?")
        .bind(slot_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn fetch_receipt(pool: &SqlitePool, receipt_id: &str) -> ReceiptRow {
    sqlx::query_as::<_, ReceiptRow>(
        "SELECT id, appointment_id, total_price, remaining_due, is_paid, created_at, updated_at FROM receipts WHERE id = ?",
    )
    .bind(receipt_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn deposit_booking_end_to_end() {
    let pool = test_pool().await;
    let user = insert_profile(&pool, "thandi", ROLE_USER).await;
    insert_profile(&pool, "clerk", ROLE_CLERK).await;
    let service = insert_service(&pool, "Classic Cut", 200, true).await;
    let add_on = insert_add_on(&pool, "Deep Conditioning", 50).await;

    let now = at(2025, 1, 1, 8);
    let slot = schedule::insert_slot(&pool, at(2025, 1, 6, 9), now).await.unwrap();

    let cart_item = booking::add_to_cart(&pool, &user, &service, &[add_on]).await.unwrap();

    let appointment =
        booking::reserve_slot(&pool, &user, &cart_item, &slot.id, PAYMENT_DEPOSIT)
            .await
            .unwrap();
    assert_eq!(appointment.is_confirmed, 0);
    assert_eq!(slot_state(&pool, &slot.id).await, SLOT_RESERVED);

    let appointments_for_slot: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE reserved_date = ?")
            .bind(&slot.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(appointments_for_slot, 1);

    let receipt = booking::confirm_appointment(&pool, &appointment.id).await.unwrap();
    assert_eq!(receipt.total_price, 250);
    assert_eq!(receipt.remaining_due, 250);
    assert_eq!(receipt.is_paid, 0);

    booking::mark_receipt_paid(&pool, &receipt.id).await.unwrap();
    let paid = fetch_receipt(&pool, &receipt.id).await;
    assert_eq!(paid.is_paid, 1);
    assert_eq!(paid.remaining_due, 0);
    assert_eq!(paid.total_price, 250);

    booking::mark_appointment_completed(&pool, &appointment.id).await.unwrap();
    let completed: i64 =
        sqlx::query_scalar("SELECT is_completed FROM appointments WHERE id = ?")
            .bind(&appointment.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn full_payment_receipt_is_paid_at_confirmation() {
    let pool = test_pool().await;
    let user = insert_profile(&pool, "sam", ROLE_USER).await;
    let service = insert_service(&pool, "Blow Wave", 150, false).await;

    let now = at(2025, 1, 1, 8);
    let slot = schedule::insert_slot(&pool, at(2025, 1, 7, 11), now).await.unwrap();
    let cart_item = booking::add_to_cart(&pool, &user, &service, &[]).await.unwrap();
    let appointment = booking::reserve_slot(&pool, &user, &cart_item, &slot.id, PAYMENT_FULL)
        .await
        .unwrap();

    let receipt = booking::confirm_appointment(&pool, &appointment.id).await.unwrap();
    assert_eq!(receipt.total_price, 150);
    assert_eq!(receipt.remaining_due, 0);
    assert_eq!(receipt.is_paid, 1);

    let err = booking::mark_receipt_paid(&pool, &receipt.id).await.unwrap_err();
    assert!(matches!(err, OpError::Conflict(_)));
}

#[tokio::test]
async fn clerks_cannot_reserve_slots() {
    let pool = test_pool().await;
    let user = insert_profile(&pool, "zola", ROLE_USER).await;
    let clerk = insert_profile(&pool, "clerk", ROLE_CLERK).await;
    let service = insert_service(&pool, "Manicure", 180, false).await;

    let now = at(2025, 1, 1, 8);
    let slot = schedule::insert_slot(&pool, at(2025, 1, 6, 13), now).await.unwrap();
    let cart_item = booking::add_to_cart(&pool, &user, &service, &[]).await.unwrap();

    let err = booking::reserve_slot(&pool, &clerk, &cart_item, &slot.id, PAYMENT_FULL)
        .await
        .unwrap_err();
    assert!(matches!(err, OpError::Forbidden(_)));

    // Nothing was written.
    assert_eq!(slot_state(&pool, &slot.id).await, SLOT_AVAILABLE);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appointments")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn second_reservation_of_same_slot_conflicts() {
    let pool = test_pool().await;
    let first = insert_profile(&pool, "amina", ROLE_USER).await;
    let second = insert_profile(&pool, "lebo", ROLE_USER).await;
    let service = insert_service(&pool, "Colour Treatment", 450, false).await;

    let now = at(2025, 1, 1, 8);
    let slot = schedule::insert_slot(&pool, at(2025, 1, 8, 15), now).await.unwrap();
    let cart_a = booking::add_to_cart(&pool, &first, &service, &[]).await.unwrap();
    let cart_b = booking::add_to_cart(&pool, &second, &service, &[]).await.unwrap();

    booking::reserve_slot(&pool, &first, &cart_a, &slot.id, PAYMENT_DEPOSIT)
        .await
        .unwrap();
    let err = booking::reserve_slot(&pool, &second, &cart_b, &slot.id, PAYMENT_DEPOSIT)
        .await
        .unwrap_err();
    assert!(matches!(err, OpError::Conflict(_)));

    // The loser's cart item survives for a retry.
    let remaining: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE id = ?")
            .bind(&cart_b)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn completion_requires_confirmation() {
    let pool = test_pool().await;
    let user = insert_profile(&pool, "nadia", ROLE_USER).await;
    let service = insert_service(&pool, "Manicure", 180, false).await;

    let now = at(2025, 1, 1, 8);
    let slot = schedule::insert_slot(&pool, at(2025, 1, 9, 9), now).await.unwrap();
    let cart_item = booking::add_to_cart(&pool, &user, &service, &[]).await.unwrap();
    let appointment = booking::reserve_slot(&pool, &user, &cart_item, &slot.id, PAYMENT_FULL)
        .await
        .unwrap();

    let err = booking::mark_appointment_completed(&pool, &appointment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, OpError::Conflict(_)));

    booking::confirm_appointment(&pool, &appointment.id).await.unwrap();
    booking::mark_appointment_completed(&pool, &appointment.id).await.unwrap();
}

#[tokio::test]
async fn duplicate_slot_timestamp_is_rejected() {
    let pool = test_pool().await;
    let now = at(2025, 1, 1, 8);
    let when = at(2025, 1, 10, 11);

    schedule::insert_slot(&pool, when, now).await.unwrap();
    let err = schedule::insert_slot(&pool, when, now).await.unwrap_err();
    assert!(matches!(err, OpError::Conflict(_)));
}

#[tokio::test]
async fn candidate_generation_purges_and_subtracts_taken() {
    let pool = test_pool().await;
    let now = at(2025, 1, 6, 10);

    // One expired slot, one future taken slot.
    schedule::insert_slot(&pool, at(2025, 1, 3, 9), at(2025, 1, 1, 8)).await.unwrap();
    schedule::insert_slot(&pool, at(2025, 1, 7, 13), at(2025, 1, 1, 8))
        .await
        .unwrap();

    let candidates = schedule::generate_candidates(&pool, now).await.unwrap();

    let expired: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_schedule WHERE datetime < ?")
        .bind(db::timestamp(now))
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(expired, 0);

    let taken_dt = at(2025, 1, 7, 13);
    assert!(!candidates.contains(&taken_dt));
    assert!(candidates.iter().all(|c| *c > now));
    assert!(candidates.contains(&at(2025, 1, 7, 9)));
}

#[tokio::test]
async fn conversation_is_created_once_and_messages_broadcast() {
    let pool = test_pool().await;
    let state = AppState::new(pool.clone());
    let user = insert_profile(&pool, "thandi", ROLE_USER).await;
    let clerk = insert_profile(&pool, "clerk", ROLE_CLERK).await;

    let first = chat::find_or_create_conversation(&pool, &user).await.unwrap();
    let second = chat::find_or_create_conversation(&pool, &user).await.unwrap();
    assert_eq!(first, second);

    let mut rx = state.events.subscribe();
    let sent = chat::send_message(&state, &user, &first, "Hello!").await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.message_id, sent.id);
    assert_eq!(event.conversation_id, first);
    assert!(event.participant_ids.contains(&clerk.id));
    assert!(event.participant_ids.contains(&user.id));

    let history = chat::list_messages(&pool, &clerk, &first).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "Hello!");

    let outsider = insert_profile(&pool, "mallory", ROLE_USER).await;
    let err = chat::list_messages(&pool, &outsider, &first).await.unwrap_err();
    assert!(matches!(err, OpError::Forbidden(_)));
}
