use serde::Serialize;

pub const ROLE_USER: &str = "user";
pub const ROLE_CLERK: &str = "clerk";

pub const SLOT_AVAILABLE: &str = "available";
pub const SLOT_RESERVED: &str = "reserved";

pub const PAYMENT_DEPOSIT: &str = "deposit";
pub const PAYMENT_FULL: &str = "full";

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub has_add_on_options: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AddOnRow {
    pub id: String,
    pub name: String,
    pub price: i64,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemRow {
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkSlotRow {
    pub id: String,
    pub datetime: String,
    pub state: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub cart_item_id: String,
    pub reserved_date: String,
    pub payment_method: String,
    pub is_confirmed: i64,
    pub is_completed: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReceiptRow {
    pub id: String,
    pub appointment_id: String,
    pub total_price: i64,
    pub remaining_due: i64,
    pub is_paid: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
}
