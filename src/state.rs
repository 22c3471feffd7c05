use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { db, events }
    }
}

/// Broadcast payload for a newly inserted message. Carried on the
/// process-wide channel; SSE subscribers filter by conversation or by
/// participant before forwarding.
#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub created_at: String,
    #[serde(skip_serializing)]
    pub participant_ids: Vec<String>,
}
