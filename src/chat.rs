use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    auth::{new_id, AuthUser},
    db::now_timestamp,
    error::OpError,
    models::{MessageRow, ROLE_CLERK},
    state::{AppState, ServerEvent},
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub counterpart_id: String,
    pub counterpart_username: String,
    pub last_message_at: Option<String>,
}

/// A customer has exactly one conversation, shared with a clerk. Created
/// lazily on first access.
pub async fn find_or_create_conversation(
    pool: &SqlitePool,
    actor: &AuthUser,
) -> Result<String, OpError> {
    let existing = sqlx::query_as::<_, (String,)>(
        "SELECT conversation_id FROM conversation_participants WHERE user_id = ? LIMIT 1",
    )
    .bind(&actor.id)
    .fetch_optional(pool)
    .await?;

    if let Some((conversation_id,)) = existing {
        return Ok(conversation_id);
    }

    let clerk = sqlx::query_as::<_, (String,)>(
        "SELECT id FROM profiles WHERE role = ? LIMIT 1",
    )
    .bind(ROLE_CLERK)
    .fetch_optional(pool)
    .await?
    .ok_or(OpError::NotFound("clerk"))?;

    let mut tx = pool.begin().await?;

    let conversation_id = new_id();
    sqlx::query("INSERT INTO conversations (id, created_at) VALUES (?, ?)")
        .bind(&conversation_id)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;

    for user_id in [&actor.id, &clerk.0] {
        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?, ?)",
        )
        .bind(&conversation_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(conversation_id)
}

pub async fn is_participant(
    pool: &SqlitePool,
    conversation_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ? AND user_id = ?",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn participant_ids(
    pool: &SqlitePool,
    conversation_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String,)>(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = ?",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Ordered message history; participants only.
pub async fn list_messages(
    pool: &SqlitePool,
    actor: &AuthUser,
    conversation_id: &str,
) -> Result<Vec<MessageRow>, OpError> {
    if !is_participant(pool, conversation_id, &actor.id).await? {
        return Err(OpError::Forbidden(
            "You are not part of this conversation.".to_string(),
        ));
    }

    let messages = sqlx::query_as::<_, MessageRow>(
        r#"SELECT id, conversation_id, sender_id, content, created_at
           FROM messages
           WHERE conversation_id = ?
           ORDER BY created_at ASC, id ASC"#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

/// Insert a message and publish it on the broadcast channel for SSE
/// subscribers.
pub async fn send_message(
    state: &AppState,
    actor: &AuthUser,
    conversation_id: &str,
    content: &str,
) -> Result<MessageRow, OpError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(OpError::Validation("Message cannot be empty.".to_string()));
    }
    if !is_participant(&state.db, conversation_id, &actor.id).await? {
        return Err(OpError::Forbidden(
            "You are not part of this conversation.".to_string(),
        ));
    }

    let message = MessageRow {
        id: new_id(),
        conversation_id: conversation_id.to_string(),
        sender_id: actor.id.clone(),
        content: content.to_string(),
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(&message.id)
    .bind(&message.conversation_id)
    .bind(&message.sender_id)
    .bind(&message.content)
    .bind(&message.created_at)
    .execute(&state.db)
    .await?;

    let participants = participant_ids(&state.db, conversation_id).await?;
    let _ = state.events.send(ServerEvent {
        kind: "message_created".to_string(),
        message_id: message.id.clone(),
        conversation_id: message.conversation_id.clone(),
        sender_id: message.sender_id.clone(),
        sender_username: actor.username.clone(),
        content: message.content.clone(),
        created_at: message.created_at.clone(),
        participant_ids: participants,
    });

    Ok(message)
}

/// Clerk inbox: every conversation the clerk participates in, with the
/// customer on the other side and the latest message time.
pub async fn inbox(pool: &SqlitePool, actor: &AuthUser) -> Result<Vec<ConversationSummary>, OpError> {
    let summaries = sqlx::query_as::<_, ConversationSummary>(
        r#"SELECT cp.conversation_id,
                  p.id AS counterpart_id,
                  p.username AS counterpart_username,
                  (SELECT MAX(m.created_at) FROM messages m
                   WHERE m.conversation_id = cp.conversation_id) AS last_message_at
           FROM conversation_participants cp
           JOIN conversation_participants other
             ON other.conversation_id = cp.conversation_id AND other.user_id != cp.user_id
           JOIN profiles p ON p.id = other.user_id
           WHERE cp.user_id = ?
           ORDER BY last_message_at DESC"#,
    )
    .bind(&actor.id)
    .fetch_all(pool)
    .await?;

    Ok(summaries)
}
