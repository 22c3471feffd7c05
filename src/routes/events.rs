use actix_web::{http::header, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::{basic_validator, AuthUser},
    chat,
    error::OpError,
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/events")
            .wrap(HttpAuthentication::basic(basic_validator))
            .service(
                web::resource("/conversations/{id}").route(web::get().to(conversation_events)),
            )
            .service(web::resource("/inbox").route(web::get().to(inbox_events))),
    );
}

/// New-message events for one conversation, as an SSE stream. Participants
/// only; history dedup is the consumer's job.
async fn conversation_events(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, OpError> {
    let conversation_id = path.into_inner();
    if !chat::is_participant(&state.db, &conversation_id, &auth.id).await? {
        return Err(OpError::Forbidden(
            "You are not part of this conversation.".to_string(),
        ));
    }

    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(event) => event,
            Err(_) => return None,
        };
        if event.conversation_id != conversation_id {
            return None;
        }
        Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

/// Every new message in any conversation the caller participates in.
async fn inbox_events(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, OpError> {
    let user_id = auth.id.clone();
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(event) => event,
            Err(_) => return None,
        };
        if !event.participant_ids.iter().any(|id| id == &user_id) {
            return None;
        }
        Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

fn event_to_bytes(event: &ServerEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: message\ndata: {}\n\n", payload))
}
