use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{basic_validator, AuthUser},
    chat,
    error::OpError,
    state::AppState,
};

#[derive(Deserialize)]
struct MessageForm {
    content: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/chat")
            .wrap(HttpAuthentication::basic(basic_validator))
            .service(web::resource("/conversation").route(web::get().to(my_conversation)))
            .service(web::resource("/conversations").route(web::get().to(inbox)))
            .service(
                web::resource("/conversations/{id}/messages")
                    .route(web::get().to(list_messages))
                    .route(web::post().to(send_message)),
            ),
    );
}

/// A customer's single conversation with the salon, created on first use.
async fn my_conversation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, OpError> {
    if auth.is_clerk() {
        return Err(OpError::Forbidden(
            "Clerks view conversations via the inbox.".to_string(),
        ));
    }
    let conversation_id = chat::find_or_create_conversation(&state.db, &auth).await?;
    Ok(HttpResponse::Ok().json(json!({ "conversation_id": conversation_id })))
}

async fn inbox(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, OpError> {
    if !auth.is_clerk() {
        return Err(OpError::Forbidden(
            "Only clerks can list all conversations.".to_string(),
        ));
    }
    let summaries = chat::inbox(&state.db, &auth).await?;
    Ok(HttpResponse::Ok().json(summaries))
}

async fn list_messages(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, OpError> {
    let messages = chat::list_messages(&state.db, &auth, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(messages))
}

async fn send_message(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<MessageForm>,
) -> Result<HttpResponse, OpError> {
    let message = chat::send_message(&state, &auth, &path.into_inner(), &form.content).await?;
    Ok(HttpResponse::Created().json(message))
}
