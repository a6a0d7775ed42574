use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub title: String,
}

pub async fn list(state: web::Data<AppState>, user: CurrentUser) -> Result<HttpResponse> {
    let conversations = state.store.list_conversations(user.id()).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

pub async fn create(state: web::Data<AppState>, user: CurrentUser) -> Result<HttpResponse> {
    let conversation = state.store.create_conversation(user.id()).await?;
    log::info!("[{}] Conversation created", conversation.id);
    Ok(HttpResponse::Created().json(conversation))
}

pub async fn get(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let detail = state
        .store
        .get_conversation(user.id(), &path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(detail))
}

pub async fn rename(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<String>,
    body: web::Json<RenameRequest>,
) -> Result<HttpResponse> {
    let conversation = state
        .store
        .rename_conversation(user.id(), &path.into_inner(), &body.title)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}

pub async fn delete(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    state
        .store
        .delete_conversation(user.id(), &conversation_id)
        .await?;
    log::info!("[{}] Conversation deleted", conversation_id);
    Ok(HttpResponse::NoContent().finish())
}
