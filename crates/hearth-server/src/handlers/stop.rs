use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::CurrentUser;
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Serialize)]
struct StopResponse {
    success: bool,
    message: String,
}

pub async fn handler(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let message_id = path.into_inner();
    log::info!("[{}] Stop request received", message_id);

    state
        .store
        .message_conversation(user.id(), message_id)
        .await?;

    if state.cancel_generation(message_id).await {
        log::info!("[{}] Cancellation triggered", message_id);
        Ok(HttpResponse::Ok().json(StopResponse {
            success: true,
            message: "Generation stopped".to_string(),
        }))
    } else {
        log::warn!("[{}] No active generation found", message_id);
        Err(ApiError::NotFound(
            "No active generation for this message".to_string(),
        ))
    }
}
