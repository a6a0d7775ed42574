use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;

pub async fn handler(state: web::Data<AppState>) -> HttpResponse {
    let inference_available = state.llm.is_available().await;

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "inference_server": inference_available,
        "model": state.llm.model_name(),
    }))
}
