use actix_web::{web, HttpResponse};

use crate::auth::CurrentUser;
use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn handler(state: web::Data<AppState>, _user: CurrentUser) -> Result<HttpResponse> {
    match state.llm.list_models().await {
        Ok(models) => Ok(HttpResponse::Ok().json(models)),
        Err(error) => {
            log::error!("Failed to list models: {}", error);
            Err(ApiError::BadGateway(error.to_string()))
        }
    }
}
