use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use hearth_store::NewUpload;

use crate::auth::CurrentUser;
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

/// Store the raw request body as one file. `Content-Type` names the file type.
pub async fn upload(
    state: web::Data<AppState>,
    user: CurrentUser,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Content-Type header is required".to_string()))?
        .to_string();

    let upload = NewUpload {
        filename: query.into_inner().filename,
        content_type,
        data: body.to_vec(),
    };
    let metadata = state
        .store
        .insert_file(user.id(), &conversation_id, upload)
        .await?;
    Ok(HttpResponse::Created().json(metadata))
}

pub async fn list(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let files = state
        .store
        .conversation_files(user.id(), &path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(files))
}

/// Logout hook: hide every file the user uploaded.
pub async fn deactivate(state: web::Data<AppState>, user: CurrentUser) -> Result<HttpResponse> {
    let count = state.store.deactivate_user_files(user.id()).await?;
    log::info!("Deactivated {} files for user {}", count, user.id());
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "deactivated": count })))
}
