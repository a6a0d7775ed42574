use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tokio::sync::mpsc;

use hearth_core::{append_attachments, GenerationRequest, StreamEvent};
use hearth_relay::{run_relay, RelayContext};

use crate::auth::CurrentUser;
use crate::error::{ApiError, Result};
use crate::state::{sse_body, AppState, EVENT_BUFFER};

pub const MESSAGE_ID_HEADER: &str = "X-Message-Id";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub conversation_id: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

pub async fn handler(
    state: web::Data<AppState>,
    user: CurrentUser,
    request: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    let message = request.message;
    if message.trim().is_empty() && request.file_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "Message or files required".to_string(),
        ));
    }

    let stored = state
        .store
        .insert_message(
            user.id(),
            &request.conversation_id,
            &message,
            &request.file_ids,
        )
        .await?;
    let message_id = stored.id;
    log::info!(
        "[{}] Chat message {} received ({} files)",
        request.conversation_id,
        message_id,
        request.file_ids.len()
    );

    let history = state
        .store
        .history(&request.conversation_id, message_id)
        .await?;
    let attachments = state.store.attached_texts(message_id).await?;
    let prompt = append_attachments(&message, &attachments);

    let (generation, trimmed) = GenerationRequest::from_history(
        &state.instruction,
        &history,
        &prompt,
        state.defaults.clone(),
    );
    if trimmed.turns_removed > 0 {
        log::debug!(
            "[{}] Dropped {} turns to fit the context budget",
            message_id,
            trimmed.turns_removed
        );
    }
    if !trimmed.within_budget {
        log::warn!(
            "[{}] Prompt still exceeds the context budget ({} estimated tokens)",
            message_id,
            trimmed.estimated_tokens
        );
    }

    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(EVENT_BUFFER);
    let cancel_token = state.register_generation(message_id).await;
    let estimated_tokens = trimmed.estimated_tokens;
    let task_state = state.get_ref().clone();

    tokio::spawn(async move {
        let progress = [
            StreamEvent::progress("Processing conversation context..."),
            StreamEvent::progress(format!(
                "Processing {} estimated tokens...",
                estimated_tokens
            )),
        ];
        for event in progress {
            let _ = event_tx.send(event).await;
        }

        let context = RelayContext::new(message_id, task_state.llm.model_name(), estimated_tokens);
        let stream = task_state.llm.generate_stream(generation);
        let outcome = run_relay(
            stream,
            &event_tx,
            &cancel_token,
            &task_state.store,
            context,
        )
        .await;

        log::info!(
            "[{}] Generation finished: {:?}, {} chars",
            message_id,
            outcome.exit,
            outcome.result.full_text.chars().count()
        );
        task_state.finish_generation(message_id).await;
    });

    Ok(HttpResponse::Ok()
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONNECTION, "keep-alive"))
        .append_header((MESSAGE_ID_HEADER, message_id.to_string()))
        .streaming(sse_body(event_rx)))
}
