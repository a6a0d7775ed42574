use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hearth_core::{
    GenerationRecord, GenerationResult, GenerationSink, GenerationState, StreamEvent,
};
use hearth_llm::{FragmentStream, LLMChunk};

/// Identity and bookkeeping for one generation attempt.
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub message_id: i64,
    pub model: String,
    pub estimated_tokens: usize,
    pub started: Instant,
}

impl RelayContext {
    pub fn new(message_id: i64, model: impl Into<String>, estimated_tokens: usize) -> Self {
        Self {
            message_id,
            model: model.into(),
            estimated_tokens,
            started: Instant::now(),
        }
    }
}

/// Why the relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// Stream exhausted normally.
    Completed,
    /// Inference server never answered; its notice was forwarded as the last token.
    Unavailable,
    /// Stream raised an error.
    Failed,
    /// Stopped by the caller or the event channel closed.
    Cancelled,
}

impl RelayExit {
    pub fn state(&self) -> GenerationState {
        match self {
            RelayExit::Completed => GenerationState::Completed,
            _ => GenerationState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub result: GenerationResult,
    pub exit: RelayExit,
    pub persisted: bool,
}

enum Next {
    Item(Option<hearth_llm::Result<LLMChunk>>),
    Cancelled,
    Disconnected,
}

/// Consume `stream`, forwarding every fragment to `event_tx` in arrival order, then write the
/// accumulated result through `sink` exactly once.
///
/// Cancellation and a closed event channel are observed between fragments; either ends the relay
/// early and persists the partial text as incomplete. A sink failure is logged and does not
/// change what the caller has already received.
pub async fn run_relay(
    mut stream: FragmentStream,
    event_tx: &mpsc::Sender<StreamEvent>,
    cancel_token: &CancellationToken,
    sink: &dyn GenerationSink,
    context: RelayContext,
) -> RelayOutcome {
    let id = context.message_id;
    let mut result = GenerationResult::new();
    let mut state = GenerationState::Pending;

    let exit = loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => Next::Cancelled,
            _ = event_tx.closed() => Next::Disconnected,
            item = stream.next() => Next::Item(item),
        };

        if state == GenerationState::Pending {
            state = GenerationState::Streaming;
            log::debug!("[{}] {:?} -> {:?}", id, GenerationState::Pending, state);
        }

        match next {
            Next::Cancelled => {
                log::info!("[{}] Generation stopped by caller", id);
                break RelayExit::Cancelled;
            }
            Next::Disconnected => {
                log::info!("[{}] Client disconnected during generation", id);
                break RelayExit::Cancelled;
            }
            Next::Item(None) => {
                result.complete();
                break RelayExit::Completed;
            }
            Next::Item(Some(Ok(LLMChunk::Token(token)))) => {
                result.append(&token);
                if event_tx.send(StreamEvent::token(token)).await.is_err() {
                    log::info!("[{}] Client disconnected during generation", id);
                    break RelayExit::Cancelled;
                }
            }
            Next::Item(Some(Ok(LLMChunk::Unavailable(notice)))) => {
                log::warn!("[{}] Inference server unavailable", id);
                result.append(&notice);
                let _ = event_tx.send(StreamEvent::token(notice)).await;
                break RelayExit::Unavailable;
            }
            Next::Item(Some(Err(error))) => {
                let message = error.to_string();
                log::error!("[{}] Generation failed: {}", id, message);
                let _ = event_tx.send(StreamEvent::error(message.clone())).await;
                result.fail(message);
                break RelayExit::Failed;
            }
        }
    };

    drop(stream);
    log::debug!("[{}] {:?} -> {:?}", id, state, exit.state());

    let record = GenerationRecord {
        message_id: id,
        text: result.stored_text(),
        elapsed_secs: context.started.elapsed().as_secs_f64(),
        estimated_tokens: context.estimated_tokens,
        model: context.model,
        completed: exit == RelayExit::Completed,
    };

    let persisted = match sink.persist(record).await {
        Ok(()) => true,
        Err(error) => {
            log::error!("[{}] Failed to persist generation: {}", id, error);
            false
        }
    };

    if matches!(exit, RelayExit::Completed | RelayExit::Unavailable) {
        let _ = event_tx.send(StreamEvent::Done).await;
    }

    RelayOutcome {
        result,
        exit,
        persisted,
    }
}
