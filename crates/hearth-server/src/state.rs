use std::collections::HashMap;
use std::sync::Arc;

use actix_web::web::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use hearth_core::{GenerationParameters, StreamEvent};
use hearth_llm::{InferenceProvider, LocalInferenceClient};
use hearth_store::SqliteChatStore;

use crate::config::ServerConfig;

/// Capacity of the per-request event channel.
pub const EVENT_BUFFER: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteChatStore,
    pub llm: Arc<dyn InferenceProvider>,
    pub defaults: GenerationParameters,
    pub instruction: String,
    /// Running generations, keyed by message id
    pub cancel_tokens: Arc<RwLock<HashMap<i64, CancellationToken>>>,
}

impl AppState {
    pub fn new(
        store: SqliteChatStore,
        llm: Arc<dyn InferenceProvider>,
        defaults: GenerationParameters,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            store,
            llm,
            defaults,
            instruction: instruction.into(),
            cancel_tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open the database and build the inference client.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        log::info!("Initializing storage at: {:?}", config.database_path);
        let store = SqliteChatStore::new(&config.database_path);
        store.init().await?;

        let client = LocalInferenceClient::new(config.inference.clone())?;

        Ok(Self::new(
            store,
            Arc::new(client),
            config.defaults.clone(),
            config.instruction.clone(),
        ))
    }

    pub async fn register_generation(&self, message_id: i64) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancel_tokens
            .write()
            .await
            .insert(message_id, token.clone());
        token
    }

    pub async fn finish_generation(&self, message_id: i64) {
        self.cancel_tokens.write().await.remove(&message_id);
    }

    /// Cancel a running generation. Returns false when none is registered.
    pub async fn cancel_generation(&self, message_id: i64) -> bool {
        match self.cancel_tokens.write().await.remove(&message_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// SSE body fed by `rx`. Dropping the body drops `rx`, which the relay sees as a disconnect.
pub fn sse_body(
    mut rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            yield Ok::<_, actix_web::Error>(Bytes::from(event.to_sse_frame()));
            if terminal {
                break;
            }
        }
    }
}
