//! SSE response -> [`FragmentStream`] adapter.

use eventsource_stream::Eventsource;
use futures_util::{future, StreamExt};
use reqwest::Response;

use super::openai_compat::SseStep;
use crate::provider::{FragmentStream, LLMError};

/// Convert an SSE HTTP [`Response`] into a [`FragmentStream`].
///
/// `handler` sees the data payload of each event. The stream ends at the first
/// [`SseStep::Stop`] or when the body ends; transport failures are yielded as
/// [`LLMError::Stream`].
pub fn fragment_stream_from_sse<H>(response: Response, mut handler: H) -> FragmentStream
where
    H: FnMut(&str) -> SseStep + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| match event {
            Ok(event) => Ok(handler(event.data.as_str())),
            Err(e) => Err(LLMError::Stream(e.to_string())),
        })
        .take_while(|step| future::ready(!matches!(step, Ok(SseStep::Stop))))
        .filter_map(|step| async move {
            match step {
                Ok(SseStep::Emit(chunk)) => Some(Ok(chunk)),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            }
        });

    Box::pin(stream)
}
