//! Builds the visible reply from raw model output.
//!
//! Streaming replies go through [`think_filter`](crate::think_filter) token by
//! token; complete replies are cleaned in one regex pass.

use crate::think_filter::{self, MaskingState};
use regex::Regex;
use shared::agent_api::StreamChunk;
use shared::{ChatError, ChatResult};
use std::sync::LazyLock;
use tokio::sync::mpsc::UnboundedReceiver;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think regex"));

/// Receives progress while a reply is streamed in
pub trait StreamObserver {
    /// Called after every token with the whole visible text so far
    fn on_partial(&mut self, _text: &str, _thinking: bool) {}

    /// The model started reasoning; show a "thinking…" indicator
    fn on_thinking_started(&mut self) {}

    /// Reasoning is over; hide the indicator
    fn on_thinking_finished(&mut self) {}
}

/// Observer for callers that only want the final text
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

/// Accumulates one streamed reply
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    state: MaskingState,
    buffer: String,
    indicator_shown: bool,
    indicator_on: bool,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw token
    pub fn push(&mut self, token: &str, observer: &mut dyn StreamObserver) {
        let was_thinking = self.state.in_think;
        let (visible, next) = think_filter::filter(token, &self.state);
        self.state = next;

        // The indicator is raised once per reply, on the first masked region
        if !was_thinking && self.state.in_think && !self.indicator_shown {
            self.indicator_shown = true;
            self.indicator_on = true;
            observer.on_thinking_started();
        }
        if was_thinking && !self.state.in_think {
            self.lower_indicator(observer);
        }

        self.buffer.push_str(&visible);
        observer.on_partial(&self.buffer, self.state.in_think);
    }

    fn lower_indicator(&mut self, observer: &mut dyn StreamObserver) {
        if self.indicator_on {
            self.indicator_on = false;
            observer.on_thinking_finished();
        }
    }

    /// Flush held-back text and return the trimmed reply
    pub fn finish(mut self, observer: &mut dyn StreamObserver) -> String {
        let tail = think_filter::finish(&self.state);
        if !tail.is_empty() {
            self.buffer.push_str(&tail);
            observer.on_partial(&self.buffer, false);
        }
        self.lower_indicator(observer);
        self.buffer.trim().to_string()
    }

    /// Give up on the reply; only the indicator is cleaned up
    pub fn abort(mut self, observer: &mut dyn StreamObserver) {
        self.lower_indicator(observer);
    }
}

/// Drain a streamed reply. Fails with `InferenceUnavailable` if the stream
/// reports an error or closes before `Done`; the partial text is discarded.
pub async fn assemble_streaming(
    rx: &mut UnboundedReceiver<StreamChunk>,
    observer: &mut dyn StreamObserver,
) -> ChatResult<String> {
    let mut assembler = ResponseAssembler::new();

    while let Some(chunk) = rx.recv().await {
        match chunk {
            StreamChunk::Text(token) => assembler.push(&token, observer),
            StreamChunk::Done => return Ok(assembler.finish(observer)),
            StreamChunk::Error(message) => {
                assembler.abort(observer);
                return Err(ChatError::InferenceUnavailable(message));
            }
        }
    }

    assembler.abort(observer);
    Err(ChatError::InferenceUnavailable(
        "stream ended before the reply was complete".to_string(),
    ))
}

/// Strip every reasoning block from a complete reply and trim it.
/// A block that is never closed hides the rest of the reply, as it does
/// when streamed.
pub fn assemble_once(full_text: &str) -> String {
    let mut text = THINK_BLOCK.replace_all(full_text, "").into_owned();
    if let Some(open) = text.find(think_filter::THINK_OPEN) {
        text.truncate(open);
    }
    text.trim().to_string()
}
