use crate::ndjson::NdjsonParser;
use crate::InferenceClient;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use shared::agent_api::{ChatMessage, InferenceRequest, StreamChunk};
use shared::settings::ChatSettings;
use shared::{ChatError, ChatResult};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

/// Streaming response: each line is one of these JSON objects.
/// `/api/generate` fills `response`, `/api/chat` fills `message`.
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for OllamaMessage {
    fn from(m: &ChatMessage) -> Self {
        OllamaMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }
    }
}

/// Decoded meaning of one streamed line
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamLine {
    Token(String),
    /// Token (possibly empty) carried by the final fragment
    Done(String),
    Failed(String),
}

pub(crate) fn parse_stream_line(line: &str) -> ChatResult<StreamLine> {
    let chunk: OllamaStreamChunk = serde_json::from_str(line)
        .map_err(|e| ChatError::MalformedStreamFragment(format!("{}: {}", e, line)))?;

    if let Some(err) = chunk.error {
        return Ok(StreamLine::Failed(err));
    }

    let token = chunk
        .response
        .or_else(|| chunk.message.map(|m| m.content))
        .unwrap_or_default();

    if chunk.done {
        Ok(StreamLine::Done(token))
    } else {
        Ok(StreamLine::Token(token))
    }
}

pub struct OllamaClient {
    http: Client,
    base: String,
    model: String,
}

impl OllamaClient {
    pub fn new(settings: &ChatSettings) -> ChatResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| ChatError::InferenceUnavailable(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, request: &InferenceRequest, stream: bool) -> ChatResult<Response> {
        let builder = match request {
            InferenceRequest::Prompt(prompt) => {
                let url = format!("{}/api/generate", self.base);
                let req = OllamaGenerateRequest {
                    model: &self.model,
                    prompt,
                    stream,
                };
                self.http.post(url).json(&req)
            }
            InferenceRequest::Chat(messages) => {
                let url = format!("{}/api/chat", self.base);
                let req = OllamaChatRequest {
                    model: &self.model,
                    messages: messages.iter().map(OllamaMessage::from).collect(),
                    stream,
                };
                self.http.post(url).json(&req)
            }
        };

        tracing::debug!(model = %self.model, stream, "sending ollama request");

        let resp = builder
            .send()
            .await
            .map_err(|e| ChatError::InferenceUnavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::InferenceUnavailable(format!(
                "ollama error: {} {}",
                status,
                body.trim()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(&self, request: &InferenceRequest) -> ChatResult<String> {
        let resp = self.post(request, false).await?;
        let decode_err = |e: reqwest::Error| ChatError::InferenceUnavailable(e.to_string());
        match request {
            InferenceRequest::Prompt(_) => {
                let body: OllamaGenerateResponse = resp.json().await.map_err(decode_err)?;
                Ok(body.response)
            }
            InferenceRequest::Chat(_) => {
                let body: OllamaChatResponse = resp.json().await.map_err(decode_err)?;
                Ok(body.message.content)
            }
        }
    }

    async fn generate_stream(
        &self,
        request: &InferenceRequest,
        tx: UnboundedSender<StreamChunk>,
    ) -> ChatResult<()> {
        let fail = |tx: &UnboundedSender<StreamChunk>, message: String| -> ChatResult<()> {
            let _ = tx.send(StreamChunk::Error(message.clone()));
            Err(ChatError::InferenceUnavailable(message))
        };

        let resp = match self.post(request, true).await {
            Ok(resp) => resp,
            Err(ChatError::InferenceUnavailable(message)) => return fail(&tx, message),
            Err(e) => return Err(e),
        };

        // Ollama streams line-delimited JSON
        let mut stream = resp.bytes_stream();
        let mut parser = NdjsonParser::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return fail(&tx, format!("stream read error: {}", e)),
            };

            for line in parser.feed(&bytes) {
                match parse_stream_line(&line) {
                    Ok(StreamLine::Token(token)) => {
                        if !token.is_empty() {
                            let _ = tx.send(StreamChunk::Text(token));
                        }
                    }
                    Ok(StreamLine::Done(token)) => {
                        if !token.is_empty() {
                            let _ = tx.send(StreamChunk::Text(token));
                        }
                        let _ = tx.send(StreamChunk::Done);
                        return Ok(());
                    }
                    Ok(StreamLine::Failed(message)) => return fail(&tx, message),
                    Err(e) => {
                        tracing::warn!("skipping stream fragment: {}", e);
                    }
                }
            }
        }

        // A final line without a trailing newline may still carry `done`
        if let Some(line) = parser.finish() {
            match parse_stream_line(&line) {
                Ok(StreamLine::Done(token)) => {
                    if !token.is_empty() {
                        let _ = tx.send(StreamChunk::Text(token));
                    }
                    let _ = tx.send(StreamChunk::Done);
                    return Ok(());
                }
                Ok(StreamLine::Token(token)) => {
                    if !token.is_empty() {
                        let _ = tx.send(StreamChunk::Text(token));
                    }
                }
                Ok(StreamLine::Failed(message)) => return fail(&tx, message),
                Err(e) => tracing::warn!("skipping stream fragment: {}", e),
            }
        }

        fail(&tx, "stream ended before done".to_string())
    }
}
