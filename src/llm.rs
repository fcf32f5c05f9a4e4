use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AppError, CompletionError};

/// Completion fragments in arrival order. Finite and single-use.
pub type ChunkStream = ReceiverStream<Result<String, CompletionError>>;

const CHUNK_BUFFER: usize = 32;
const MAX_ERROR_DETAIL_CHARS: usize = 512;

/// One prompt: a fixed system instruction followed by the user's content.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub model: String,
    pub system_instruction: String,
    pub user_content: String,
    temperature: f32,
    repeat_penalty: f32,
}

impl CompletionRequest {
    /// Sampling is pinned (`temperature` 0, `repeat_penalty` 1) so structured replies stay parseable.
    pub fn new(model: &str, system_instruction: &str, user_content: String) -> Self {
        Self {
            model: model.to_string(),
            system_instruction: system_instruction.to_string(),
            user_content,
            temperature: 0.0,
            repeat_penalty: 1.0,
        }
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    repeat_penalty: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

impl<'a> ChatRequest<'a> {
    fn new(request: &'a CompletionRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: [
                Message {
                    role: "system",
                    content: &request.system_instruction,
                },
                Message {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            stream,
            options: ChatOptions {
                temperature: request.temperature,
                repeat_penalty: request.repeat_penalty,
            },
        }
    }
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatReply {
    message: Option<ReplyMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

impl ChatReply {
    fn into_content(self) -> Result<(String, bool), CompletionError> {
        if let Some(error) = self.error {
            return Err(CompletionError::BackendUnavailable(error));
        }
        let content = self.message.map(|m| m.content).unwrap_or_default();
        Ok((content, self.done))
    }
}

/// Adapter over an Ollama-compatible `/api/chat` endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    http: Client,
    chat_url: String,
}

impl CompletionClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build model client: {}", e)))?;

        Ok(Self {
            http,
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        })
    }

    /// Waits for the whole completion and returns it as one string.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let response = self.send(request, false).await?;
        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| CompletionError::Protocol(e.to_string()))?;

        let (content, _) = reply.into_content()?;
        if content.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }

        tracing::debug!(model = %request.model, chars = content.len(), "completion received");
        Ok(content)
    }

    /// Starts a streamed completion.
    ///
    /// Backend failures before the first byte are returned directly; later ones
    /// arrive as the final item of the stream. Dropping the stream stops the
    /// producer and releases the backend connection.
    pub async fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, CompletionError> {
        let response = self.send(request, true).await?;
        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);

        tokio::spawn(forward_chunks(response, tx, request.model.clone()));

        Ok(ReceiverStream::new(rx))
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, CompletionError> {
        tracing::debug!(
            model = %request.model,
            stream,
            user_chars = request.user_content.len(),
            "sending completion request"
        );

        let response = self
            .http
            .post(&self.chat_url)
            .json(&ChatRequest::new(request, stream))
            .send()
            .await
            .map_err(|e| CompletionError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.trim().chars().take(MAX_ERROR_DETAIL_CHARS).collect();
            return Err(CompletionError::BackendUnavailable(format!(
                "status {}: {}",
                status.as_u16(),
                detail
            )));
        }

        Ok(response)
    }
}

/// Outcome of handling one NDJSON line.
enum LineOutcome {
    Continue,
    Finished,
}

async fn forward_chunks(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<String, CompletionError>>,
    model: String,
) {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut produced = false;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!(%model, "stream consumer went away, stopping completion");
                return;
            }
            next = body.next() => next,
        };

        let Some(chunk) = next else { break };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx
                    .send(Err(CompletionError::BackendUnavailable(e.to_string())))
                    .await;
                return;
            }
        };
        buffer.extend_from_slice(&chunk);

        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            match forward_line(&line, &tx, &mut produced).await {
                Some(LineOutcome::Continue) => {}
                Some(LineOutcome::Finished) => return finish(&tx, produced).await,
                None => return,
            }
        }
    }

    // Last line may arrive without a trailing newline.
    if forward_line(&buffer, &tx, &mut produced).await.is_some() {
        finish(&tx, produced).await;
    }
}

/// Returns `None` when the stream must stop without further items.
async fn forward_line(
    line: &[u8],
    tx: &mpsc::Sender<Result<String, CompletionError>>,
    produced: &mut bool,
) -> Option<LineOutcome> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Some(LineOutcome::Continue);
    }

    let parsed = serde_json::from_slice::<ChatReply>(line)
        .map_err(|e| CompletionError::Protocol(e.to_string()))
        .and_then(ChatReply::into_content);

    match parsed {
        Ok((content, done)) => {
            if !content.is_empty() {
                *produced = true;
                if tx.send(Ok(content)).await.is_err() {
                    tracing::debug!("stream consumer went away, stopping completion");
                    return None;
                }
            }
            Some(if done {
                LineOutcome::Finished
            } else {
                LineOutcome::Continue
            })
        }
        Err(err) => {
            let _ = tx.send(Err(err)).await;
            None
        }
    }
}

async fn finish(tx: &mpsc::Sender<Result<String, CompletionError>>, produced: bool) {
    if !produced {
        let _ = tx.send(Err(CompletionError::EmptyResponse)).await;
    }
}
