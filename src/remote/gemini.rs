use super::sse::SseLineParser;
use super::{ChatBackend, ChatSession, TextStream};
use crate::config::GeminiConfig;
use anyhow::{anyhow, Context, Result};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

impl GenerateContentResponse {
    /// Text carried by the first candidate, concatenated across parts
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    /// Why the model stopped, or why the prompt was refused outright
    pub fn stop_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
            .or_else(|| {
                self.candidates
                    .first()
                    .and_then(|c| c.finish_reason.as_deref())
            })
    }
}

fn decode_chunk(data: &str) -> Result<GenerateContentResponse> {
    let response: GenerateContentResponse =
        serde_json::from_str(data).context("Failed to parse stream chunk")?;
    if let Some(err) = response.error {
        return Err(anyhow!(
            "Gemini error {} ({}): {}",
            err.code,
            err.status,
            err.message
        ));
    }
    Ok(response)
}

/// Decode one SSE `data:` payload into a text increment
pub fn parse_chunk(data: &str) -> Result<String> {
    decode_chunk(data).map(|response| response.text())
}

// ============================================================================
// Backend / session
// ============================================================================

/// Gemini `streamGenerateContent` client
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        // No overall timeout: a reply streams for as long as the model talks.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Build from config, failing when the credential is missing
    pub fn from_config(cfg: &GeminiConfig) -> Result<Self> {
        let api_key = cfg.api_key()?;
        Self::new(&cfg.base_url, &cfg.model, api_key)
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

impl ChatBackend for GeminiBackend {
    fn create_session(&self, system_instruction: &str) -> Result<Box<dyn ChatSession>> {
        debug!("Creating Gemini chat session on {}", self.model);
        Ok(Box::new(GeminiSession {
            backend: self.clone(),
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
            contents: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

/// Stateful conversation; prior exchanges are resent with every message
pub struct GeminiSession {
    backend: GeminiBackend,
    system_instruction: Content,
    contents: Arc<Mutex<Vec<Content>>>,
}

#[async_trait::async_trait]
impl ChatSession for GeminiSession {
    async fn send_stream(&self, message: &str) -> Result<TextStream> {
        let user = Content::text("user", message);
        let mut contents = self.contents.lock().await.clone();
        contents.push(user.clone());

        let body = GenerateContentRequest {
            system_instruction: self.system_instruction.clone(),
            contents,
        };

        let response = self
            .backend
            .client
            .post(self.backend.stream_url())
            .header("x-goog-api-key", &self.backend.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini request failed: status={} body={}", status, body));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(anyhow::Error::from));

        Ok(Box::pin(reply_stream(
            bytes,
            user,
            Arc::clone(&self.contents),
        )))
    }
}

struct ReplyState {
    bytes: Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>,
    parser: SseLineParser,
    pending: VecDeque<Result<String>>,
    reply: String,
    stop_reason: Option<String>,
    user: Content,
    contents: Arc<Mutex<Vec<Content>>>,
    finished: bool,
}

/// Turn a raw SSE body into text increments
///
/// The exchange is committed to the session's contents only when the body
/// ends cleanly with some text. A body that ends without text because the
/// reply was blocked yields an error. After the first error the stream ends.
fn reply_stream(
    bytes: impl Stream<Item = Result<Vec<u8>>> + Send + 'static,
    user: Content,
    contents: Arc<Mutex<Vec<Content>>>,
) -> impl Stream<Item = Result<String>> + Send {
    let state = ReplyState {
        bytes: Box::pin(bytes),
        parser: SseLineParser::new(),
        pending: VecDeque::new(),
        reply: String::new(),
        stop_reason: None,
        user,
        contents,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in state.parser.push(&chunk) {
                        state.queue(&event.data);
                    }
                }
                Some(Err(e)) => {
                    warn!("Gemini stream interrupted: {}", e);
                    state.pending.push_back(Err(e));
                }
                None => {
                    if let Some(event) = state.parser.flush() {
                        state.queue(&event.data);
                    }
                    if state.pending.iter().all(|item| item.is_ok()) {
                        state.complete().await;
                    }
                    state.finished = true;
                }
            }
        }
    })
}

impl ReplyState {
    fn queue(&mut self, data: &str) {
        let response = match decode_chunk(data) {
            Ok(response) => response,
            Err(e) => {
                self.pending.push_back(Err(e));
                return;
            }
        };
        if let Some(reason) = response.stop_reason() {
            self.stop_reason = Some(reason.to_string());
        }
        let text = response.text();
        if !text.is_empty() {
            self.reply.push_str(&text);
            self.pending.push_back(Ok(text));
        }
    }

    /// Settle a cleanly ended body
    async fn complete(&mut self) {
        if !self.reply.is_empty() {
            self.commit().await;
            return;
        }
        // An empty model turn would poison every later request.
        match self.stop_reason.as_deref() {
            Some(reason) if reason != "STOP" => {
                warn!("Gemini reply blocked: {}", reason);
                self.pending
                    .push_back(Err(anyhow!("Gemini returned no reply ({})", reason)));
            }
            _ => debug!("Gemini returned an empty reply; session left unchanged"),
        }
    }

    async fn commit(&mut self) {
        let mut contents = self.contents.lock().await;
        contents.push(self.user.clone());
        contents.push(Content::text("model", std::mem::take(&mut self.reply)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_text_joins_parts() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        assert_eq!(parse_chunk(data).unwrap(), "Hello");
    }

    #[test]
    fn chunk_without_candidates_is_empty() {
        let data = r#"{"usageMetadata":{"promptTokenCount":3}}"#;
        assert_eq!(parse_chunk(data).unwrap(), "");
    }

    #[test]
    fn embedded_error_fails() {
        let data = r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#;
        let err = parse_chunk(data).unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn request_uses_camel_case() {
        let req = GenerateContentRequest {
            system_instruction: Content::text("user", "be nice"),
            contents: vec![Content::text("user", "hi")],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be nice");
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[tokio::test]
    async fn clean_end_commits_exchange() {
        let contents = Arc::new(Mutex::new(Vec::new()));
        let body: Vec<Result<Vec<u8>>> = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n".to_vec()),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" there\"}]}}]}\n\n".to_vec()),
        ];
        let items: Vec<String> = reply_stream(
            stream::iter(body),
            Content::text("user", "hello"),
            Arc::clone(&contents),
        )
        .map(|item| item.unwrap())
        .collect()
        .await;

        assert_eq!(items, vec!["Hi", " there"]);
        let contents = contents.lock().await;
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1], Content::text("model", "Hi there"));
    }

    #[tokio::test]
    async fn blocked_reply_fails_without_touching_session() {
        let contents = Arc::new(Mutex::new(Vec::new()));
        let body: Vec<Result<Vec<u8>>> =
            vec![Ok(b"data: {\"candidates\":[{\"finishReason\":\"SAFETY\"}]}\n\n".to_vec())];
        let items: Vec<Result<String>> = reply_stream(
            stream::iter(body),
            Content::text("user", "hello"),
            Arc::clone(&contents),
        )
        .collect()
        .await;

        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().to_string().contains("SAFETY"));
        assert!(contents.lock().await.is_empty());
    }

    #[tokio::test]
    async fn blocked_prompt_fails() {
        let contents = Arc::new(Mutex::new(Vec::new()));
        let body: Vec<Result<Vec<u8>>> = vec![Ok(
            b"data: {\"promptFeedback\":{\"blockReason\":\"PROHIBITED_CONTENT\"}}\n\n".to_vec(),
        )];
        let items: Vec<Result<String>> = reply_stream(
            stream::iter(body),
            Content::text("user", "hello"),
            Arc::clone(&contents),
        )
        .collect()
        .await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        assert!(contents.lock().await.is_empty());
    }

    #[tokio::test]
    async fn empty_reply_is_not_committed() {
        let contents = Arc::new(Mutex::new(Vec::new()));
        let body: Vec<Result<Vec<u8>>> =
            vec![Ok(b"data: {\"candidates\":[{\"finishReason\":\"STOP\"}]}\n\n".to_vec())];
        let items: Vec<Result<String>> = reply_stream(
            stream::iter(body),
            Content::text("user", "hello"),
            Arc::clone(&contents),
        )
        .collect()
        .await;

        assert!(items.is_empty());
        assert!(contents.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_session_unchanged() {
        let contents = Arc::new(Mutex::new(Vec::new()));
        let body: Vec<Result<Vec<u8>>> = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Sor\"}]}}]}\n\n".to_vec()),
            Err(anyhow!("connection reset")),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ry\"}]}}]}\n\n".to_vec()),
        ];
        let items: Vec<Result<String>> = reply_stream(
            stream::iter(body),
            Content::text("user", "hello"),
            Arc::clone(&contents),
        )
        .collect()
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Sor");
        assert!(items[1].is_err());
        assert!(contents.lock().await.is_empty());
    }
}
