//! OpenAI-compatible chat completions client.
//!
//! Talks to any provider exposing `POST {base_url}/chat/completions` (Groq by
//! default). Streaming uses server-sent events: `data: {json}` lines carrying
//! `choices[0].delta.content`, terminated by `data: [DONE]`.

use crate::config::BackendSection;
use crate::errors::BackendError;
use crate::llm::{ChatMessage, CompletionBackend, CompletionRequest, DeltaSink};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// One decoded server-sent-events line.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    /// Text to append to the completion
    Delta(String),
    /// End of stream marker
    Done,
    /// Comments, keep-alives, role-only chunks
    Ignore,
}

/// Decode a single SSE line from a chat completions stream.
pub fn parse_sse_line(line: &str) -> Result<SseLine, BackendError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Ignore);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Ignore);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| BackendError::MalformedResponse(format!("invalid stream chunk: {}", e)))?;

    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
    {
        Some(content) if !content.is_empty() => Ok(SseLine::Delta(content)),
        _ => Ok(SseLine::Ignore),
    }
}

/// Incremental decoder for a chat-completion event stream.
///
/// Chunks may split lines anywhere. A last line without a trailing newline is
/// decoded by [`finish`](Self::finish) once the stream closes.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Feed one chunk and return the deltas of every complete line in it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, BackendError> {
        self.buffer.extend_from_slice(chunk);
        let mut deltas = Vec::new();
        while !self.done {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&String::from_utf8_lossy(&line), &mut deltas)?;
        }
        Ok(deltas)
    }

    /// Decode whatever is left in the buffer after the stream closed.
    pub fn finish(&mut self) -> Result<Vec<String>, BackendError> {
        let rest = std::mem::take(&mut self.buffer);
        let mut deltas = Vec::new();
        if !self.done && !rest.is_empty() {
            self.decode_line(&String::from_utf8_lossy(&rest), &mut deltas)?;
        }
        Ok(deltas)
    }

    /// Whether `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &str, deltas: &mut Vec<String>) -> Result<(), BackendError> {
        match parse_sse_line(line)? {
            SseLine::Delta(text) => deltas.push(text),
            SseLine::Done => self.done = true,
            SseLine::Ignore => {}
        }
        Ok(())
    }
}

/// HTTP backend for OpenAI-compatible providers.
pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build from the `[backend]` config section, reading the key from its env var.
    pub fn from_settings(settings: &BackendSection) -> Result<Self, BackendError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| BackendError::MissingApiKey {
                var: settings.api_key_env.clone(),
            })?;

        Self::new(
            &settings.base_url,
            &api_key,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let body = ChatCompletionRequest {
            model: &request.params.model,
            messages: request.to_messages(),
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            stream,
        };

        debug!(
            model = %request.params.model,
            stream,
            messages = body.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let response = self.send(request, false).await?;
        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::MalformedResponse("response has no choices".to_string()))
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        on_delta: DeltaSink<'_>,
    ) -> Result<String, BackendError> {
        let response = self.send(request, true).await?;
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            for delta in decoder.feed(&chunk?)? {
                on_delta(&delta);
                accumulated.push_str(&delta);
            }
            if decoder.is_done() {
                break;
            }
        }
        for delta in decoder.finish()? {
            on_delta(&delta);
            accumulated.push_str(&delta);
        }

        Ok(accumulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Delta("Hel".to_string()));
    }

    #[test]
    fn test_parse_sse_done() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
    }

    #[test]
    fn test_parse_sse_ignores_role_only_chunk_and_comments() {
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only).unwrap(), SseLine::Ignore);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Ignore);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Ignore);
    }

    #[test]
    fn test_parse_sse_malformed_chunk() {
        let err = parse_sse_line("data: {not json").unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[test]
    fn test_decoder_joins_lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder
            .feed(br#"data: {"choices":[{"delta":{"con"#)
            .unwrap()
            .is_empty());
        let deltas = decoder
            .feed(b"tent\":\"Hi\"}}]}\n\ndata: [DONE]\n")
            .unwrap();
        assert_eq!(deltas, vec!["Hi"]);
        assert!(decoder.is_done());
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn test_decoder_keeps_last_line_without_newline() {
        let mut decoder = SseDecoder::default();
        let first = decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n")
            .unwrap();
        let pending = decoder
            .feed(br#"data: {"choices":[{"delta":{"content":"lo"}}]}"#)
            .unwrap();
        assert_eq!(first, vec!["Hel"]);
        assert!(pending.is_empty());

        assert_eq!(decoder.finish().unwrap(), vec!["lo"]);
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_decoder_ignores_lines_after_done() {
        let mut decoder = SseDecoder::default();
        let deltas = decoder
            .feed(b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}")
            .unwrap();
        assert!(deltas.is_empty());
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatCompletionRequest {
            model: "llama3-70b-8192",
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            temperature: 0.7,
            max_tokens: 256,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama3-70b-8192");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let backend =
            OpenAiCompatibleBackend::new("https://api.groq.com/openai/v1/", "k", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            backend.endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_from_settings_requires_api_key() {
        let settings = BackendSection {
            api_key_env: "AGENT_CREW_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..BackendSection::default()
        };
        let err = OpenAiCompatibleBackend::from_settings(&settings).err().unwrap();
        assert!(matches!(err, BackendError::MissingApiKey { .. }));
    }
}
