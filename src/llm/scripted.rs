//! Deterministic backend driven by rules.
//!
//! Rules match on the user input or the system prompt and yield scripted replies
//! in order (the last reply repeats). Every request is recorded so callers can
//! assert which tasks reached the backend. Used by the test suite and by
//! `agent-crew run --dry-run`.

use crate::errors::BackendError;
use crate::llm::{CompletionBackend, CompletionRequest, DeltaSink};
use async_trait::async_trait;
use std::sync::Mutex;

/// A single scripted response.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    /// Full text; streamed word by word
    Text(String),
    /// Text streamed as exactly these chunks
    Chunks(Vec<String>),
    /// Backend failure before any output
    Error(String),
    /// Streams the chunks, then fails mid-stream
    BreakAfter(Vec<String>, String),
    /// Echoes the first line of the user input
    Echo,
}

impl ScriptedReply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self::Chunks(chunks.iter().map(|c| c.to_string()).collect())
    }

    pub fn error(message: &str) -> Self {
        Self::Error(message.to_string())
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    InputContains(String),
    SystemContains(String),
}

impl Matcher {
    fn matches(&self, request: &CompletionRequest) -> bool {
        match self {
            Matcher::InputContains(needle) => request.user_input.contains(needle.as_str()),
            Matcher::SystemContains(needle) => request.system_prompt.contains(needle.as_str()),
        }
    }
}

#[derive(Debug)]
struct Rule {
    matcher: Matcher,
    replies: Vec<ScriptedReply>,
    /// Number of times this rule has fired
    hits: usize,
}

#[derive(Debug)]
struct ScriptState {
    rules: Vec<Rule>,
    calls: Vec<CompletionRequest>,
}

/// A rule-based [`CompletionBackend`].
#[derive(Debug)]
pub struct ScriptedBackend {
    state: Mutex<ScriptState>,
    fallback: ScriptedReply,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// A backend that echoes every input until rules are added.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                rules: Vec::new(),
                calls: Vec::new(),
            }),
            fallback: ScriptedReply::Echo,
        }
    }

    /// Reply used when no rule matches.
    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Reply when the user input contains `needle`. Rules are checked in the order added.
    pub fn when_input_contains(self, needle: &str, reply: ScriptedReply) -> Self {
        self.with_rule(Matcher::InputContains(needle.to_string()), vec![reply])
    }

    /// Reply when the system prompt contains `needle`.
    pub fn when_system_contains(self, needle: &str, reply: ScriptedReply) -> Self {
        self.with_rule(Matcher::SystemContains(needle.to_string()), vec![reply])
    }

    /// Successive replies for inputs containing `needle`; the last one repeats.
    pub fn when_input_contains_sequence(self, needle: &str, replies: Vec<ScriptedReply>) -> Self {
        self.with_rule(Matcher::InputContains(needle.to_string()), replies)
    }

    fn with_rule(self, matcher: Matcher, replies: Vec<ScriptedReply>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.rules.push(Rule {
                matcher,
                replies,
                hits: 0,
            });
        }
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().map(|state| state.calls.len()).unwrap_or(0)
    }

    /// Number of requests whose user input contains `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.user_input.contains(needle))
            .count()
    }

    fn next_reply(&self, request: &CompletionRequest) -> ScriptedReply {
        let Ok(mut state) = self.state.lock() else {
            return ScriptedReply::error("scripted backend state poisoned");
        };
        state.calls.push(request.clone());

        for rule in state.rules.iter_mut() {
            if rule.matcher.matches(request) {
                let index = rule.hits.min(rule.replies.len().saturating_sub(1));
                rule.hits += 1;
                if let Some(reply) = rule.replies.get(index) {
                    return reply.clone();
                }
            }
        }
        self.fallback.clone()
    }
}

fn echo(request: &CompletionRequest) -> String {
    let first_line = request.user_input.lines().next().unwrap_or_default();
    format!("Scripted reply to: {}", first_line)
}

/// Split text into word chunks, keeping the separating spaces.
fn word_chunks(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        match self.next_reply(request) {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Chunks(chunks) => Ok(chunks.concat()),
            ScriptedReply::Error(message) | ScriptedReply::BreakAfter(_, message) => {
                Err(BackendError::Scripted(message))
            }
            ScriptedReply::Echo => Ok(echo(request)),
        }
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        on_delta: DeltaSink<'_>,
    ) -> Result<String, BackendError> {
        let (chunks, failure) = match self.next_reply(request) {
            ScriptedReply::Text(text) => (word_chunks(&text), None),
            ScriptedReply::Chunks(chunks) => (chunks, None),
            ScriptedReply::Error(message) => return Err(BackendError::Scripted(message)),
            ScriptedReply::BreakAfter(chunks, message) => (chunks, Some(message)),
            ScriptedReply::Echo => (word_chunks(&echo(request)), None),
        };

        let mut accumulated = String::new();
        for chunk in &chunks {
            on_delta(chunk);
            accumulated.push_str(chunk);
            tokio::task::yield_now().await;
        }

        match failure {
            Some(message) => Err(BackendError::Scripted(message)),
            None => Ok(accumulated),
        }
    }
}
