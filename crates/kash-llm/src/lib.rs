// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash-llm
//!
//! Uniform LLM call surface.
//!
//! The engine consumes LLM providers only through the [`CompletionBackend`]
//! contract. [`llm_completion`] wraps a call with retry (rate-limit aware),
//! rejects empty results, and surfaces citations;
//! [`llm_template_completion`] fills a [`MessageTemplate`] and normalizes
//! no-result sentinels.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use kash_error::{KashError, Result};
use kash_gather::{gather_limited, GatherOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who is speaking.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Message {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A user-message template with a `{body}` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate(pub String);

impl MessageTemplate {
    /// Fill the template's `{body}` slot.
    #[must_use]
    pub fn fill(&self, body: &str) -> String {
        self.0.replace("{body}", body)
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self("{body}".to_string())
    }
}

// ---------------------------------------------------------------------------
// Provider contract
// ---------------------------------------------------------------------------

/// A completion request as the provider sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model name, in the provider's naming scheme.
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<Message>,
    /// Structured-output format specification, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    /// Tools available for function calling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
    /// Ask the provider to enable web search, when supported.
    #[serde(default)]
    pub enable_web_search: bool,
}

impl CompletionRequest {
    /// Build a plain request.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            response_format: None,
            tools: Vec::new(),
            enable_web_search: false,
        }
    }
}

/// A provider's raw response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The assistant message content.
    pub content: String,
    /// Citations, when the provider returns them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
    /// Tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<serde_json::Value>,
}

/// The contract an LLM provider implements.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Perform one completion call.
    ///
    /// # Errors
    ///
    /// Any provider error; rate-limit errors should carry a recognizable
    /// message (or a `RetryAfterError`) so the retry layer classifies them.
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse>;
}

// ---------------------------------------------------------------------------
// Citations
// ---------------------------------------------------------------------------

/// An ordered list of citations from a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationList {
    /// The citations, in reference order.
    pub citations: Vec<String>,
}

impl CitationList {
    /// Render as Markdown footnote definitions (`[^1]: ...`).
    #[must_use]
    pub fn as_markdown_footnotes(&self) -> String {
        self.citations
            .iter()
            .enumerate()
            .map(|(i, citation)| format!("[^{}]: {citation}", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The citations that are URLs.
    #[must_use]
    pub fn url_citations(&self) -> Vec<&str> {
        self.citations
            .iter()
            .filter(|c| c.starts_with("http://") || c.starts_with("https://"))
            .map(String::as_str)
            .collect()
    }

    /// The citations that are not URLs.
    #[must_use]
    pub fn non_url_citations(&self) -> Vec<&str> {
        self.citations
            .iter()
            .filter(|c| !c.starts_with("http://") && !c.starts_with("https://"))
            .map(String::as_str)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A validated completion result.
#[derive(Debug, Clone)]
pub struct LLMCompletionResult {
    /// The assistant's text content.
    pub content: String,
    /// Citations, when present.
    pub citations: Option<CitationList>,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<serde_json::Value>,
}

impl LLMCompletionResult {
    /// Content with Markdown footnote references appended for citations.
    #[must_use]
    pub fn content_with_citations(&self) -> String {
        match &self.citations {
            Some(citations) if !citations.citations.is_empty() => {
                format!("{}\n\n{}", self.content, citations.as_markdown_footnotes())
            }
            _ => self.content.clone(),
        }
    }

    /// Whether the model requested any tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The no-result sentinel models are asked to reply with.
const NO_RESULTS_SENTINEL: &str = "(no results)";

/// Whether a response is the no-result sentinel (case-insensitive,
/// surrounding whitespace ignored).
#[must_use]
pub fn is_no_results(content: &str) -> bool {
    content.trim().to_lowercase() == NO_RESULTS_SENTINEL
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// Perform an LLM completion with retry and validation.
///
/// # Errors
///
/// Returns [`KashError::ApiResultError`] for empty content or provider
/// failures (after retries).
pub async fn llm_completion(
    backend: Arc<dyn CompletionBackend>,
    request: CompletionRequest,
    options: &GatherOptions,
) -> Result<LLMCompletionResult> {
    debug!(
        target: "kash.llm",
        model = %request.model,
        messages = request.messages.len(),
        tools = request.tools.len(),
        "calling LLM completion"
    );

    let request = Arc::new(request);
    let spec = {
        let backend = Arc::clone(&backend);
        let request = Arc::clone(&request);
        move || {
            let backend = Arc::clone(&backend);
            let request = Arc::clone(&request);
            async move { backend.complete(&request).await }
        }
    };

    let response = gather_limited(vec![spec], options)
        .await
        .into_iter()
        .next()
        .unwrap_or_else(|| Err(anyhow::anyhow!("no completion attempted")))
        .map_err(|e| KashError::ApiResultError(format!("LLM completion failed: {e:#}")))?;

    if response.content.trim().is_empty() {
        return Err(KashError::ApiResultError(format!(
            "LLM completion returned empty content: {}",
            request.model
        )));
    }

    let citations = (!response.citations.is_empty()).then(|| CitationList {
        citations: response.citations.clone(),
    });

    if !response.tool_calls.is_empty() {
        info!(
            target: "kash.llm",
            model = %request.model,
            tool_calls = response.tool_calls.len(),
            "model requested tool calls"
        );
    }

    Ok(LLMCompletionResult {
        content: response.content,
        citations,
        tool_calls: response.tool_calls,
    })
}

/// Fill a [`MessageTemplate`] with the input as `{body}` and complete.
///
/// With `check_no_results`, a response matching the no-result sentinel is
/// normalized to empty content.
///
/// # Errors
///
/// Propagates [`llm_completion`] errors.
#[allow(clippy::too_many_arguments)]
pub async fn llm_template_completion(
    backend: Arc<dyn CompletionBackend>,
    model: &str,
    system_message: &str,
    input: &str,
    body_template: Option<&MessageTemplate>,
    check_no_results: bool,
    options: &GatherOptions,
) -> Result<LLMCompletionResult> {
    if system_message.is_empty() {
        return Err(KashError::InvalidInput(
            "system_message is required".into(),
        ));
    }
    let template = body_template.cloned().unwrap_or_default();
    let user_message = template.fill(input);

    let request = CompletionRequest::new(
        model,
        vec![Message::system(system_message), Message::user(user_message)],
    );
    let mut result = llm_completion(backend, request, options).await?;

    if check_no_results && is_no_results(&result.content) {
        info!(target: "kash.llm", "no results for LLM transform, ignoring output");
        result.content = String::new();
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        responses: Vec<anyhow::Result<CompletionResponse>>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn new(responses: Vec<anyhow::Result<CompletionResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses,
                calls: AtomicUsize::new(0),
            })
        }

        fn once(content: &str) -> Arc<Self> {
            Self::new(vec![Ok(CompletionResponse {
                content: content.into(),
                ..Default::default()
            })])
        }
    }

    #[async_trait]
    impl CompletionBackend for StubBackend {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> anyhow::Result<CompletionResponse> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(i) {
                Some(Ok(r)) => Ok(r.clone()),
                Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
                None => Ok(CompletionResponse {
                    content: "fallback".into(),
                    ..Default::default()
                }),
            }
        }
    }

    fn fast_options() -> GatherOptions {
        let mut options = GatherOptions::no_retries();
        options.max_rps = 1000.0;
        options
    }

    fn retry_options() -> GatherOptions {
        let mut options = GatherOptions::default();
        options.max_rps = 1000.0;
        options.retry.max_task_retries = 2;
        options.retry.initial_backoff = std::time::Duration::from_millis(5);
        options.retry.max_backoff = std::time::Duration::from_millis(20);
        options
    }

    #[tokio::test]
    async fn returns_content_on_success() {
        let backend = StubBackend::once("hello");
        let request = CompletionRequest::new("test-model", vec![Message::user("hi")]);
        let result = llm_completion(backend, request, &fast_options()).await.unwrap();
        assert_eq!(result.content, "hello");
        assert!(result.citations.is_none());
        assert!(!result.has_tool_calls());
    }

    #[tokio::test]
    async fn empty_content_is_api_result_error() {
        let backend = StubBackend::once("   ");
        let request = CompletionRequest::new("test-model", vec![Message::user("hi")]);
        let err = llm_completion(backend, request, &fast_options()).await.unwrap_err();
        assert!(matches!(err, KashError::ApiResultError(_)));
    }

    #[tokio::test]
    async fn rate_limit_errors_are_retried() {
        let backend = StubBackend::new(vec![
            Err(anyhow::anyhow!("429 too many requests")),
            Ok(CompletionResponse {
                content: "after retry".into(),
                ..Default::default()
            }),
        ]);
        let request = CompletionRequest::new("test-model", vec![Message::user("hi")]);
        let result = llm_completion(backend.clone(), request, &retry_options())
            .await
            .unwrap();
        assert_eq!(result.content, "after retry");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn citations_render_as_footnotes() {
        let backend = StubBackend::new(vec![Ok(CompletionResponse {
            content: "answer".into(),
            citations: vec![
                "https://example.com/a".into(),
                "Some book, p. 12".into(),
            ],
            ..Default::default()
        })]);
        let request = CompletionRequest::new("test-model", vec![Message::user("hi")]);
        let result = llm_completion(backend, request, &fast_options()).await.unwrap();

        let citations = result.citations.as_ref().unwrap();
        assert_eq!(citations.url_citations(), ["https://example.com/a"]);
        assert_eq!(citations.non_url_citations(), ["Some book, p. 12"]);

        let with = result.content_with_citations();
        assert!(with.starts_with("answer\n\n"));
        assert!(with.contains("[^1]: https://example.com/a"));
        assert!(with.contains("[^2]: Some book, p. 12"));
    }

    #[tokio::test]
    async fn template_completion_fills_body() {
        let backend = StubBackend::once("filled");
        let result = llm_template_completion(
            backend,
            "test-model",
            "You are a test.",
            "INPUT",
            Some(&MessageTemplate("Process this: {body}".into())),
            true,
            &fast_options(),
        )
        .await
        .unwrap();
        assert_eq!(result.content, "filled");
    }

    #[tokio::test]
    async fn template_completion_requires_system_message() {
        let backend = StubBackend::once("x");
        let err = llm_template_completion(
            backend,
            "m",
            "",
            "i",
            None,
            false,
            &fast_options(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KashError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn no_results_sentinel_is_normalized() {
        let backend = StubBackend::once("  (No Results)  ");
        let result = llm_template_completion(
            backend,
            "m",
            "sys",
            "input",
            None,
            true,
            &fast_options(),
        )
        .await
        .unwrap();
        assert_eq!(result.content, "");
    }

    #[test]
    fn no_results_detection() {
        assert!(is_no_results("(no results)"));
        assert!(is_no_results("  (NO RESULTS) "));
        assert!(!is_no_results("results: none"));
        assert!(!is_no_results(""));
    }
}
