//! Page-range classification: ask an LLM which pages hold the summons.
//!
//! * [`ClassifierBackend`] sends a system + user message pair and returns the
//!   raw reply. [`LlmBackend`] covers every provider via `edgequake-llm`;
//!   tests plug in canned backends.
//! * [`RangeClassifier`] owns provider dispatch, prompt construction, retry
//!   of transport failures and the response parser.
//!
//! The parser is the single place where the model's one-based page numbers
//! become zero-based [`PageRange`]s.
//!
//! ## Retry Strategy
//!
//! Transport failures (HTTP 429/5xx, connection reset, timeout) are retried
//! with exponential backoff (`retry_backoff_ms * 2^(retry - 1)`). If they persist
//! the job fails: the classification step never ran. A malformed reply is
//! not retried; the pipeline treats it as "nothing found in this chunk" and
//! keeps scanning.

use crate::config::{ExtractionConfig, Provider};
use crate::error::{ClassifierError, SummonsError};
use crate::job::{PageRange, PageRecord};
use crate::prompts::{classification_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// A text-completion endpoint for one provider.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Send a system + user message pair and return the raw reply text.
    ///
    /// Implementations must report every failure to obtain a reply as
    /// [`ClassifierError::Transport`].
    async fn complete(&self, system: &str, user: &str) -> Result<String, ClassifierError>;
}

/// [`ClassifierBackend`] backed by an `edgequake-llm` provider.
pub struct LlmBackend {
    provider: Provider,
    llm: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    call_timeout: Duration,
}

impl LlmBackend {
    /// Wrap an already-constructed LLM provider.
    pub fn new(provider: Provider, llm: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            llm,
            options: build_options(config),
            call_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Instantiate the provider named by `provider` with its configured model.
    ///
    /// Fails when the provider's credentials are not present in the
    /// environment.
    pub fn from_config(provider: Provider, config: &ExtractionConfig) -> Result<Self, SummonsError> {
        let model = config.model_for(provider);
        let llm = ProviderFactory::create_llm_provider(provider.as_str(), model).map_err(|e| {
            SummonsError::ProviderNotConfigured {
                provider: provider.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, llm, config))
    }
}

#[async_trait]
impl ClassifierBackend for LlmBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ClassifierError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

        match timeout(self.call_timeout, self.llm.chat(&messages, Some(&self.options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    self.provider, response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
            Ok(Err(e)) => Err(ClassifierError::Transport {
                provider: self.provider.to_string(),
                detail: format!("{}", e),
            }),
            Err(_) => Err(ClassifierError::Transport {
                provider: self.provider.to_string(),
                detail: format!("timed out after {}s", self.call_timeout.as_secs()),
            }),
        }
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Dispatches classification requests to the backend of the job's provider.
#[derive(Clone)]
pub struct RangeClassifier {
    backends: HashMap<Provider, Arc<dyn ClassifierBackend>>,
    system_prompt: String,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl RangeClassifier {
    /// A classifier with no backends registered yet.
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            backends: HashMap::new(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Register every provider whose credentials are available.
    ///
    /// Providers that cannot be constructed are skipped with a warning; the
    /// dispatcher rejects submissions for them.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let mut classifier = Self::new(config);
        for provider in Provider::ALL {
            match LlmBackend::from_config(provider, config) {
                Ok(backend) => {
                    info!(
                        "Classifier backend ready: {} ({})",
                        provider,
                        config.model_for(provider)
                    );
                    classifier = classifier.with_backend(provider, Arc::new(backend));
                }
                Err(e) => warn!("Classifier backend {} unavailable: {}", provider, e),
            }
        }
        classifier
    }

    /// Register (or replace) the backend for `provider`.
    pub fn with_backend(mut self, provider: Provider, backend: Arc<dyn ClassifierBackend>) -> Self {
        self.backends.insert(provider, backend);
        self
    }

    pub fn supports(&self, provider: Provider) -> bool {
        self.backends.contains_key(&provider)
    }

    /// Ask `provider` for the summons range within `pages`.
    ///
    /// `Ok(None)` means the backend looked and found nothing.
    pub async fn classify(
        &self,
        provider: Provider,
        pages: &[PageRecord],
    ) -> Result<Option<PageRange>, ClassifierError> {
        let backend =
            self.backends
                .get(&provider)
                .ok_or_else(|| ClassifierError::UnsupportedProvider {
                    provider: provider.to_string(),
                })?;

        let Some(last_page_index) = pages.iter().map(|p| p.page_index).max() else {
            return Ok(None);
        };

        let prompt = classification_prompt(pages);
        let raw = self.complete_with_retry(backend.as_ref(), &prompt).await?;
        debug!("{} classifier reply: {}", provider, raw.trim());

        parse_range_response(&raw, last_page_index)
    }

    async fn complete_with_retry(
        &self,
        backend: &dyn ClassifierBackend,
        prompt: &str,
    ) -> Result<String, ClassifierError> {
        let mut retries = 0u32;
        loop {
            match backend.complete(&self.system_prompt, prompt).await {
                Ok(raw) => return Ok(raw),
                Err(e @ ClassifierError::Transport { .. }) if retries < self.max_retries => {
                    retries += 1;
                    let delay = self.retry_delay(retries);
                    warn!(
                        "Classifier call {} of {} failed, retrying in {}ms: {}",
                        retries,
                        self.max_retries + 1,
                        delay.as_millis(),
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait before the `retry`-th retry (1-based): `retry_backoff_ms * 2^(retry - 1)`.
    fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Parse the model's reply into a zero-based range.
///
/// Only the text between the first `{` and the last `}` is considered, so
/// prose or code fences around the JSON are tolerated. Accepted keys are
/// `start_page`/`end_page` (or `start`/`end`). A lone start page means a
/// single-page summons. Both keys null or absent means "not found".
///
/// `last_page_index` is the highest zero-based page the model was shown; a
/// range reaching past it is rejected as malformed.
pub fn parse_range_response(
    raw: &str,
    last_page_index: usize,
) -> Result<Option<PageRange>, ClassifierError> {
    let malformed = |detail: String| ClassifierError::MalformedResponse { detail };

    let (Some(open), Some(close)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(malformed("no JSON object in reply".into()));
    };
    if close < open {
        return Err(malformed("no JSON object in reply".into()));
    }

    let value: Value = serde_json::from_str(&raw[open..=close])
        .map_err(|e| malformed(format!("invalid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| malformed("reply is not a JSON object".into()))?;

    let field = |primary: &str, alias: &str| -> Result<Option<i64>, ClassifierError> {
        match obj.get(primary).or_else(|| obj.get(alias)) {
            None => Ok(None),
            Some(v) => coerce_page_number(v).map_err(|e| malformed(format!("{primary}: {e}"))),
        }
    };
    let start = field("start_page", "start")?;
    let end = field("end_page", "end")?;

    let (start, end) = match (start, end) {
        (None, None) => return Ok(None),
        (Some(s), None) => (s, s),
        (None, Some(_)) => return Err(malformed("end_page given without start_page".into())),
        (Some(s), Some(e)) => (s, e),
    };

    if start < 1 || end < 1 {
        return Err(malformed(format!(
            "page numbers are 1-based, got {start}-{end}"
        )));
    }

    let (start, end) = ((start - 1) as usize, (end - 1) as usize);
    if end > last_page_index {
        return Err(malformed(format!(
            "range ends at page {} but only {} pages were supplied",
            end + 1,
            last_page_index + 1
        )));
    }

    PageRange::new(start, end)
        .map(Some)
        .ok_or_else(|| malformed(format!("start page {} after end page {}", start + 1, end + 1)))
}

/// Integers and integer-valued strings/floats are page numbers; null and
/// empty strings mean "absent".
fn coerce_page_number(v: &Value) -> Result<Option<i64>, String> {
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
                    _ => Err(format!("{n} is not an integer")),
                }
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                s.parse::<i64>()
                    .map(Some)
                    .map_err(|_| format!("'{s}' is not an integer"))
            }
        }
        other => Err(format!("unexpected value {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn pages(n: usize) -> Vec<PageRecord> {
        (0..n).map(|i| PageRecord::new(i, format!("text {i}"))).collect()
    }

    // ── Parser ──────────────────────────────────────────────────────────

    #[test]
    fn one_based_range_becomes_zero_based() {
        let r = parse_range_response(r#"{"start_page": 3, "end_page": 5}"#, 9)
            .unwrap()
            .unwrap();
        assert_eq!((r.start(), r.end()), (2, 4));
    }

    #[test]
    fn json_wrapped_in_prose_is_accepted() {
        let raw = "Sure! Here is the range:\n```json\n{\"start_page\": 2, \"end_page\": 2}\n```\nLet me know.";
        let r = parse_range_response(raw, 5).unwrap().unwrap();
        assert_eq!((r.start(), r.end()), (1, 1));
    }

    #[test]
    fn nulls_and_empty_object_mean_not_found() {
        assert_eq!(
            parse_range_response(r#"{"start_page": null, "end_page": null}"#, 3).unwrap(),
            None
        );
        assert_eq!(parse_range_response("{}", 3).unwrap(), None);
    }

    #[test]
    fn single_page_form_and_aliases() {
        let r = parse_range_response(r#"{"start_page": 4}"#, 9).unwrap().unwrap();
        assert_eq!((r.start(), r.end()), (3, 3));
        let r = parse_range_response(r#"{"start": "6", "end": 7.0}"#, 9)
            .unwrap()
            .unwrap();
        assert_eq!((r.start(), r.end()), (5, 6));
    }

    #[test]
    fn malformed_replies_are_rejected() {
        for raw in [
            "no json here",
            "} backwards {",
            r#"{"start_page": 3, "end_page": }"#,
            r#"{"start_page": "three", "end_page": 5}"#,
            r#"{"start_page": 2.5, "end_page": 5}"#,
            r#"{"end_page": 5}"#,
            r#"{"start_page": 0, "end_page": 2}"#,
            r#"{"start_page": 6, "end_page": 4}"#,
            r#"{"start_page": 3, "end_page": 50}"#,
            r#"[1, 2]"#,
        ] {
            let res = parse_range_response(raw, 9);
            assert!(
                matches!(res, Err(ClassifierError::MalformedResponse { .. })),
                "expected malformed for {raw:?}, got {res:?}"
            );
        }
    }

    // ── Dispatch + retry ────────────────────────────────────────────────

    struct ScriptedBackend {
        replies: Mutex<Vec<Result<String, ClassifierError>>>,
        calls: AtomicUsize,
        last_prompt: Mutex<String>,
    }

    impl ScriptedBackend {
        fn new(mut replies: Vec<Result<String, ClassifierError>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl ClassifierBackend for ScriptedBackend {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = user.to_string();
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("{}".to_string()))
        }
    }

    fn transport() -> ClassifierError {
        ClassifierError::Transport {
            provider: "openai".into(),
            detail: "HTTP 503".into(),
        }
    }

    fn test_config(max_retries: u32) -> ExtractionConfig {
        ExtractionConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unregistered_provider_is_unsupported() {
        let classifier = RangeClassifier::new(&test_config(0));
        assert!(!classifier.supports(Provider::Anthropic));
        let err = classifier
            .classify(Provider::Anthropic, &pages(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifierError::UnsupportedProvider { .. }));
    }

    #[tokio::test]
    async fn transport_errors_are_retried_then_succeed() {
        let backend = ScriptedBackend::new(vec![
            Err(transport()),
            Err(transport()),
            Ok(r#"{"start_page": 1, "end_page": 2}"#.into()),
        ]);
        let classifier =
            RangeClassifier::new(&test_config(3)).with_backend(Provider::OpenAi, backend.clone());

        let range = classifier
            .classify(Provider::OpenAi, &pages(4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!((range.start(), range.end()), (0, 1));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_transport_error_propagates() {
        let backend = ScriptedBackend::new(vec![Err(transport()), Err(transport())]);
        let classifier =
            RangeClassifier::new(&test_config(1)).with_backend(Provider::OpenAi, backend.clone());

        let err = classifier
            .classify(Provider::OpenAi, &pages(4))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Transport { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_reply_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Ok("I could not tell.".into())]);
        let classifier =
            RangeClassifier::new(&test_config(3)).with_backend(Provider::OpenAi, backend.clone());

        let err = classifier
            .classify(Provider::OpenAi, &pages(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifierError::MalformedResponse { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prompt_contains_every_page() {
        let backend = ScriptedBackend::new(vec![]);
        let classifier =
            RangeClassifier::new(&test_config(0)).with_backend(Provider::Anthropic, backend.clone());

        classifier
            .classify(Provider::Anthropic, &pages(3))
            .await
            .unwrap();
        let prompt = backend.last_prompt.lock().unwrap().clone();
        for n in 1..=3 {
            assert!(prompt.contains(&format!("Page {n}:")), "missing page {n}");
        }
    }

    #[test]
    fn retry_delay_doubles_from_the_base_backoff() {
        let config = ExtractionConfig::builder()
            .retry_backoff_ms(500)
            .build()
            .unwrap();
        let classifier = RangeClassifier::new(&config);
        assert_eq!(classifier.retry_delay(1), Duration::from_millis(500));
        assert_eq!(classifier.retry_delay(2), Duration::from_millis(1000));
        assert_eq!(classifier.retry_delay(3), Duration::from_millis(2000));
        assert_eq!(classifier.retry_delay(80), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ExtractionConfig::default());
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }
}
