//! Branch Runner
//!
//! Drives one upstream request to completion. Every failure is contained
//! here and turned into visible text, so callers always get a settled
//! branch back.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use sdk::types::RequestSettings;
use tracing::{debug, warn};

use super::assembler::StreamAssembler;
use super::prompts::{canned_analysis, canned_pieces};
use crate::llm::{self, CompletionRequest, CompletionTransport};

/// Prefix of every contained failure message
pub const FAILURE_PREFIX: &str = "analysis generation failed: ";

/// Receives the cleaned cumulative text of one branch
pub type BranchUpdateFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Delays used when producing the canned analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CannedTiming {
    /// Pause before each streamed piece
    pub word_delay: Duration,

    /// Pause before the single non-streaming delivery
    pub full_delay: Duration,
}

impl Default for CannedTiming {
    fn default() -> Self {
        Self {
            word_delay: Duration::from_millis(50),
            full_delay: Duration::from_millis(1000),
        }
    }
}

impl CannedTiming {
    /// No delays at all, for tests and batch use
    pub fn immediate() -> Self {
        Self {
            word_delay: Duration::ZERO,
            full_delay: Duration::ZERO,
        }
    }
}

/// Terminal state of one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    /// Final cleaned text, or the failure message
    pub text: String,

    /// True when `text` is a contained failure
    pub failed: bool,
}

/// Runs single analysis branches against a completion transport
pub struct BranchRunner {
    transport: Arc<dyn CompletionTransport>,
    canned: CannedTiming,
}

impl BranchRunner {
    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            transport,
            canned: CannedTiming::default(),
        }
    }

    pub fn with_canned_timing(mut self, canned: CannedTiming) -> Self {
        self.canned = canned;
        self
    }

    /// Produce the analysis of `question` under `settings`.
    ///
    /// `on_update` receives the cleaned cumulative text after each increment
    /// and always sees the returned text last.
    pub async fn run(
        &self,
        question: &str,
        settings: &RequestSettings,
        on_update: Option<BranchUpdateFn<'_>>,
    ) -> BranchOutcome {
        let emit = |text: &str| {
            if let Some(callback) = on_update {
                callback(text);
            }
        };

        let Some(credential) = settings.credential() else {
            debug!("No credential configured, producing canned analysis");
            let text = self
                .run_canned(question, settings.streaming_enabled, &emit)
                .await;
            return BranchOutcome {
                text,
                failed: false,
            };
        };

        let request = CompletionRequest {
            prompt: settings.render_prompt(question),
            credential: credential.to_string(),
            endpoint_base: settings.endpoint_base.clone(),
            model: settings.model_name.clone(),
            stream: settings.streaming_enabled,
        };

        match self.run_upstream(&request, &emit).await {
            Ok(text) => BranchOutcome {
                text,
                failed: false,
            },
            Err(e) => {
                warn!(
                    "Analysis branch failed via {} transport: {}",
                    self.transport.name(),
                    e
                );
                let text = format!("{}{}", FAILURE_PREFIX, e);
                emit(&text);
                BranchOutcome { text, failed: true }
            }
        }
    }

    async fn run_canned(
        &self,
        question: &str,
        streaming: bool,
        emit: &(dyn Fn(&str) + Send + Sync),
    ) -> String {
        let text = canned_analysis(question);

        if !streaming {
            pause(self.canned.full_delay).await;
            emit(&text);
            return text;
        }

        let mut cumulative = String::with_capacity(text.len());
        for piece in canned_pieces(&text) {
            pause(self.canned.word_delay).await;
            cumulative.push_str(piece);
            emit(&cumulative);
        }
        cumulative
    }

    async fn run_upstream(
        &self,
        request: &CompletionRequest,
        emit: &(dyn Fn(&str) + Send + Sync),
    ) -> llm::Result<String> {
        let mut body = self.transport.send(request).await?;
        let mut assembler = StreamAssembler::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let cleaned = assembler.push(&chunk);
            if request.stream {
                emit(cleaned);
            }
        }

        let text = assembler.finish();
        emit(&text);
        Ok(text)
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{TextStream, UpstreamError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport replaying a fixed list of body fragments
    struct ScriptedTransport {
        fragments: Vec<&'static str>,
        fail_with: Option<&'static str>,
        /// Body error yielded after every fragment has been sent
        break_with: Option<&'static str>,
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, _request: &CompletionRequest) -> llm::Result<TextStream> {
            if let Some(message) = self.fail_with {
                return Err(UpstreamError::Network(message.to_string()));
            }
            let mut items: Vec<llm::Result<Vec<u8>>> = self
                .fragments
                .iter()
                .map(|f| Ok(f.as_bytes().to_vec()))
                .collect();
            if let Some(message) = self.break_with {
                items.push(Err(UpstreamError::Network(message.to_string())));
            }
            Ok(futures::stream::iter(items).boxed())
        }
    }

    fn runner(fragments: Vec<&'static str>, fail_with: Option<&'static str>) -> BranchRunner {
        BranchRunner::new(Arc::new(ScriptedTransport {
            fragments,
            fail_with,
            break_with: None,
        }))
        .with_canned_timing(CannedTiming::immediate())
    }

    fn with_key() -> RequestSettings {
        RequestSettings {
            credential_token: Some("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_streaming_updates_are_cleaned() {
        let runner = runner(vec!["Hi <think>hidden", "</think>", " there"], None);
        let seen = Mutex::new(Vec::new());
        let record = |text: &str| seen.lock().unwrap().push(text.to_string());

        let outcome = runner.run("q", &with_key(), Some(&record)).await;

        assert!(!outcome.failed);
        assert_eq!(outcome.text, "Hi  there");
        let seen = seen.into_inner().unwrap();
        assert!(seen.iter().all(|s| !s.contains("hidden")));
        assert_eq!(seen.last().map(String::as_str), Some("Hi  there"));
    }

    #[tokio::test]
    async fn test_non_streaming_delivers_once() {
        let runner = runner(vec!["<think>x</think>", "answer"], None);
        let settings = RequestSettings {
            streaming_enabled: false,
            ..with_key()
        };
        let seen = Mutex::new(Vec::new());
        let record = |text: &str| seen.lock().unwrap().push(text.to_string());

        let outcome = runner.run("q", &settings, Some(&record)).await;

        assert_eq!(outcome.text, "answer");
        assert_eq!(seen.into_inner().unwrap(), vec!["answer".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_contained() {
        let runner = runner(vec![], Some("connection refused"));
        let seen = Mutex::new(Vec::new());
        let record = |text: &str| seen.lock().unwrap().push(text.to_string());

        let outcome = runner.run("q", &with_key(), Some(&record)).await;

        assert!(outcome.failed);
        assert_eq!(
            outcome.text,
            "analysis generation failed: Network error: connection refused"
        );
        assert_eq!(seen.into_inner().unwrap().last(), Some(&outcome.text));
    }

    #[tokio::test]
    async fn test_body_error_replaces_partial_text() {
        let runner = BranchRunner::new(Arc::new(ScriptedTransport {
            fragments: vec!["partial ", "answer"],
            fail_with: None,
            break_with: Some("connection reset"),
        }));
        let seen = Mutex::new(Vec::new());
        let record = |text: &str| seen.lock().unwrap().push(text.to_string());

        let outcome = runner.run("q", &with_key(), Some(&record)).await;

        assert!(outcome.failed);
        assert_eq!(
            outcome.text,
            "analysis generation failed: Network error: connection reset"
        );
        let seen = seen.into_inner().unwrap();
        assert!(seen.iter().any(|s| s == "partial answer"));
        let last = seen.last().unwrap();
        assert!(last.starts_with(FAILURE_PREFIX));
        assert_eq!(last, &outcome.text);
    }

    #[tokio::test]
    async fn test_canned_non_streaming() {
        let runner = runner(vec![], Some("must not be called"));
        let settings = RequestSettings {
            streaming_enabled: false,
            ..Default::default()
        };

        let outcome = runner.run("What is CSS?", &settings, None).await;

        assert!(!outcome.failed);
        assert_eq!(outcome.text, canned_analysis("What is CSS?"));
    }
}
