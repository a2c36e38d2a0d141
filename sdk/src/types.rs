//! Analysis data model shared by the engine and its callers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of a question in the static dataset
pub type QuestionId = i64;

/// Placeholder substituted with the question text inside prompt templates
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// The three fixed perspectives produced in multi-perspective mode
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerspectiveKey {
    /// Interview-coach style walkthrough
    Coach,
    /// In-depth technical analysis
    Deep,
    /// Short answer for quick review
    Quick,
}

impl PerspectiveKey {
    /// All perspectives in display order
    pub const ALL: [PerspectiveKey; 3] = [
        PerspectiveKey::Coach,
        PerspectiveKey::Deep,
        PerspectiveKey::Quick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PerspectiveKey::Coach => "coach",
            PerspectiveKey::Deep => "deep",
            PerspectiveKey::Quick => "quick",
        }
    }
}

impl fmt::Display for PerspectiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-perspective analysis: one independent text per key
///
/// All three keys always exist; a branch that has not produced output yet
/// holds an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspectives {
    pub coach: String,
    pub deep: String,
    pub quick: String,
}

impl Perspectives {
    pub fn get(&self, key: PerspectiveKey) -> &str {
        match key {
            PerspectiveKey::Coach => &self.coach,
            PerspectiveKey::Deep => &self.deep,
            PerspectiveKey::Quick => &self.quick,
        }
    }

    /// Overwrite one key, leaving its siblings untouched
    pub fn set(&mut self, key: PerspectiveKey, text: impl Into<String>) {
        let slot = match key {
            PerspectiveKey::Coach => &mut self.coach,
            PerspectiveKey::Deep => &mut self.deep,
            PerspectiveKey::Quick => &mut self.quick,
        };
        *slot = text.into();
    }

    pub fn is_empty(&self) -> bool {
        self.coach.is_empty() && self.deep.is_empty() && self.quick.is_empty()
    }
}

/// Outcome of analysing one question
///
/// Serialized untagged: a plain string for the simple shape, an object with
/// `coach`/`deep`/`quick` for the multi-perspective shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    /// Single analysis text
    Simple(String),

    /// Three named analyses
    Perspectives(Perspectives),
}

impl AnalysisResult {
    /// Empty multi-perspective result with all three keys present
    pub fn empty_perspectives() -> Self {
        AnalysisResult::Perspectives(Perspectives::default())
    }

    pub fn is_multi_perspective(&self) -> bool {
        matches!(self, AnalysisResult::Perspectives(_))
    }

    /// True when no text has been produced for any slot
    pub fn is_empty(&self) -> bool {
        match self {
            AnalysisResult::Simple(text) => text.is_empty(),
            AnalysisResult::Perspectives(p) => p.is_empty(),
        }
    }

    pub fn as_simple(&self) -> Option<&str> {
        match self {
            AnalysisResult::Simple(text) => Some(text),
            AnalysisResult::Perspectives(_) => None,
        }
    }

    pub fn as_perspectives(&self) -> Option<&Perspectives> {
        match self {
            AnalysisResult::Simple(_) => None,
            AnalysisResult::Perspectives(p) => Some(p),
        }
    }
}

impl Default for AnalysisResult {
    fn default() -> Self {
        AnalysisResult::Simple(String::new())
    }
}

/// Per-request configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSettings {
    /// Credential forwarded verbatim to the completion endpoint.
    /// Absent or empty means the canned analysis is produced instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_token: Option<String>,

    /// Model name sent with each completion request
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_endpoint_base")]
    pub endpoint_base: String,

    /// Prompt template containing `{question}`
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Deliver incremental updates while the response streams in
    #[serde(default = "default_true")]
    pub streaming_enabled: bool,

    /// Run the coach/deep/quick branches instead of a single analysis
    #[serde(default)]
    pub multi_perspective_enabled: bool,
}

impl RequestSettings {
    /// The credential, if one is configured and non-empty
    pub fn credential(&self) -> Option<&str> {
        self.credential_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }

    /// Substitute the question into the prompt template.
    ///
    /// Only the first placeholder is replaced.
    pub fn render_prompt(&self, question: &str) -> String {
        self.prompt_template
            .replacen(QUESTION_PLACEHOLDER, question, 1)
    }

    /// Copy of these settings using a different prompt template
    pub fn with_prompt_template(&self, template: impl Into<String>) -> Self {
        Self {
            prompt_template: template.into(),
            ..self.clone()
        }
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            credential_token: None,
            model_name: default_model_name(),
            endpoint_base: default_endpoint_base(),
            prompt_template: default_prompt_template(),
            streaming_enabled: true,
            multi_perspective_enabled: false,
        }
    }
}

fn default_model_name() -> String {
    "gpt-5-mini".to_string()
}

fn default_endpoint_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_prompt_template() -> String {
    "You are a senior frontend interviewer. Analyse the interview question below: \
     explain what it tests, give a model answer, show a short code example where \
     it helps, list bonus points and common pitfalls. Answer in Markdown.\n\n\
     Question: {question}"
        .to_string()
}

fn default_true() -> bool {
    true
}

/// A durable record in one of the cache collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<K, P> {
    /// Unique key within the collection
    pub key: K,

    /// Stored value
    pub payload: P,

    /// Write time in milliseconds since the Unix epoch
    pub written_at: i64,
}

/// Cached analysis keyed by question id
pub type AnalysisRecord = CacheRecord<QuestionId, AnalysisResult>;

/// Cached dataset snapshot keyed by logical name
pub type SnapshotRecord = CacheRecord<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_result_serializes_as_string() {
        let result = AnalysisResult::Simple("hello".to_string());
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#""hello""#);
    }

    #[test]
    fn test_perspectives_serialize_with_fixed_keys() {
        let result = AnalysisResult::empty_perspectives();
        let value = serde_json::to_value(&result).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 3);
        for key in PerspectiveKey::ALL {
            assert_eq!(object.get(key.as_str()).unwrap(), "");
        }
    }

    #[test]
    fn test_untagged_deserialization_picks_shape() {
        let simple: AnalysisResult = serde_json::from_str(r#""text""#).unwrap();
        assert_eq!(simple.as_simple(), Some("text"));

        let multi: AnalysisResult =
            serde_json::from_str(r#"{"coach":"a","deep":"b","quick":"c"}"#).unwrap();
        let p = multi.as_perspectives().unwrap();
        assert_eq!(p.get(PerspectiveKey::Deep), "b");
    }

    #[test]
    fn test_set_leaves_siblings() {
        let mut p = Perspectives {
            coach: "c".into(),
            deep: "d".into(),
            quick: "q".into(),
        };
        p.set(PerspectiveKey::Deep, "deeper");
        assert_eq!(p.coach, "c");
        assert_eq!(p.deep, "deeper");
        assert_eq!(p.quick, "q");
    }

    #[test]
    fn test_is_empty() {
        assert!(AnalysisResult::default().is_empty());
        assert!(AnalysisResult::empty_perspectives().is_empty());
        assert!(!AnalysisResult::Simple("x".into()).is_empty());
    }

    #[test]
    fn test_render_prompt_replaces_first_placeholder() {
        let settings = RequestSettings {
            prompt_template: "Q: {question} / again {question}".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.render_prompt("closures"),
            "Q: closures / again {question}"
        );
    }

    #[test]
    fn test_blank_credential_counts_as_absent() {
        let mut settings = RequestSettings::default();
        assert_eq!(settings.credential(), None);

        settings.credential_token = Some("   ".into());
        assert_eq!(settings.credential(), None);

        settings.credential_token = Some("sk-test".into());
        assert_eq!(settings.credential(), Some("sk-test"));
    }

    #[test]
    fn test_settings_defaults_from_empty_toml_like_json() {
        let settings: RequestSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, RequestSettings::default());
        assert!(settings.prompt_template.contains(QUESTION_PLACEHOLDER));
    }
}
