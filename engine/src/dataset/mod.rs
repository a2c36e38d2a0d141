//! Question dataset
//!
//! The dataset is a JSON array of compact records `{c, l, q, m, d, t}`.
//! Records are expanded into `Question`s with ids assigned in file order
//! (starting at 1) and the expanded list is kept in the cache store under
//! [`QUESTIONS_SNAPSHOT_KEY`], so later runs do not need the source file.

use std::path::Path;

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::QuestionId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::CacheStore;

/// Snapshot key of the expanded question list
pub const QUESTIONS_SNAPSHOT_KEY: &str = "interview_questions";

/// One interview question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub company: String,
    pub level: String,
    pub content: String,
    pub date: String,
    pub rating: f64,
    pub category: String,
}

/// On-disk record as shipped in the dataset file
#[derive(Debug, Clone, Deserialize)]
pub struct CompactQuestion {
    /// Company
    #[serde(default)]
    pub c: String,
    /// Level
    #[serde(default)]
    pub l: String,
    /// Question text
    pub q: String,
    /// Date
    #[serde(default)]
    pub m: String,
    /// Rating
    #[serde(default)]
    pub d: f64,
    /// Category
    #[serde(default)]
    pub t: String,
}

/// Expand compact records, assigning ids `index + 1`
pub fn expand_compact(records: Vec<CompactQuestion>) -> Vec<Question> {
    records
        .into_iter()
        .zip(1..)
        .map(|(record, id)| Question {
            id,
            company: record.c,
            level: record.l,
            content: record.q,
            date: record.m,
            rating: record.d,
            category: record.t,
        })
        .collect()
}

/// Source of question text for the orchestrator
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Text of question `id`, or `EngineError::UnknownQuestion`
    async fn question_text(&self, id: QuestionId) -> Result<String, EngineError>;
}

/// Immutable, in-memory question list
#[derive(Debug, Clone, Default)]
pub struct QuestionCatalog {
    questions: Vec<Question>,
}

impl QuestionCatalog {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Parse a dataset file body of compact records
    pub fn from_compact_json(body: &str) -> Result<Self, EngineError> {
        let records: Vec<CompactQuestion> = serde_json::from_str(body)
            .map_err(|e| EngineError::Dataset(format!("Invalid dataset file: {}", e)))?;
        Ok(Self::new(expand_compact(records)))
    }

    pub fn get(&self, id: QuestionId) -> Option<&Question> {
        // Ids follow file order, so index lookup is tried before a scan
        usize::try_from(id - 1)
            .ok()
            .and_then(|index| self.questions.get(index))
            .filter(|q| q.id == id)
            .or_else(|| self.questions.iter().find(|q| q.id == id))
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[async_trait]
impl QuestionSource for QuestionCatalog {
    async fn question_text(&self, id: QuestionId) -> Result<String, EngineError> {
        self.get(id)
            .map(|q| q.content.clone())
            .ok_or(EngineError::UnknownQuestion(id))
    }
}

/// Read a dataset file and store its expanded form in the cache store
pub async fn import_catalog(
    store: Option<&CacheStore>,
    path: &Path,
) -> Result<QuestionCatalog, EngineError> {
    info!("Importing question dataset from {}", path.display());
    let body = tokio::fs::read_to_string(path).await?;
    let catalog = QuestionCatalog::from_compact_json(&body)?;

    if let Some(store) = store {
        let payload = serde_json::to_value(catalog.questions())
            .map_err(|e| EngineError::Dataset(e.to_string()))?;
        store
            .snapshots()
            .put(QUESTIONS_SNAPSHOT_KEY, &payload)
            .await?;
        debug!("Cached {} questions", catalog.len());
    }

    Ok(catalog)
}

/// Load the question catalog.
///
/// The cached snapshot wins; without one, `fallback` is imported (and
/// cached). Having neither is an error.
pub async fn load_catalog(
    store: Option<&CacheStore>,
    fallback: Option<&Path>,
) -> Result<QuestionCatalog, EngineError> {
    if let Some(store) = store {
        if let Some(record) = store.snapshots().get(QUESTIONS_SNAPSHOT_KEY).await? {
            let questions: Vec<Question> = serde_json::from_value(record.payload)
                .map_err(|e| EngineError::Dataset(format!("Corrupt cached dataset: {}", e)))?;
            debug!("Loaded {} questions from cache", questions.len());
            return Ok(QuestionCatalog::new(questions));
        }
    }

    match fallback {
        Some(path) => import_catalog(store, path).await,
        None => Err(EngineError::Dataset(
            "No question dataset available. Import one with `ferusher dataset import <PATH>`"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"c": "Acme", "l": "senior", "q": "What is a closure?", "m": "2024-05", "d": 4, "t": "js"},
        {"c": "Globex", "l": "junior", "q": "Explain the box model", "m": "2024-06", "d": 2.5, "t": "css"}
    ]"#;

    #[test]
    fn test_compact_records_expand_in_order() {
        let catalog = QuestionCatalog::from_compact_json(SAMPLE).unwrap();

        assert_eq!(catalog.len(), 2);
        let second = catalog.get(2).unwrap();
        assert_eq!(second.company, "Globex");
        assert_eq!(second.content, "Explain the box model");
        assert_eq!(second.rating, 2.5);
        assert_eq!(second.category, "css");
    }

    #[test]
    fn test_invalid_file_is_dataset_error() {
        let err = QuestionCatalog::from_compact_json("{not an array").unwrap_err();
        assert!(matches!(err, EngineError::Dataset(_)));
    }

    #[tokio::test]
    async fn test_unknown_question() {
        let catalog = QuestionCatalog::from_compact_json(SAMPLE).unwrap();

        assert_eq!(
            catalog.question_text(1).await.unwrap(),
            "What is a closure?"
        );
        assert!(matches!(
            catalog.question_text(99).await,
            Err(EngineError::UnknownQuestion(99))
        ));
        assert!(catalog.get(0).is_none());
    }
}
