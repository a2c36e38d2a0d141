//! Analysis Orchestrator
//!
//! Owns the per-question state map. Each question moves through
//! `Idle -> InFlight -> Settled`; at most one cycle is active per id.
//!
//! Branches never touch the state directly. They send `(slot, text)`
//! updates into one channel, and a single merge loop running on the same
//! task applies each update to the latest state. In multi-perspective mode
//! an update for one key therefore never overwrites a sibling key.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use sdk::errors::EngineError;
use sdk::types::{AnalysisRecord, AnalysisResult, PerspectiveKey, QuestionId, RequestSettings};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::prompts::perspective_template;
use super::runner::{BranchOutcome, BranchRunner, FAILURE_PREFIX};
use crate::dataset::QuestionSource;
use crate::db::CacheStore;

/// Placeholder shown while a non-streaming simple analysis is pending
pub const ANALYZING_PLACEHOLDER: &str = "analyzing…";

/// Receives the whole result of a question after every change
pub type UpdateCallback = Arc<dyn Fn(QuestionId, &AnalysisResult) + Send + Sync>;

/// Lifecycle of one question's analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    InFlight,
    Settled,
}

/// Transient state of one question
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionState {
    pub phase: Phase,
    pub result: Option<AnalysisResult>,
}

/// Where a branch update lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Whole,
    Perspective(PerspectiveKey),
}

#[derive(Debug)]
struct BranchUpdate {
    slot: Slot,
    text: String,
}

/// Result of trying to start a cycle
enum Claim {
    Started,
    Busy(AnalysisResult),
}

pub struct AnalysisOrchestrator {
    runner: BranchRunner,
    questions: Arc<dyn QuestionSource>,
    cache: Option<Arc<CacheStore>>,
    persist_results: bool,
    states: Mutex<HashMap<QuestionId, QuestionState>>,
}

impl AnalysisOrchestrator {
    pub fn new(runner: BranchRunner, questions: Arc<dyn QuestionSource>) -> Self {
        Self {
            runner,
            questions,
            cache: None,
            persist_results: false,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a cache store. Settled results are written back only when
    /// `persist_results` is set.
    pub fn with_cache(mut self, store: Arc<CacheStore>, persist_results: bool) -> Self {
        self.cache = Some(store);
        self.persist_results = persist_results;
        self
    }

    /// Analyse question `id`.
    ///
    /// A request for an id that is in flight, or already settled with a
    /// non-empty result, does nothing and returns the current result.
    /// Upstream failures resolve as failure text; only cache failures
    /// reject.
    pub async fn request_analysis(
        &self,
        id: QuestionId,
        settings: &RequestSettings,
        on_update: Option<UpdateCallback>,
    ) -> Result<AnalysisResult, EngineError> {
        self.run_cycle(id, settings, on_update, false).await
    }

    /// Re-run the analysis of a settled question, bypassing the cache read.
    ///
    /// An in-flight cycle is still never duplicated. A successful result
    /// overwrites the cached record.
    pub async fn refresh_analysis(
        &self,
        id: QuestionId,
        settings: &RequestSettings,
        on_update: Option<UpdateCallback>,
    ) -> Result<AnalysisResult, EngineError> {
        self.run_cycle(id, settings, on_update, true).await
    }

    /// Snapshot of the state of `id`
    pub async fn state(&self, id: QuestionId) -> QuestionState {
        self.states
            .lock()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn read_cache(
        &self,
        id: QuestionId,
    ) -> Result<Option<AnalysisRecord>, EngineError> {
        match &self.cache {
            Some(store) => Ok(store.analyses().get(id).await?),
            None => Ok(None),
        }
    }

    pub async fn write_cache(
        &self,
        id: QuestionId,
        result: &AnalysisResult,
    ) -> Result<Option<AnalysisRecord>, EngineError> {
        match &self.cache {
            Some(store) => Ok(Some(store.analyses().put(id, result).await?)),
            None => Ok(None),
        }
    }

    /// Remove the cached record of `id` and forget its settled state
    pub async fn delete_cache(&self, id: QuestionId) -> Result<bool, EngineError> {
        let existed = match &self.cache {
            Some(store) => store.analyses().delete(id).await?,
            None => false,
        };

        let mut states = self.states.lock().await;
        if states.get(&id).is_some_and(|s| s.phase != Phase::InFlight) {
            states.remove(&id);
        }
        Ok(existed)
    }

    /// Remove every cached analysis and forget all settled states
    pub async fn clear_cache(&self) -> Result<u64, EngineError> {
        let removed = match &self.cache {
            Some(store) => store.analyses().clear().await?,
            None => 0,
        };

        self.states
            .lock()
            .await
            .retain(|_, state| state.phase == Phase::InFlight);
        info!("Cleared {} cached analyses", removed);
        Ok(removed)
    }

    async fn run_cycle(
        &self,
        id: QuestionId,
        settings: &RequestSettings,
        on_update: Option<UpdateCallback>,
        refresh: bool,
    ) -> Result<AnalysisResult, EngineError> {
        let multi = settings.multi_perspective_enabled;
        let initial = if multi {
            AnalysisResult::empty_perspectives()
        } else if settings.streaming_enabled {
            AnalysisResult::Simple(String::new())
        } else {
            AnalysisResult::Simple(ANALYZING_PLACEHOLDER.to_string())
        };

        if let Some(current) = self.guarded(id, refresh).await {
            debug!("Question {} already analysed or in flight", id);
            return Ok(current);
        }

        // A hit settles with the cached payload as the only result of the
        // cycle, whatever shape the current mode would have started with
        if !refresh {
            if let Some(record) = self.read_cache(id).await.map_err(|e| {
                warn!("Cache read for question {} failed: {}", id, e);
                e
            })? {
                debug!("Cache hit for question {}", id);
                let claim = self
                    .claim(id, record.payload.clone(), Phase::Settled, refresh)
                    .await;
                if let Claim::Busy(current) = claim {
                    return Ok(current);
                }
                notify(on_update.as_ref(), id, &record.payload);
                return Ok(record.payload);
            }
        }

        if let Claim::Busy(current) = self
            .claim(id, initial.clone(), Phase::InFlight, refresh)
            .await
        {
            debug!("Question {} already analysed or in flight", id);
            return Ok(current);
        }
        notify(on_update.as_ref(), id, &initial);

        let question = match self.questions.question_text(id).await {
            Ok(text) => text,
            Err(e) => {
                let result = if multi {
                    warn!("Analysis of question {} could not start: {}", id, e);
                    AnalysisResult::empty_perspectives()
                } else {
                    AnalysisResult::Simple(format!("{}{}", FAILURE_PREFIX, e))
                };
                self.settle(id, result.clone()).await;
                notify(on_update.as_ref(), id, &result);
                return Ok(result);
            }
        };

        info!(
            "Analysing question {} ({} mode)",
            id,
            if multi { "multi-perspective" } else { "simple" }
        );

        let plans: Vec<(Slot, RequestSettings)> = if multi {
            PerspectiveKey::ALL
                .into_iter()
                .map(|key| {
                    (
                        Slot::Perspective(key),
                        settings.with_prompt_template(perspective_template(key)),
                    )
                })
                .collect()
        } else {
            vec![(Slot::Whole, settings.clone())]
        };

        let outcomes = self
            .run_branches(id, &question, &plans, on_update.as_ref())
            .await;

        let mut result = initial;
        for ((slot, _), outcome) in plans.iter().zip(&outcomes) {
            apply(&mut result, *slot, outcome.text.clone());
        }
        self.settle(id, result.clone()).await;
        notify(on_update.as_ref(), id, &result);

        let failed = outcomes.iter().filter(|o| o.failed).count();
        if failed > 0 {
            warn!(
                "{} branch(es) failed for question {}, not caching",
                failed, id
            );
        } else if self.persist_results {
            if let Some(store) = &self.cache {
                store.analyses().put(id, &result).await?;
                debug!("Cached analysis of question {}", id);
            }
        }

        Ok(result)
    }

    /// Run every branch together with the merge loop on this task
    async fn run_branches(
        &self,
        id: QuestionId,
        question: &str,
        plans: &[(Slot, RequestSettings)],
        on_update: Option<&UpdateCallback>,
    ) -> Vec<BranchOutcome> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BranchUpdate>();

        let branches = join_all(plans.iter().map(|(slot, branch_settings)| {
            let tx = tx.clone();
            let slot = *slot;
            async move {
                let forward = move |text: &str| {
                    // The receiver outlives every branch
                    let _ = tx.send(BranchUpdate {
                        slot,
                        text: text.to_string(),
                    });
                };
                self.runner
                    .run(question, branch_settings, Some(&forward))
                    .await
            }
        }));
        drop(tx);

        let merge = async {
            while let Some(update) = rx.recv().await {
                self.merge(id, update, on_update).await;
            }
        };

        let (outcomes, ()) = tokio::join!(branches, merge);
        outcomes
    }

    /// Apply one branch update to the latest state of `id`
    async fn merge(
        &self,
        id: QuestionId,
        update: BranchUpdate,
        on_update: Option<&UpdateCallback>,
    ) {
        let snapshot = {
            let mut states = self.states.lock().await;
            let state = states.entry(id).or_default();
            let result = state.result.get_or_insert_with(AnalysisResult::default);
            apply(result, update.slot, update.text);
            result.clone()
        };
        notify(on_update, id, &snapshot);
    }

    /// Current result of `id` when a new cycle must not start
    async fn guarded(&self, id: QuestionId, refresh: bool) -> Option<AnalysisResult> {
        let states = self.states.lock().await;
        states.get(&id).and_then(|state| blocking_result(state, refresh))
    }

    /// Move `id` to `phase` holding `result`, unless a cycle may not start
    async fn claim(
        &self,
        id: QuestionId,
        result: AnalysisResult,
        phase: Phase,
        refresh: bool,
    ) -> Claim {
        let mut states = self.states.lock().await;
        let state = states.entry(id).or_default();

        if let Some(current) = blocking_result(state, refresh) {
            return Claim::Busy(current);
        }

        state.phase = phase;
        state.result = Some(result);
        Claim::Started
    }

    async fn settle(&self, id: QuestionId, result: AnalysisResult) {
        let mut states = self.states.lock().await;
        let state = states.entry(id).or_default();
        state.phase = Phase::Settled;
        state.result = Some(result);
    }
}

fn blocking_result(state: &QuestionState, refresh: bool) -> Option<AnalysisResult> {
    let current = state.result.clone().unwrap_or_default();
    match state.phase {
        Phase::InFlight => Some(current),
        Phase::Settled if !refresh && !current.is_empty() => Some(current),
        _ => None,
    }
}

fn apply(result: &mut AnalysisResult, slot: Slot, text: String) {
    match (slot, result) {
        (Slot::Whole, result) => *result = AnalysisResult::Simple(text),
        (Slot::Perspective(key), AnalysisResult::Perspectives(perspectives)) => {
            perspectives.set(key, text)
        }
        (Slot::Perspective(key), result) => {
            let mut perspectives = sdk::types::Perspectives::default();
            perspectives.set(key, text);
            *result = AnalysisResult::Perspectives(perspectives);
        }
    }
}

fn notify(on_update: Option<&UpdateCallback>, id: QuestionId, result: &AnalysisResult) {
    if let Some(callback) = on_update {
        callback(id, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_perspective_keeps_siblings() {
        let mut result = AnalysisResult::empty_perspectives();
        apply(&mut result, Slot::Perspective(PerspectiveKey::Deep), "d".into());
        apply(&mut result, Slot::Perspective(PerspectiveKey::Coach), "c".into());

        let p = result.as_perspectives().unwrap();
        assert_eq!(p.coach, "c");
        assert_eq!(p.deep, "d");
        assert_eq!(p.quick, "");
    }

    #[test]
    fn test_apply_whole_overwrites() {
        let mut result = AnalysisResult::Simple(ANALYZING_PLACEHOLDER.into());
        apply(&mut result, Slot::Whole, "partial".into());
        assert_eq!(result.as_simple(), Some("partial"));
    }
}
