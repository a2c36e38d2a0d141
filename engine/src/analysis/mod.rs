//! Analysis pipeline
//!
//! Leaves first: the assembler cleans one response stream, the runner drives
//! one branch, and the orchestrator fans branches out per question and owns
//! their state.

pub mod assembler;
pub mod orchestrator;
pub mod prompts;
pub mod runner;

pub use assembler::{strip_reasoning, DecodeError, StreamAssembler};
pub use orchestrator::{
    AnalysisOrchestrator, Phase, QuestionState, UpdateCallback, ANALYZING_PLACEHOLDER,
};
pub use prompts::{canned_analysis, perspective_template};
pub use runner::{BranchOutcome, BranchRunner, CannedTiming, FAILURE_PREFIX};
