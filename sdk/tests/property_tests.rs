use ferusher_sdk::errors::{EngineError, FerusherErrorExt};
use ferusher_sdk::types::{AnalysisResult, PerspectiveKey, Perspectives, RequestSettings};
use proptest::prelude::*;

// User hints are static strings and never echo the raw error payload
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "[a-zA-Z0-9/_.-]{8,40}") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Store(error_str.clone()),
            EngineError::Dataset(error_str.clone()),
            EngineError::Network(error_str.clone()),
            EngineError::UnknownQuestion(error_str.len() as i64),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&error_str));
        }
    }
}

// The untagged encoding must never confuse the two shapes
proptest! {
    #[test]
    fn test_analysis_result_shape_survives_json(
        coach in "\\PC*",
        deep in "\\PC*",
        quick in "\\PC*",
    ) {
        let simple = AnalysisResult::Simple(coach.clone());
        let json = serde_json::to_string(&simple).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, simple);

        let multi = AnalysisResult::Perspectives(Perspectives { coach, deep, quick });
        let json = serde_json::to_string(&multi).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        prop_assert!(back.is_multi_perspective());
        prop_assert_eq!(back, multi);
    }
}

proptest! {
    #[test]
    fn test_render_prompt_embeds_question(question in "[^{}]*") {
        let settings = RequestSettings::default();
        let prompt = settings.render_prompt(&question);
        prop_assert!(prompt.contains(&question));
        prop_assert!(!prompt.contains("{question}"), "prompt still contains the {{question}} placeholder");
    }
}

#[test]
fn test_perspective_keys_are_fixed() {
    let names: Vec<&str> = PerspectiveKey::ALL.iter().map(|k| k.as_str()).collect();
    assert_eq!(names, vec!["coach", "deep", "quick"]);
}
