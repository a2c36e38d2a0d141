//! Built-in prompt templates and the canned analysis
//!
//! The canned analysis stands in for the model whenever no credential is
//! configured, so the rest of the pipeline (streaming, merging, caching) can
//! be exercised without network access.

use sdk::types::PerspectiveKey;

/// Prompt template used by one multi-perspective branch
pub fn perspective_template(key: PerspectiveKey) -> &'static str {
    match key {
        PerspectiveKey::Coach => COACH_TEMPLATE,
        PerspectiveKey::Deep => DEEP_TEMPLATE,
        PerspectiveKey::Quick => QUICK_TEMPLATE,
    }
}

const COACH_TEMPLATE: &str = "You are an experienced interview coach. For the interview question \
below, explain what the interviewer is really checking, then give an answer the candidate could \
say out loud using the STAR method where it fits. Finish with two follow-up questions the \
interviewer is likely to ask. Answer in Markdown.

Question: {question}";

const DEEP_TEMPLATE: &str = "You are a principal engineer. Give an in-depth technical analysis \
of the interview question below: underlying mechanisms, how popular frameworks implement it, \
complexity and performance trade-offs, and a runnable code example. Answer in Markdown.

Question: {question}";

const QUICK_TEMPLATE: &str = "Give a concise answer to the interview question below in at most \
five bullet points, suitable for last-minute review. Answer in Markdown.

Question: {question}";

/// Deterministic analysis returned when no credential is configured
pub fn canned_analysis(question: &str) -> String {
    format!(
        r#"# Sample analysis (no API key configured)

## What the question tests
This is a sample analysis for **"{question}"**.
A real analysis would dig into the technical details of the question; since no API key is configured, only the layout is shown here.

**Interviewers usually look for:**
- A precise grasp of the core concepts
- The ability to apply them in real scenarios
- Clean, idiomatic implementation
- Awareness of performance

## Suggested answer (sample)
*"This comes up a lot in day-to-day work. The heart of it is..."*

**STAR example:**
- **Situation:** On a previous project I owned a heavily used list component...
- **Task:** Scrolling had to stay smooth with tens of thousands of rows...
- **Action:** I introduced virtual scrolling...
- **Result:** Rendering got ten times faster and frame rate held at 60 FPS.

## Code walkthrough (sample)
```javascript
function demonstration() {{
  // A real analysis would show code specific to "{question}" here
  const answer = {{
    concept: "clear",
    practice: "solid",
    highlight: "source-level understanding",
  }};
  return answer;
}}
```

## Bonus points
- **Source-level view:** how React or Vue handle this internally
- **Performance:** time complexity of the alternative approaches
- **Trends:** what Server Components or WASM change here

## Pitfalls
- Reciting definitions without tying them to real scenarios
- Explaining what without explaining why

> **Tip:** configure an OpenAI-compatible API key to enable real analyses."#
    )
}

/// Split the canned text into streaming pieces.
///
/// Each piece ends with the space that followed it, so concatenating the
/// pieces reproduces the text exactly.
pub fn canned_pieces(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::QUESTION_PLACEHOLDER;

    #[test]
    fn test_every_template_has_placeholder() {
        for key in PerspectiveKey::ALL {
            assert!(
                perspective_template(key).contains(QUESTION_PLACEHOLDER),
                "{} template is missing the placeholder",
                key
            );
        }
    }

    #[test]
    fn test_canned_analysis_mentions_question() {
        let text = canned_analysis("What is a closure?");
        assert!(text.contains("What is a closure?"));
        assert!(!text.contains("null"));
        assert!(!text.contains("undefined"));
    }

    #[test]
    fn test_canned_pieces_reassemble() {
        let text = canned_analysis("X");
        let rebuilt: String = canned_pieces(&text).collect();
        assert_eq!(rebuilt, text);
        assert!(canned_pieces(&text).count() > 50);
    }
}
