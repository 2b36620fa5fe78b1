//! Extraction and rewriting over generated narratives

use autolysis_narrative::{rewrite, ExecutionOutcome, SnippetExtractor};
use proptest::prelude::*;

fn prose() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,#\n]{0,40}"
}

fn snippet() -> impl Strategy<Value = String> {
    "[a-z()\\[\\]0-9 =.\n]{0,30}".prop_map(|body| format!("```python\n{body}\n```"))
}

proptest! {
    #[test]
    fn prose_survives_and_markers_follow_outcomes(
        parts in prop::collection::vec((prose(), snippet(), any::<bool>()), 0..6),
        tail in prose(),
    ) {
        let mut text = String::new();
        let mut expected = String::new();
        for (number, (before, code, ok)) in parts.iter().enumerate() {
            // separate prose from fences so every closing fence is followed by whitespace
            text.push_str(before);
            text.push(' ');
            text.push_str(code);
            text.push(' ');
            expected.push_str(before);
            expected.push(' ');
            if *ok {
                expected.push_str(&format!("![Graph {}](out/graph_{}.png)", number + 1, number + 1));
            } else {
                expected.push_str(&format!("[Error in Graph {}]", number + 1));
            }
            expected.push(' ');
        }
        text.push_str(&tail);
        expected.push_str(&tail);

        let blocks = SnippetExtractor::default().extract(&text);
        prop_assert_eq!(blocks.len(), parts.len());

        let outcomes: Vec<ExecutionOutcome> = parts
            .iter()
            .enumerate()
            .map(|(i, (_, _, ok))| {
                if *ok {
                    ExecutionOutcome::artifact(format!("out/graph_{}.png", i + 1))
                } else {
                    ExecutionOutcome::failure("failed")
                }
            })
            .collect();

        let rewritten = rewrite(&text, &blocks, &outcomes).unwrap();
        prop_assert_eq!(rewritten, expected);
    }
}

#[test]
fn narrative_without_code_is_unchanged() {
    let text = "# Report\n\nThe data has no charts.\n";
    let blocks = SnippetExtractor::default().extract(text);
    assert!(blocks.is_empty());
    assert_eq!(rewrite(text, &blocks, &[]).unwrap(), text);
}
