//! Span-based narrative rewriting
//!
//! Blocks and outcomes are walked in lockstep with a cursor into the
//! original text. Text between spans is copied byte for byte; each span is
//! replaced by the marker for its outcome. Block content is never searched
//! for, so identical blocks resolve independently.

use crate::error::RewriteError;
use crate::extractor::CodeBlock;
use crate::outcome::ExecutionOutcome;

/// Replacement text for one block
///
/// `![Graph n](path)` for an artifact, `[Error in Graph n]` for a failure.
#[must_use]
pub fn marker(number: usize, outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Artifact(path) => format!("![Graph {number}]({})", path.display()),
        ExecutionOutcome::Failure(_) => format!("[Error in Graph {number}]"),
    }
}

/// Replace every block span with its outcome marker
///
/// # Errors
/// `RewriteError` when the counts differ or a span is out of order, out of
/// bounds, or not on a character boundary.
pub fn rewrite(
    narrative: &str,
    blocks: &[CodeBlock],
    outcomes: &[ExecutionOutcome],
) -> Result<String, RewriteError> {
    if blocks.len() != outcomes.len() {
        return Err(RewriteError::length_mismatch(blocks.len(), outcomes.len()));
    }

    let mut output = String::with_capacity(narrative.len());
    let mut cursor = 0;

    for (position, (block, outcome)) in blocks.iter().zip(outcomes).enumerate() {
        check_span(narrative, position, block, cursor)?;
        output.push_str(&narrative[cursor..block.start_offset]);
        output.push_str(&marker(position + 1, outcome));
        cursor = block.end_offset;
    }
    output.push_str(&narrative[cursor..]);

    tracing::debug!(
        blocks = blocks.len(),
        failures = outcomes.iter().filter(|o| !o.is_artifact()).count(),
        "narrative rewritten"
    );
    Ok(output)
}

fn check_span(
    narrative: &str,
    index: usize,
    block: &CodeBlock,
    cursor: usize,
) -> Result<(), RewriteError> {
    let (start, end) = (block.start_offset, block.end_offset);
    if start < cursor {
        return Err(RewriteError::OutOfOrder {
            index,
            start,
            cursor,
        });
    }
    if end < start || end > narrative.len() {
        return Err(RewriteError::OutOfBounds {
            index,
            start,
            end,
            len: narrative.len(),
        });
    }
    for offset in [start, end] {
        if !narrative.is_char_boundary(offset) {
            return Err(RewriteError::NotCharBoundary { index, offset });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::SnippetExtractor;
    use pretty_assertions::assert_eq;

    fn block(index: usize, start_offset: usize, end_offset: usize) -> CodeBlock {
        CodeBlock {
            index,
            language: "python".into(),
            raw_source: String::new(),
            start_offset,
            end_offset,
        }
    }

    #[test]
    fn no_blocks_is_identity() {
        let text = "# Title\n\nNothing to run here.";
        assert_eq!(rewrite(text, &[], &[]).unwrap(), text);
    }

    #[test]
    fn mixed_outcomes_in_order() {
        let text = "A ```python\nplt.plot([1])\n``` B ```python\nraise ValueError()\n``` C";
        let blocks = SnippetExtractor::default().extract(text);
        let outcomes = vec![
            ExecutionOutcome::artifact("/out/graph_1.png"),
            ExecutionOutcome::failure("ValueError"),
        ];
        assert_eq!(
            rewrite(text, &blocks, &outcomes).unwrap(),
            "A ![Graph 1](/out/graph_1.png) B [Error in Graph 2] C"
        );
    }

    #[test]
    fn identical_blocks_get_their_own_outcome() {
        let snippet = "```python\nplt.plot([1])\n```";
        let text = format!("one {snippet} two {snippet} three");
        let blocks = SnippetExtractor::default().extract(&text);
        let outcomes = vec![
            ExecutionOutcome::failure("boom"),
            ExecutionOutcome::artifact("g/graph_2.png"),
        ];
        assert_eq!(
            rewrite(&text, &blocks, &outcomes).unwrap(),
            "one [Error in Graph 1] two ![Graph 2](g/graph_2.png) three"
        );
    }

    #[test]
    fn length_mismatch_rejected() {
        let err = rewrite("abc", &[block(0, 0, 1)], &[]).unwrap_err();
        assert_eq!(err, RewriteError::length_mismatch(1, 0));
    }

    #[test]
    fn overlapping_spans_rejected() {
        let outcomes = vec![ExecutionOutcome::failure("x"), ExecutionOutcome::failure("y")];
        let err = rewrite("abcdef", &[block(0, 0, 4), block(1, 2, 5)], &outcomes).unwrap_err();
        assert!(matches!(err, RewriteError::OutOfOrder { index: 1, .. }));
    }

    #[test]
    fn out_of_bounds_rejected() {
        let outcomes = vec![ExecutionOutcome::failure("x")];
        let err = rewrite("abc", &[block(0, 1, 9)], &outcomes).unwrap_err();
        assert!(matches!(err, RewriteError::OutOfBounds { len: 3, .. }));
    }

    #[test]
    fn char_boundary_checked() {
        let outcomes = vec![ExecutionOutcome::failure("x")];
        let err = rewrite("\u{e9}abc", &[block(0, 1, 3)], &outcomes).unwrap_err();
        assert_eq!(err, RewriteError::NotCharBoundary { index: 0, offset: 1 });
    }
}
