//! Fenced snippet extraction
//!
//! A snippet opens with three backticks immediately followed by the language
//! tag and closes at the first later run of three backticks that is followed
//! by whitespace or the end of the text. Matching is non-greedy and spans
//! lines, so inline fences such as ``A ```python\nx\n``` B`` are found too.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Fence language recognized by [`SnippetExtractor::default`]
pub const DEFAULT_LANGUAGE: &str = "python";

const FENCE: &str = "```";

static PYTHON_FENCE: Lazy<Regex> =
    Lazy::new(|| fence_pattern(DEFAULT_LANGUAGE).expect("python fence pattern is valid"));

fn fence_pattern(language: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?s){FENCE}{}(.*?){FENCE}(?:\s|\z)",
        regex::escape(language)
    ))
}

/// One fenced snippet and its position in the narrative
///
/// Identity is positional: two blocks with identical source are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    /// 0-based position among the narrative's blocks
    pub index: usize,
    /// Fence language tag
    pub language: String,
    /// Body between the fences, verbatim
    pub raw_source: String,
    /// Byte offset of the opening fence
    pub start_offset: usize,
    /// Byte offset just past the closing fence
    pub end_offset: usize,
}

impl CodeBlock {
    /// 1-based number used in artifact names and markers
    #[inline]
    #[must_use]
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// Body with leading whitespace removed from every line
    #[must_use]
    pub fn source(&self) -> String {
        self.raw_source
            .lines()
            .map(str::trim_start)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Byte length of the whole fenced span
    #[inline]
    #[must_use]
    pub fn span_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// Scans narrative text for fenced snippets of one language
#[derive(Debug, Clone)]
pub struct SnippetExtractor {
    language: String,
    pattern: Regex,
}

impl Default for SnippetExtractor {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            pattern: PYTHON_FENCE.clone(),
        }
    }
}

impl SnippetExtractor {
    /// Extractor for fences tagged with `language`
    ///
    /// # Errors
    /// `InvalidLanguage` if the tag is empty or has unexpected characters.
    pub fn new(language: impl Into<String>) -> Result<Self, ExtractError> {
        let language = language.into();
        let valid = !language.is_empty()
            && language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-'));
        if !valid {
            return Err(ExtractError::InvalidLanguage(language));
        }
        let pattern =
            fence_pattern(&language).map_err(|_| ExtractError::InvalidLanguage(language.clone()))?;
        Ok(Self { language, pattern })
    }

    /// Fence language tag
    #[inline]
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// All blocks, left to right; empty when the narrative has none
    #[must_use]
    pub fn extract(&self, narrative: &str) -> Vec<CodeBlock> {
        let blocks: Vec<CodeBlock> = self
            .pattern
            .captures_iter(narrative)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let body = caps.get(1)?;
                Some((whole.start(), body.as_str(), body.end() + FENCE.len()))
            })
            .enumerate()
            .map(|(index, (start_offset, body, end_offset))| CodeBlock {
                index,
                language: self.language.clone(),
                raw_source: body.to_string(),
                start_offset,
                end_offset,
            })
            .collect();

        tracing::debug!(language = %self.language, blocks = blocks.len(), "snippets extracted");
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_fences_is_empty() {
        assert!(SnippetExtractor::default().extract("plain text").is_empty());
        assert!(SnippetExtractor::default().extract("").is_empty());
    }

    #[test]
    fn inline_fence_span_excludes_trailing_space() {
        let text = "A ```python\nplt.plot([1])\n``` B";
        let blocks = SnippetExtractor::default().extract(text);
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.start_offset, 2);
        assert_eq!(&text[block.end_offset..], " B");
        assert_eq!(block.raw_source, "\nplt.plot([1])\n");
        assert_eq!(block.number(), 1);
    }

    #[test]
    fn fence_at_end_of_text() {
        let text = "intro\n```python\nx = 1\n```";
        let blocks = SnippetExtractor::default().extract(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].end_offset, text.len());
    }

    #[test]
    fn identical_blocks_are_distinct() {
        let text = "```python\nplt.plot([1])\n```\nmid\n```python\nplt.plot([1])\n```\n";
        let blocks = SnippetExtractor::default().extract(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].raw_source, blocks[1].raw_source);
        assert_ne!(blocks[0].start_offset, blocks[1].start_offset);
        assert_eq!(blocks[1].index, 1);
        assert!(blocks[0].end_offset <= blocks[1].start_offset);
    }

    #[test]
    fn other_languages_ignored() {
        let text = "```rust\nfn main() {}\n```\n```python\npass\n```\n";
        let blocks = SnippetExtractor::default().extract(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source().trim(), "pass");
    }

    #[test]
    fn closing_fence_needs_whitespace_after() {
        let text = "```python\na = '```x'\n```\n";
        let blocks = SnippetExtractor::default().extract(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].raw_source, "\na = '```x'\n");
    }

    #[test]
    fn source_strips_indentation() {
        let text = "```python\n    import seaborn as sns\n    sns.histplot(data['a'])\n```\n";
        let block = &SnippetExtractor::default().extract(text)[0];
        assert_eq!(block.source(), "\nimport seaborn as sns\nsns.histplot(data['a'])");
    }

    #[test]
    fn custom_language() {
        let extractor = SnippetExtractor::new("py").unwrap();
        assert_eq!(extractor.extract("```py\n1\n```").len(), 1);
        assert!(matches!(
            SnippetExtractor::new("py thon"),
            Err(ExtractError::InvalidLanguage(_))
        ));
        assert!(SnippetExtractor::new("").is_err());
    }
}
