//! Markdown helpers

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

/// Text of the first level-1 heading, if any
#[must_use]
pub fn narrative_title(narrative: &str) -> Option<String> {
    let mut in_title = false;
    let mut title = String::new();

    for event in Parser::new(narrative) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => in_title = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if in_title => {
                let title = title.trim();
                return (!title.is_empty()).then(|| title.to_string());
            }
            Event::Text(text) | Event::Code(text) if in_title => title.push_str(&text),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_h1_found() {
        let text = "intro\n\n# Sales `2024` Report\n\n## Details\n\n# Second\n";
        assert_eq!(narrative_title(text).as_deref(), Some("Sales 2024 Report"));
    }

    #[test]
    fn no_h1() {
        assert_eq!(narrative_title("## Only a subsection\ntext"), None);
        assert_eq!(narrative_title(""), None);
    }
}
