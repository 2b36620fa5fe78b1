//! Prompt chain
//!
//! Three prompt kinds drive a report: a question prompt asking for
//! sub-questions with variable lists, one detail prompt per listed variable,
//! and the story prompt that asks for the narrative with chart snippets.

use serde_json::Value;

const QUESTION_INSTRUCTION: &str = "Based on the Table Information, context, Variables and Alerts \
generate 5 interesting sub-questions separated by commas ended by '?', that can help predict future \
trends based on the dataset. Additionally, select variable names for each question which can help to \
find answers for the question. Provide the variable names as a list [] at the end. \
Do not return anything else.";

const STORY_INSTRUCTION: &str = "Instructions to follow: \
Create a professional narrative based on the following analysis. \
Start with a catchy title, then describe the dataset, and an overview of the analysis performed. \
Highlight key insights, their implications, and suggest actions based on these findings. \
Include up to three graphs in between the insights that best illustrate the insights points, and \
provide the code to generate these graphs in code block ```python(.*?)``` like this. \
'data' is the dataframe of file variable. Use only matplotlib.pyplot as plt and seaborn as sns. \
Each code will be executed separately so do not create dependent variables. \
Ensure the column names are accurate and the narrative is compelling. \
Begin with suspense and conclude effectively with subheadings.";

/// One sub-question and the variables it names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuestion {
    /// Question text as returned, including the bracketed list
    pub text: String,
    /// Names inside the first `[...]`, trimmed and unquoted
    pub variables: Vec<String>,
}

/// Prompt asking for sub-questions about the dataset
#[must_use]
pub fn question_prompt(summary: &Value, profile: &Value) -> String {
    let table = profile.get("table").cloned().unwrap_or_else(|| Value::Object(Default::default()));
    let variables = variable_names(profile).join(", ");
    let alerts = profile.get("alerts").cloned().unwrap_or_else(|| Value::Array(Vec::new()));
    format!(
        "context:\n{summary}\n\nTable Information:\n{table}\n\nVariables:\n{variables}\n\n\
         Alerts:\n{alerts}\n\nQuestion: {QUESTION_INSTRUCTION}"
    )
}

/// Names of the records under `variables`, in document order
#[must_use]
pub fn variable_names(profile: &Value) -> Vec<String> {
    profile
        .get("variables")
        .and_then(Value::as_object)
        .map(|vars| vars.keys().cloned().collect())
        .unwrap_or_default()
}

/// Split a sub-question response on `"?,"`
#[must_use]
pub fn parse_sub_questions(response: &str) -> Vec<SubQuestion> {
    response
        .split("?,")
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|text| SubQuestion {
            text: text.to_string(),
            variables: bracketed_names(text),
        })
        .collect()
}

fn bracketed_names(text: &str) -> Vec<String> {
    let Some(open) = text.find('[') else {
        return Vec::new();
    };
    let Some(close) = text[open..].find(']').map(|i| open + i) else {
        return Vec::new();
    };
    text[open + 1..close]
        .split(',')
        .map(|name| name.trim().trim_matches(|c| matches!(c, '\'' | '"' | '`')).trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Prompt asking for an analytic answer from one variable's record
#[must_use]
pub fn detail_prompt(variable: &str, record: &Value, sub_question: &str) -> String {
    format!(
        "Summary from data: \n {variable} : {record}\n\nSub-question: {sub_question}\
         Based on Summary from data answer the Sub-question analytically."
    )
}

/// Question/answer pair as it appears in the analysis
#[must_use]
pub fn detail_entry(sub_question: &str, answer: &str) -> String {
    format!("Question:{sub_question} \n Answer:{}", answer.trim())
}

/// Analysis text handed to the story prompt
#[must_use]
pub fn analysis(summary: &Value, details: &[String]) -> String {
    format!("dataset:{summary}\nDetailed Analysis:\n{}", details.join("\n\n"))
}

/// Prompt asking for the narrative with fenced chart snippets
#[must_use]
pub fn story_prompt(analysis: &str) -> String {
    format!("{STORY_INSTRUCTION}\n\nAnalysis:\n{analysis}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn sub_questions_with_variable_lists() {
        let response = "How does rain vary by city [city, 'rainfall']?, \
                        Is temperature rising? [year,temperature]?, Anything else?";
        let questions = parse_sub_questions(response);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].variables, vec!["city", "rainfall"]);
        assert_eq!(questions[1].variables, vec!["year", "temperature"]);
        assert!(questions[2].variables.is_empty());
    }

    #[test]
    fn blank_segments_are_dropped() {
        assert!(parse_sub_questions("  ?,  ?, ").is_empty());
    }

    #[test]
    fn unclosed_bracket_names_nothing() {
        assert!(parse_sub_questions("What about [a, b").first().unwrap().variables.is_empty());
    }

    #[test]
    fn question_prompt_lists_variables_and_alerts() {
        let profile = json!({
            "table": {"n": 10},
            "variables": {"city": {}, "rainfall": {}},
            "alerts": ["rainfall has 1 (10.0%) missing values"]
        });
        let prompt = question_prompt(&json!({"head": {}}), &profile);
        assert!(prompt.contains("Variables:\ncity, rainfall\n"));
        assert!(prompt.contains("Table Information:\n{\"n\":10}"));
        assert!(prompt.contains("missing values"));
        assert!(prompt.ends_with("Do not return anything else."));
    }

    #[test]
    fn story_prompt_embeds_analysis() {
        let text = analysis(&json!({"rows": 3}), &[detail_entry("Q1", " A1 ")]);
        assert_eq!(text, "dataset:{\"rows\":3}\nDetailed Analysis:\nQuestion:Q1 \n Answer:A1");
        let prompt = story_prompt(&text);
        assert!(prompt.contains("```python"));
        assert!(prompt.ends_with("Answer:A1\n\n"));
    }
}
