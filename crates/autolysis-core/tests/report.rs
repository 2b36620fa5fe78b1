//! End-to-end report runs against a scripted text service

use async_trait::async_trait;
use autolysis_core::{GenerationError, ReportAssembler, ReportConfig, ReportError, TextGenerator, README_FILE};
use autolysis_test_utils::sample_csv_dir;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

type Responder = Box<dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync>;

/// Answers prompts with a closure and records every prompt it saw
struct ScriptedGenerator {
    respond: Responder,
    prompts: Mutex<Vec<(String, u32)>>,
}

impl ScriptedGenerator {
    fn new(respond: impl Fn(&str) -> Result<String, GenerationError> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        self.prompts.lock().push((prompt.to_string(), max_tokens));
        (self.respond)(prompt)
    }
}

const STORY: &str = "# The Weather Files\n\n\
Rain differs wildly.\n\n\
```python\nsns.barplot(x='city', y='rainfall', data=data)\nplt.title('Rainfall')\n```\n\n\
Temperatures climb.\n\n\
```python\nraise ValueError('no trend')\n```\n\nFin.";

fn scripted() -> ScriptedGenerator {
    ScriptedGenerator::new(|prompt| {
        if prompt.starts_with("context:") {
            Ok("How does rain vary [city, rainfall]?, Is it warming [temperature, unknown]?".to_string())
        } else if prompt.starts_with("Summary from data") {
            if prompt.contains("temperature :") {
                Err(GenerationError::Status {
                    status: 500,
                    body: "overloaded".into(),
                })
            } else {
                Ok(" It varies. ".to_string())
            }
        } else {
            Ok(STORY.to_string())
        }
    })
}

#[tokio::test]
async fn full_run_writes_rewritten_readme() {
    let (dir, csv) = sample_csv_dir();
    let assembler = ReportAssembler::new(ReportConfig::default(), scripted());
    let summary = assembler.run(&csv, dir.path()).await.unwrap();

    assert_eq!(summary.sub_questions, 2);
    assert_eq!(summary.detail_answers, 2);
    assert_eq!(summary.rendered.block_count, 2);
    assert_eq!(summary.rendered.title.as_deref(), Some("The Weather Files"));
    assert_eq!(summary.rendered.failures.len(), 1);
    assert_eq!(summary.rendered.failures[0].block, 2);
    assert_eq!(summary.rendered.failures[0].message, "ValueError: no trend");

    let graph = dir.path().join("graph_1.png");
    assert_eq!(summary.rendered.artifacts, vec![graph.clone()]);
    assert!(graph.is_file());

    let readme = std::fs::read_to_string(dir.path().join(README_FILE)).unwrap();
    let expected = format!(
        "# The Weather Files\n\nRain differs wildly.\n\n![Graph 1]({})\n\nTemperatures climb.\n\n[Error in Graph 2]\n\nFin.\n",
        graph.display()
    );
    assert_eq!(readme, expected);
}

#[tokio::test]
async fn prompt_chain_order_and_limits() {
    let (dir, csv) = sample_csv_dir();
    let assembler = ReportAssembler::new(ReportConfig::default(), scripted());
    assembler.run(&csv, dir.path()).await.unwrap();

    let prompts = assembler.generator().prompts.lock().clone();
    // question, city, rainfall, temperature (failed), story; `unknown` is not a variable
    assert_eq!(prompts.len(), 5);
    assert!(prompts[0].0.contains("Variables:\ncity, year, rainfall, temperature, coastal"));
    assert_eq!(prompts[0].1, 1000);
    assert!(prompts[1].0.starts_with("Summary from data: \n city :"));
    let story = &prompts[4];
    assert_eq!(story.1, 2000);
    assert!(story.0.contains("Question:How does rain vary [city, rainfall] \n Answer:It varies."));
    assert!(!story.0.contains("overloaded"));
}

#[tokio::test]
async fn question_failure_writes_nothing() {
    let (dir, csv) = sample_csv_dir();
    let failing = ScriptedGenerator::new(|_| Err(GenerationError::Transport("connection refused".into())));
    let err = ReportAssembler::new(ReportConfig::default(), failing)
        .run(&csv, dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::Generation(GenerationError::Transport(_))));
    assert!(!dir.path().join(README_FILE).exists());
}

#[tokio::test]
async fn story_failure_writes_nothing() {
    let (dir, csv) = sample_csv_dir();
    let generator = ScriptedGenerator::new(|prompt| {
        if prompt.starts_with("Instructions") {
            Err(GenerationError::Malformed("missing choices[0].message.content".into()))
        } else {
            Ok("Nothing here?".to_string())
        }
    });
    let err = ReportAssembler::new(ReportConfig::default(), generator)
        .run(&csv, dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::Generation(GenerationError::Malformed(_))));
    assert!(!dir.path().join(README_FILE).exists());
}

#[tokio::test]
async fn required_visuals_reject_plain_story() {
    let (dir, csv) = sample_csv_dir();
    let generator = ScriptedGenerator::new(|_| Ok("# Plain\nNo charts at all.".to_string()));
    let config = ReportConfig::default().with_require_visuals(true);
    let err = ReportAssembler::new(config, generator)
        .run(&csv, dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::EmptyNarrative));
    assert!(!dir.path().join(README_FILE).exists());
}

#[tokio::test]
async fn missing_dataset_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReportAssembler::new(ReportConfig::default(), scripted())
        .run(&dir.path().join("absent.csv"), dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Input(_)));
}
