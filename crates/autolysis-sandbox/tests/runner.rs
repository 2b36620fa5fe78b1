//! Integration tests for block execution and narrative resolution

use autolysis_narrative::{rewrite, ExecutionOutcome, SnippetExtractor};
use autolysis_sandbox::{SandboxConfig, SandboxRunner};
use autolysis_test_utils::{narrative_with_blocks, sample_table};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[test]
fn raising_block_fails_only_its_own_index() {
    let dir = tempfile::tempdir().unwrap();
    let text = "A ```python\nplt.plot([1])\n``` B ```python\nraise ValueError()\n``` C";
    let blocks = SnippetExtractor::default().extract(text);
    let outcomes = SandboxRunner::default().run_all(&blocks, &sample_table(), dir.path());

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].is_artifact());
    assert_eq!(outcomes[1], ExecutionOutcome::failure("ValueError: "));

    let rewritten = rewrite(text, &blocks, &outcomes).unwrap();
    let expected = format!(
        "A ![Graph 1]({}) B [Error in Graph 2] C",
        dir.path().join("graph_1.png").display()
    );
    assert_eq!(rewritten, expected);
}

#[test]
fn names_do_not_leak_between_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let text = narrative_with_blocks(&[
        "series = data['rainfall'].dropna()\nplt.hist(series)",
        "plt.plot(series)",
    ]);
    let blocks = SnippetExtractor::default().extract(&text);
    let outcomes = SandboxRunner::default().run_all(&blocks, &sample_table(), dir.path());

    assert!(outcomes[0].is_artifact());
    assert_eq!(
        outcomes[1].message(),
        Some("NameError: name 'series' is not defined")
    );
}

#[test]
fn figures_do_not_leak_between_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let text = narrative_with_blocks(&["plt.figure()\nplt.plot([1, 2])", "total = len(data)"]);
    let blocks = SnippetExtractor::default().extract(&text);
    let outcomes = SandboxRunner::default().run_all(&blocks, &sample_table(), dir.path());

    assert!(outcomes[0].is_artifact());
    assert_eq!(outcomes[1].message(), Some("block produced no figure"));
}

#[test]
fn identical_blocks_get_distinct_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let body = "sns.countplot(x='city', data=data)";
    let text = narrative_with_blocks(&[body, body]);
    let blocks = SnippetExtractor::default().extract(&text);
    let outcomes = SandboxRunner::default().run_all(&blocks, &sample_table(), dir.path());

    assert_eq!(
        outcomes,
        vec![
            ExecutionOutcome::artifact(dir.path().join("graph_1.png")),
            ExecutionOutcome::artifact(dir.path().join("graph_2.png")),
        ]
    );
}

#[test]
fn zero_budget_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = SnippetExtractor::default().extract("```python\nplt.plot([1, 2, 3])\n```\n");
    let runner = SandboxRunner::new(SandboxConfig::default().with_time_budget(Duration::ZERO));
    let outcome = runner.run(&blocks[0], &sample_table(), dir.path());

    assert!(outcome.message().unwrap().starts_with("timed out"), "{outcome:?}");
    assert!(!dir.path().join("graph_1.png").exists());
}

#[test]
fn png_has_configured_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = SnippetExtractor::default().extract(
        "```python\nfig, ax = plt.subplots()\nax.bar(data['city'], data['temperature'])\n```\n\
         ```python\nplt.figure(figsize=(4, 3))\nsns.heatmap(data.select_dtypes(include='number').corr())\n```\n",
    );
    let runner = SandboxRunner::new(SandboxConfig::default().with_figure_size(320, 200));
    let outcomes = runner.run_all(&blocks, &sample_table(), dir.path());

    let first = image::open(outcomes[0].path().unwrap()).unwrap();
    assert_eq!((first.width(), first.height()), (320, 200));
    let second = image::open(outcomes[1].path().unwrap()).unwrap();
    assert_eq!((second.width(), second.height()), (400, 300));
}

#[test]
fn unsupported_statement_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = SnippetExtractor::default()
        .extract("```python\nfor c in data.columns: plt.plot(data[c])\n```\n");
    let outcome = SandboxRunner::default().run(&blocks[0], &sample_table(), dir.path());
    assert_eq!(outcome.message(), Some("unsupported: for statements"));
}

#[test]
fn grouped_chart_with_pandas_and_numpy() {
    let dir = tempfile::tempdir().unwrap();
    let body = "import numpy as np\n\
                import pandas as pd\n\
                means = data.groupby('city')['temperature'].mean().sort_values()\n\
                ax = means.plot(kind='barh', figsize=(8, 5))\n\
                ax.set_xlabel('Mean temperature')\n\
                ax.axvline(np.mean(means.values), color='red')\n\
                plt.tight_layout()";
    let text = narrative_with_blocks(&[body]);
    let blocks = SnippetExtractor::default().extract(&text);
    let outcome = SandboxRunner::default().run(&blocks[0], &sample_table(), dir.path());
    assert!(outcome.is_artifact(), "{outcome:?}");
}
