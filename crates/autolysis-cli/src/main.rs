//! `autolysis` command-line front end

use anyhow::{Context, Result};
use autolysis_core::{
    prepare_dataset, CachedGenerator, HttpTextGenerator, NarrativeRenderer, ReportAssembler, ReportConfig,
};
use autolysis_profile::ProfileCompressor;
use autolysis_table::{profile_document, Table};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "autolysis", version, about = "Automated dataset analysis reports")]
struct Cli {
    /// TOML configuration overriding the defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Profile a CSV, ask the text service for a story and write README.md
    Report {
        dataset: PathBuf,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Print the compressed profile of a CSV as JSON
    Profile {
        dataset: PathBuf,
        /// Print the document before compression
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// Resolve the chart snippets of an existing narrative
    Render {
        narrative: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<ReportConfig> {
    match path {
        Some(path) => ReportConfig::from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(ReportConfig::default()),
    }
}

async fn report(config: ReportConfig, dataset: &Path, output_dir: &Path) -> Result<()> {
    let http = HttpTextGenerator::from_env(config.generation.clone())?;
    let generator = CachedGenerator::new(http, config.generation.cache_capacity);
    let summary = ReportAssembler::new(config, generator)
        .run(dataset, output_dir)
        .await
        .context("report failed")?;
    for failure in &summary.rendered.failures {
        info!(block = failure.block, message = %failure.message, "chart not generated");
    }
    println!("{}", summary.rendered.readme_path.display());
    Ok(())
}

async fn profile(config: &ReportConfig, dataset: &Path, raw: bool) -> Result<()> {
    let document = if raw {
        let table = Table::from_csv_path(dataset)?;
        profile_document(&table, &config.title)
    } else {
        let compressor = ProfileCompressor::new(config.compression.clone());
        let prepared = prepare_dataset(dataset, &config.title, compressor).await?;
        for record in &prepared.profile.audit {
            info!(key = %record.key, path = %record.path, count = record.count, "oversized collection");
        }
        prepared.profile.tree
    };
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn render(config: &ReportConfig, narrative: &Path, data: &Path, output_dir: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(narrative)
        .await
        .with_context(|| format!("reading {}", narrative.display()))?;
    let table = Table::from_csv_path(data)?;
    let rendered = NarrativeRenderer::from_config(config)
        .render(&text, Arc::new(table), output_dir)
        .await?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    let config = load_config(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Report { dataset, output_dir } => report(config, &dataset, &output_dir).await,
        Commands::Profile { dataset, raw } => profile(&config, &dataset, raw).await,
        Commands::Render {
            narrative,
            data,
            output_dir,
        } => render(&config, &narrative, &data, &output_dir).await,
    };
    if let Err(err) = &result {
        error!("{err:#}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn render_requires_data() {
        assert!(Cli::try_parse_from(["autolysis", "render", "story.md"]).is_err());
        let cli = Cli::try_parse_from(["autolysis", "render", "story.md", "--data", "d.csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Render { output_dir, .. } if output_dir == Path::new(".")));
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["autolysis", "profile", "d.csv", "--raw", "--config", "c.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("c.toml")));
        assert!(matches!(cli.command, Commands::Profile { raw: true, .. }));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
        assert_eq!(load_config(None).unwrap(), ReportConfig::default());
    }

    #[tokio::test]
    async fn render_writes_readme() {
        let (dir, csv) = autolysis_test_utils::sample_csv_dir();
        let story = autolysis_test_utils::write_file(
            dir.path(),
            "story.md",
            &autolysis_test_utils::narrative_with_blocks(&["plt.plot([1, 2], [3, 4])"]),
        );
        render(&ReportConfig::default(), &story, &csv, dir.path()).await.unwrap();
        assert!(dir.path().join("README.md").is_file());
        assert!(dir.path().join("graph_1.png").is_file());
    }
}
