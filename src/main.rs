use anyhow::Result;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use literature_collector::config::{default_config_toml, load_config, Config};
use literature_collector::error::HarvestError;
use literature_collector::models::{KeywordJoin, Query};
use literature_collector::output::{ResultWriter, WrittenFiles};
use literature_collector::pipeline::{Harvester, RunSettings};
use literature_collector::sources::AdapterRegistry;
use literature_collector::utils::RecordMerger;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Literature Collector - Collect publications from PubMed, Crossref and OpenAlex
#[derive(Parser, Debug)]
#[command(name = "literature-collector")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "hongkongkiwi")]
#[command(about = "Collect, deduplicate and archive publications from PubMed, Crossref and OpenAlex", long_about = None)]
struct Cli {
    /// Comma-separated keywords (default: configured keyword set)
    #[arg(long, short)]
    keywords: Option<String>,

    /// Comma-separated sources: pubmed, crossref, openalex (default: all)
    #[arg(long, short)]
    sources: Option<String>,

    /// How keywords are combined
    #[arg(long, value_enum)]
    join: Option<Join>,

    /// Directory receiving the CSV and Markdown files
    #[arg(long, short)]
    output_dir: Option<PathBuf>,

    /// Records requested per page
    #[arg(long)]
    page_size: Option<usize>,

    /// Maximum pages fetched per source
    #[arg(long)]
    max_pages: Option<usize>,

    /// Deadline for the whole fetch phase in seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short)]
    quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the default configuration file and exit
    #[arg(long)]
    print_default_config: bool,
}

/// Keyword combination
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Join {
    /// Match any keyword
    Or,
    /// Match every keyword
    And,
}

impl From<Join> for KeywordJoin {
    fn from(join: Join) -> Self {
        match join {
            Join::Or => KeywordJoin::Or,
            Join::And => KeywordJoin::And,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

impl Cli {
    /// Command line flags take precedence over file and environment settings
    fn apply(&self, config: &mut Config) {
        if let Some(keywords) = &self.keywords {
            config.run.keywords = keywords.clone();
        }
        if let Some(sources) = &self.sources {
            config.run.sources = sources.clone();
        }
        if let Some(join) = self.join {
            config.run.keyword_join = join.into();
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(page_size) = self.page_size {
            config.run.page_size = page_size;
        }
        if let Some(max_pages) = self.max_pages {
            config.run.max_pages = max_pages;
        }
        if let Some(deadline_secs) = self.deadline_secs {
            config.run.deadline_secs = deadline_secs;
        }
    }
}

fn init_tracing(cli: &Cli) {
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let level = if cli.quiet { "error" } else { log_level };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("literature_collector={}", level)),
    );

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn collect(config: Config) -> Result<WrittenFiles, HarvestError> {
    let query = Query::parse(&config.run.keywords, Some(config.run.sources.as_str()))?;

    let registry =
        AdapterRegistry::from_config(&config).map_err(|e| HarvestError::Config(e.to_string()))?;
    let merger = RecordMerger::new(config.run.source_priority.clone());
    let harvester = Harvester::new(registry, merger, RunSettings::from(&config.run));

    let output = harvester.run(&query).await?;

    let writer = ResultWriter::new(&config.output.directory);
    writer.write(&output.results, Utc::now())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", default_config_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    init_tracing(&cli);

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(ExitCode::from(e.exit_code()));
        }
    };
    cli.apply(&mut config);
    tracing::debug!("Effective configuration: {:?}", config);

    match collect(config).await {
        Ok(files) => {
            println!("{}", files.csv_path.display());
            println!("{}", files.timestamped_csv_path.display());
            println!("{}", files.summary_md_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!("{}", e);
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "literature-collector",
            "--keywords",
            "tavr",
            "--join",
            "and",
            "--page-size",
            "50",
            "--output-dir",
            "out",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.run.keywords, "tavr");
        assert_eq!(config.run.keyword_join, KeywordJoin::And);
        assert_eq!(config.run.page_size, 50);
        assert_eq!(config.run.max_pages, 5);
        assert_eq!(config.output.directory, PathBuf::from("out"));
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
