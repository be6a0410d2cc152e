use casehunter_core::campaign::FuzzingCampaign;
use casehunter_core::config::{CasehunterConfig, LanguageConfig};
use casehunter_core::registry::{JobRegistry, JobSnapshot};
use casehunter_core::toolchain::{CommandToolchain, CommandToolchainConfig};

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Searches for small failing test cases of a submission",
    long_about = None
)]
struct Cli {
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
    /// Seed template the generator is driven with.
    #[clap(long)]
    seed_file: PathBuf,
    /// Submission source file. Repeat for multi-file submissions.
    #[clap(short, long = "source", required = true)]
    sources: Vec<PathBuf>,
    /// Must match the name of the configured language.
    #[clap(short, long)]
    language: Option<String>,
    #[clap(short, long)]
    trials: Option<usize>,
    #[clap(long)]
    failure_budget: Option<usize>,
    /// Write the JSON report here instead of stdout.
    #[clap(long)]
    report: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<CasehunterConfig, anyhow::Error> {
    match path {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            CasehunterConfig::load_from_file(config_path)
        }
        None => {
            let default_config_path = Path::new("config.toml");
            if default_config_path.exists() {
                info!("No config file specified, loading default {:?}", default_config_path);
                CasehunterConfig::load_from_file(default_config_path)
            } else {
                warn!(
                    "No config file specified and default 'config.toml' not found, \
                     using built-in defaults"
                );
                Ok(CasehunterConfig::default())
            }
        }
    }
}

fn resolve_language(
    configured: Option<LanguageConfig>,
    requested: Option<&str>,
) -> Result<LanguageConfig, anyhow::Error> {
    let language = configured
        .ok_or_else(|| anyhow::anyhow!("No [language] section in the configuration"))?;
    match requested {
        Some(name) if name != language.name => Err(anyhow::anyhow!(
            "Language {:?} requested but {:?} is configured",
            name,
            language.name
        )),
        _ => Ok(language),
    }
}

fn render_report(snapshot: &JobSnapshot) -> Result<String, anyhow::Error> {
    let report = serde_json::json!({
        "id": snapshot.id,
        "trials_run": snapshot.trials_run,
        "stop_reason": snapshot.stop_reason,
        "cases": snapshot.cases(),
        "outcomes": snapshot.outcomes,
    });
    Ok(serde_json::to_string_pretty(&report)?)
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(trials) = cli.trials {
        config.campaign.trial_count = trials;
    }
    if let Some(budget) = cli.failure_budget {
        config.campaign.failure_budget = budget;
    }
    let language = resolve_language(config.language.take(), cli.language.as_deref())?;
    let toolchain_settings = config
        .toolchain
        .take()
        .ok_or_else(|| anyhow::anyhow!("No [toolchain] section in the configuration"))?;

    info!(
        "Running up to {} trial(s) with a failure budget of {}",
        config.campaign.trial_count, config.campaign.failure_budget
    );

    let toolchain = CommandToolchain::new(CommandToolchainConfig::from(toolchain_settings));
    let settings = config.campaign;
    let sources = cli.sources;
    let seed_file = cli.seed_file;

    let registry = JobRegistry::new();
    let start_time = Instant::now();
    let id = registry.submit(move |context| {
        FuzzingCampaign::new(toolchain, settings, language)
            .with_cancel_token(context.cancel)
            .with_log(context.log)
            .run(&sources, &seed_file)
    })?;
    let snapshot = registry.wait(id)?;
    info!(
        "Job {} finished in {:.2?}: {} failing case(s) over {} trial(s)",
        id,
        start_time.elapsed(),
        snapshot.outcomes.len(),
        snapshot.trials_run
    );

    let rendered = render_report(&snapshot)?;
    match cli.report {
        Some(path) => {
            std::fs::write(&path, rendered)
                .map_err(|e| anyhow::anyhow!("Failed to write report to {:?}: {}", path, e))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
