use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CampaignSettings {
    #[serde(default = "default_trial_count")]
    pub trial_count: usize,
    #[serde(default = "default_failure_budget")]
    pub failure_budget: usize,
    /// Case count written into randomized multi-case seeds.
    #[serde(default = "default_case_multiplier")]
    pub case_multiplier: usize,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
    #[serde(default = "default_high_limit_factor")]
    pub high_limit_factor: u32,
    /// Fixes the seed stream of the campaign, for reproducible runs.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// Parent of the temporary campaign directory. System temp dir if unset.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

pub fn default_trial_count() -> usize {
    10
}
pub fn default_failure_budget() -> usize {
    3
}
pub fn default_case_multiplier() -> usize {
    200
}
fn default_time_limit_ms() -> u64 {
    1000
}
fn default_high_limit_factor() -> u32 {
    2
}

impl CampaignSettings {
    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }

    pub fn high_time_limit(&self) -> Duration {
        self.time_limit() * self.high_limit_factor
    }
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            trial_count: default_trial_count(),
            failure_budget: default_failure_budget(),
            case_multiplier: default_case_multiplier(),
            time_limit_ms: default_time_limit_ms(),
            high_limit_factor: default_high_limit_factor(),
            rng_seed: None,
            work_dir: None,
        }
    }
}

/// Resolved language of a submission. Passed into the campaign once; nothing
/// looks languages up while trials run.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct LanguageConfig {
    pub name: String,
    /// Compile command template. Empty for interpreted languages.
    #[serde(default)]
    pub compile: Vec<String>,
    /// Command template running the compiled program.
    pub run: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ToolchainSettings {
    pub generate_input: Vec<String>,
    pub generate_answer: Vec<String>,
    pub judge: Vec<String>,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    pub working_dir: Option<PathBuf>,
}

fn default_command_timeout_ms() -> u64 {
    60_000
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CasehunterConfig {
    #[serde(default)]
    pub campaign: CampaignSettings,
    #[serde(default)]
    pub language: Option<LanguageConfig>,
    #[serde(default)]
    pub toolchain: Option<ToolchainSettings>,
}

impl CasehunterConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: CasehunterConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}
