use crate::config::{CampaignSettings, LanguageConfig};
use crate::randomizer::{SeedError, SeedTemplate};
use crate::run::{FuzzingRun, RunError, RunOutcome, TrialSettings};
use crate::toolchain::{Compilation, TimeLimits, Toolchain, ToolchainError};
use crate::verdict::RunVerdict;
use parking_lot::Mutex;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

const TEMP_DIR_PREFIX: &str = "fuzzing-";

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Compilation failed: {0}")]
    Compile(String),
    #[error("Source {0:?} has no file name")]
    InvalidSource(PathBuf),
    #[error("Seed template error: {0}")]
    Seed(#[from] SeedError),
    #[error("Trial failed: {0}")]
    Run(#[from] RunError),
    #[error("Toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),
    #[error("Campaign directory I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared flag asking a campaign to stop before its next trial.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress lines of one campaign, readable while it runs.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog(Arc<Mutex<Vec<String>>>);

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.0.lock().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    FailureBudget,
    FeedbackInconsistency,
    TrialsExhausted,
    Cancelled,
}

/// Reduced input and reference answer of one reported case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseFiles {
    #[serde(rename = "case.in")]
    pub input: String,
    #[serde(rename = "case.ans")]
    pub answer: String,
}

/// Keys outcomes as `"<index>_<VERDICT>"`, indices starting at 1.
pub fn case_files(outcomes: &[RunOutcome]) -> BTreeMap<String, CaseFiles> {
    outcomes
        .iter()
        .enumerate()
        .map(|(index, outcome)| {
            (
                format!("{}_{}", index + 1, outcome.verdict),
                CaseFiles {
                    input: outcome.input.clone(),
                    answer: outcome.answer.clone(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignReport {
    /// Non-passing outcomes in trial order.
    pub outcomes: Vec<RunOutcome>,
    pub trials_run: usize,
    pub passed: usize,
    pub stop_reason: StopReason,
}

impl CampaignReport {
    pub fn cases(&self) -> BTreeMap<String, CaseFiles> {
        case_files(&self.outcomes)
    }
}

/// Runs a bounded sequence of trials against one submission.
///
/// The submission is compiled once into a private `fuzzing-*` directory which
/// also holds every trial's scratch files; the directory is removed when
/// [`FuzzingCampaign::run`] returns.
pub struct FuzzingCampaign<T: Toolchain> {
    toolchain: T,
    settings: CampaignSettings,
    language: LanguageConfig,
    cancel: CancelToken,
    log: ProgressLog,
}

impl<T: Toolchain> FuzzingCampaign<T> {
    pub fn new(toolchain: T, settings: CampaignSettings, language: LanguageConfig) -> Self {
        Self {
            toolchain,
            settings,
            language,
            cancel: CancelToken::new(),
            log: ProgressLog::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_log(mut self, log: ProgressLog) -> Self {
        self.log = log;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn run(
        &mut self,
        sources: &[PathBuf],
        seed_file: &Path,
    ) -> Result<CampaignReport, CampaignError> {
        let template = SeedTemplate::load(seed_file)?;

        let workspace = match &self.settings.work_dir {
            Some(parent) => tempfile::Builder::new()
                .prefix(TEMP_DIR_PREFIX)
                .tempdir_in(parent)?,
            None => tempfile::Builder::new().prefix(TEMP_DIR_PREFIX).tempdir()?,
        };
        let source_dir = workspace.path().join("source");
        let compile_dir = workspace.path().join("compile");
        let data_dir = workspace.path().join("data");
        for dir in [&source_dir, &compile_dir, &data_dir] {
            std::fs::create_dir(dir)?;
        }

        let staged = stage_sources(sources, &source_dir)?;
        self.progress(format!(
            "Compiling {} source file(s) as {}",
            staged.len(),
            self.language.name
        ));
        let program = match self.toolchain.compile(&self.language, &staged, &compile_dir)? {
            Compilation::Compiled(program) => program,
            Compilation::Failed(message) => return Err(CampaignError::Compile(message)),
        };

        let mut rng = match self.settings.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let trial = TrialSettings {
            case_multiplier: self.settings.case_multiplier,
            limits: TimeLimits {
                nominal: self.settings.time_limit(),
                high: self.settings.high_time_limit(),
            },
        };

        let mut outcomes = Vec::new();
        let mut trials_run = 0;
        let mut passed = 0;
        let mut stop_reason = StopReason::TrialsExhausted;

        for index in 1..=self.settings.trial_count {
            if self.cancel.is_cancelled() {
                self.progress(format!("Campaign cancelled after {trials_run} trial(s)"));
                stop_reason = StopReason::Cancelled;
                break;
            }

            let seed = template.draw_seed(&mut rng);
            self.progress(format!(
                "Trial {}/{} with seed {}",
                index, self.settings.trial_count, seed
            ));
            let outcome = FuzzingRun::new(
                &mut self.toolchain,
                &program,
                &template,
                trial,
                &data_dir,
                seed,
            )
            .evaluate()?;
            trials_run += 1;

            let verdict = outcome.verdict;
            if verdict == RunVerdict::Correct {
                passed += 1;
                continue;
            }
            self.progress(format!("Trial {} failed: {}", index, verdict.code()));
            outcomes.push(outcome);

            if outcomes.len() >= self.settings.failure_budget {
                stop_reason = StopReason::FailureBudget;
                break;
            }
            if verdict == RunVerdict::FeedbackInconsistency {
                warn!("Stopping campaign: feedback was inconsistent on trial {}", index);
                self.log
                    .push(format!("Feedback was inconsistent on trial {index}, stopping"));
                stop_reason = StopReason::FeedbackInconsistency;
                break;
            }
        }

        self.progress(format!(
            "Campaign finished after {} trial(s): {} failing, stop reason {:?}",
            trials_run,
            outcomes.len(),
            stop_reason
        ));
        Ok(CampaignReport {
            outcomes,
            trials_run,
            passed,
            stop_reason,
        })
    }

    fn progress(&self, line: String) {
        info!("{}", line);
        self.log.push(line);
    }
}

/// Copies the submission into `dir`, keeping file names.
fn stage_sources(sources: &[PathBuf], dir: &Path) -> Result<Vec<PathBuf>, CampaignError> {
    sources
        .iter()
        .map(|source| {
            let name = source
                .file_name()
                .ok_or_else(|| CampaignError::InvalidSource(source.clone()))?;
            let target = dir.join(name);
            std::fs::copy(source, &target)?;
            Ok(target)
        })
        .collect()
}
