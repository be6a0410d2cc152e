use crate::feedback::{
    FeedbackBundle, FeedbackError, JUDGE_MESSAGE_FILE, first_failing_case, parse_feedback,
};
use crate::layout::{CaseLayout, LayoutError, declared_cases};
use crate::randomizer::{SeedStructure, SeedTemplate};
use crate::scratch::TrialScratch;
use crate::toolchain::{Program, TimeLimits, Toolchain, ToolchainError};
use crate::verdict::{RunVerdict, VerdictError};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RunError {
    /// The judge returned without a verdict or timing; nothing was executed.
    #[error("No executions: judge reported no verdict for {0:?}")]
    NoExecution(std::path::PathBuf),
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("Feedback error: {0}")]
    Feedback(#[from] FeedbackError),
    #[error("Verdict error: {0}")]
    Verdict(#[from] VerdictError),
    #[error("Toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),
    #[error("Trial file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of one trial, with the minimized files when the run was reduced.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunOutcome {
    pub verdict: RunVerdict,
    /// Seed value drawn for this trial.
    pub seed_value: u64,
    pub seed: String,
    pub input: String,
    pub answer: String,
    /// MD5 of `input`, hex encoded.
    pub input_digest: String,
    pub feedback: FeedbackBundle,
}

/// Parameters shared by all trials of a campaign.
#[derive(Debug, Clone, Copy)]
pub struct TrialSettings {
    pub case_multiplier: usize,
    pub limits: TimeLimits,
}

struct Execution {
    verdict: RunVerdict,
    feedback: Option<String>,
}

/// One randomize, execute, minimize and verify cycle.
///
/// The trial owns its scratch files; they are removed when the run is
/// consumed by [`FuzzingRun::evaluate`], whether it succeeds or not.
pub struct FuzzingRun<'a, T: Toolchain + ?Sized> {
    toolchain: &'a mut T,
    program: &'a Program,
    template: &'a SeedTemplate,
    settings: TrialSettings,
    seed: u64,
    scratch: TrialScratch,
}

impl<'a, T: Toolchain + ?Sized> FuzzingRun<'a, T> {
    pub fn new(
        toolchain: &'a mut T,
        program: &'a Program,
        template: &'a SeedTemplate,
        settings: TrialSettings,
        data_dir: &Path,
        seed: u64,
    ) -> Self {
        Self {
            toolchain,
            program,
            template,
            settings,
            seed,
            scratch: TrialScratch::new(data_dir, seed),
        }
    }

    pub fn evaluate(mut self) -> Result<RunOutcome, RunError> {
        let _span = tracing::debug_span!("trial", seed = self.seed).entered();

        let randomized = self.template.randomize(self.settings.case_multiplier, self.seed);
        self.scratch.write_seed(&randomized)?;
        self.toolchain
            .generate_input(self.scratch.seed_file(), self.scratch.input_file())?;

        let initial = self.execute()?;
        debug!("Received initial verdict {}", initial.verdict);

        let reducible = initial.verdict.is_reducible()
            && self.template.structure() == SeedStructure::MultipleCases;
        let (verdict, feedback) = match initial.verdict {
            verdict if !reducible => (verdict, initial.feedback),
            RunVerdict::WrongAnswer => self.reduce_wrong_answer(initial)?,
            _ => self.bisect_runtime_error()?,
        };

        let input = self.scratch.read_input()?;
        let outcome = RunOutcome {
            verdict,
            seed_value: self.seed,
            seed: self.scratch.read_seed()?,
            input_digest: format!("{:x}", md5::compute(input.as_bytes())),
            input,
            answer: self.scratch.read_answer()?,
            feedback: parse_feedback(feedback.as_deref())?,
        };
        debug!("Finished run with seed {} and verdict {}", self.seed, verdict);
        Ok(outcome)
    }

    /// Regenerates the answer for the current input and judges it once.
    fn execute(&mut self) -> Result<Execution, RunError> {
        let input_file = self.scratch.input_file();
        let answer_file = self.scratch.answer_file();
        self.toolchain.generate_answer(input_file, answer_file)?;

        let report = self
            .toolchain
            .execute(self.program, input_file, answer_file, &self.settings.limits)?;
        let (Some(token), Some(_)) = (report.verdict.as_deref(), report.wall_time) else {
            return Err(RunError::NoExecution(input_file.to_path_buf()));
        };

        Ok(Execution {
            verdict: RunVerdict::classify(token)?,
            feedback: report.feedback,
        })
    }

    /// Narrows a wrong answer down to the first case the checker rejected.
    fn reduce_wrong_answer(
        &mut self,
        initial: Execution,
    ) -> Result<(RunVerdict, Option<String>), RunError> {
        debug!("Picking failing case");
        let bundle = parse_feedback(initial.feedback.as_deref())?;
        let message = bundle
            .get(JUDGE_MESSAGE_FILE)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let failing_case = first_failing_case(message, &self.scratch.read_answer()?)?;

        let input = self.scratch.read_input()?;
        let layout = CaseLayout::analyze(&input)?;
        self.scratch
            .write_input(&layout.pick_case(&input, failing_case)?)?;

        debug!("Running program again on case {}", failing_case);
        let confirmation = self.execute()?;
        Ok(verify(RunVerdict::WrongAnswer, confirmation))
    }

    /// Halves the input until a single case still raising the runtime error remains.
    fn bisect_runtime_error(&mut self) -> Result<(RunVerdict, Option<String>), RunError> {
        debug!("Searching for runtime error case");
        let input = self.scratch.read_input()?;
        let layout = CaseLayout::analyze(&input)?;
        let (mut first, mut second) = layout.split_in_half(&input)?;

        while declared_cases(&first)? != 0 {
            self.scratch.write_input(&first)?;
            let attempt = self.execute()?;
            let kept = if attempt.verdict == RunVerdict::RuntimeException {
                debug!("Runtime error occurred in first half");
                first
            } else {
                debug!("Runtime error occurred in second half");
                self.scratch.write_input(&second)?;
                second
            };
            (first, second) = layout.split_in_half(&kept)?;
        }

        debug!("Running program on isolated runtime error case");
        self.scratch.write_input(&second)?;
        let confirmation = self.execute()?;
        Ok(verify(RunVerdict::RuntimeException, confirmation))
    }
}

/// A minimized case must reproduce the verdict that triggered its minimization.
fn verify(trigger: RunVerdict, confirmation: Execution) -> (RunVerdict, Option<String>) {
    let verdict = if confirmation.verdict == trigger {
        trigger
    } else {
        tracing::warn!(
            "Minimized case returned {} instead of {}",
            confirmation.verdict,
            trigger
        );
        RunVerdict::FeedbackInconsistency
    };
    (verdict, confirmation.feedback)
}
