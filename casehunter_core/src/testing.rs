//! Scripted in-memory toolchain shared by the trial and campaign tests.

use crate::config::LanguageConfig;
use crate::toolchain::{Compilation, JudgeReport, Program, TimeLimits, Toolchain, ToolchainError};
use std::path::{Path, PathBuf};
use std::time::Duration;

type Generator = Box<dyn FnMut(&str) -> String>;
type Judge = Box<dyn FnMut(&str) -> JudgeReport>;

pub(crate) struct ScriptedToolchain {
    pub compilation: Compilation,
    generator: Generator,
    judge: Judge,
    /// Inputs the judge was run on, in call order.
    pub judged_inputs: Vec<String>,
    pub compiled_sources: Vec<PathBuf>,
}

impl ScriptedToolchain {
    /// `generator` maps seed text to input text; `judge` maps input text to a report.
    pub fn new(
        generator: impl FnMut(&str) -> String + 'static,
        judge: impl FnMut(&str) -> JudgeReport + 'static,
    ) -> Self {
        Self {
            compilation: Compilation::Compiled(program()),
            generator: Box::new(generator),
            judge: Box::new(judge),
            judged_inputs: Vec::new(),
            compiled_sources: Vec::new(),
        }
    }

    /// Generator producing the same input for every seed.
    pub fn fixed_input(input: &str, judge: impl FnMut(&str) -> JudgeReport + 'static) -> Self {
        let input = input.to_string();
        Self::new(move |_| input.clone(), judge)
    }
}

pub(crate) fn program() -> Program {
    Program {
        language: "scripted".to_string(),
        command: vec!["solution".to_string()],
    }
}

pub(crate) fn limits() -> TimeLimits {
    TimeLimits {
        nominal: Duration::from_secs(1),
        high: Duration::from_secs(2),
    }
}

pub(crate) fn report(token: &str, feedback: Option<&str>) -> JudgeReport {
    JudgeReport {
        verdict: Some(token.to_string()),
        feedback: feedback.map(str::to_string),
        wall_time: Some(Duration::from_millis(5)),
    }
}

/// Case lines of a single-line input, without the count line.
pub(crate) fn cases(input: &str) -> Vec<&str> {
    input.lines().skip(1).collect()
}

/// One `Case #i: <line>` answer line per single-line case.
fn answer_for(input: &str) -> String {
    cases(input)
        .iter()
        .enumerate()
        .map(|(index, line)| format!("Case #{}: {}\n", index + 1, line))
        .collect()
}

impl Toolchain for ScriptedToolchain {
    fn compile(
        &mut self,
        _language: &LanguageConfig,
        sources: &[PathBuf],
        _out_dir: &Path,
    ) -> Result<Compilation, ToolchainError> {
        self.compiled_sources = sources.to_vec();
        Ok(self.compilation.clone())
    }

    fn generate_input(
        &mut self,
        seed_file: &Path,
        input_file: &Path,
    ) -> Result<(), ToolchainError> {
        let seed = std::fs::read_to_string(seed_file)?;
        std::fs::write(input_file, (self.generator)(&seed))?;
        Ok(())
    }

    fn generate_answer(
        &mut self,
        input_file: &Path,
        answer_file: &Path,
    ) -> Result<(), ToolchainError> {
        let input = std::fs::read_to_string(input_file)?;
        std::fs::write(answer_file, answer_for(&input))?;
        Ok(())
    }

    fn execute(
        &mut self,
        _program: &Program,
        input_file: &Path,
        _answer_file: &Path,
        _limits: &TimeLimits,
    ) -> Result<JudgeReport, ToolchainError> {
        let input = std::fs::read_to_string(input_file)?;
        let report = (self.judge)(&input);
        self.judged_inputs.push(input);
        Ok(report)
    }
}
