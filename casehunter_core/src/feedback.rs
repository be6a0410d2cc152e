use std::collections::BTreeMap;
use thiserror::Error;

/// Feedback file holding the checker's message about the first mismatch.
pub const JUDGE_MESSAGE_FILE: &str = "judgemessage.txt";

/// Feedback files emitted by the judge, keyed by file name. Lines keep their
/// order within each file.
pub type FeedbackBundle = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("Got line {0:?} without file")]
    LineWithoutFile(String),
    #[error("no failing case found in judge message {0:?}")]
    NoFailingCase(Vec<String>),
}

/// Splits a raw feedback blob into its `=== <name>: ===` delimited files.
///
/// An empty or whitespace-only blob yields an empty bundle.
pub fn parse_feedback(raw: Option<&str>) -> Result<FeedbackBundle, FeedbackError> {
    let mut bundle = FeedbackBundle::new();
    let Some(raw) = raw.filter(|blob| !blob.trim().is_empty()) else {
        return Ok(bundle);
    };

    let mut current_file: Option<&str> = None;
    for line in raw.lines() {
        if let Some(name) = file_header(line) {
            current_file = Some(name);
            continue;
        }
        let Some(name) = current_file else {
            return Err(FeedbackError::LineWithoutFile(line.to_string()));
        };
        bundle
            .entry(name.to_string())
            .or_default()
            .push(line.trim().to_string());
    }
    Ok(bundle)
}

fn file_header(line: &str) -> Option<&str> {
    line.strip_prefix("=== ")?.strip_suffix(": ===")
}

/// Locates the 1-based index of the first failing case from a judge message.
///
/// Two message shapes are understood: `TC <n>: ...` / `Testcase <n>: ...`
/// name the case directly, while `Wrong ...` carries the failing output line
/// as its 11th token, mapped to a case by counting `Case #` lines of `answer`.
pub fn first_failing_case(judge_message: &[String], answer: &str) -> Result<usize, FeedbackError> {
    let no_case = || FeedbackError::NoFailingCase(judge_message.to_vec());
    let first_line = judge_message.first().ok_or_else(no_case)?;
    let tokens: Vec<&str> = first_line.split_whitespace().collect();

    match tokens.first().copied() {
        Some("TC") | Some("Testcase") => tokens
            .get(1)
            .and_then(|token| token.strip_suffix(':'))
            .and_then(|number| number.parse::<usize>().ok())
            .ok_or_else(no_case),
        Some("Wrong") => {
            let output_line = tokens
                .get(10)
                .and_then(|token| token.parse::<usize>().ok())
                .ok_or_else(no_case)?;
            let mut case = 0;
            for (index, line) in answer.lines().enumerate() {
                if line.starts_with("Case #") {
                    case += 1;
                }
                if index + 1 == output_line {
                    return Ok(case);
                }
            }
            Err(no_case())
        }
        _ => Err(no_case()),
    }
}
