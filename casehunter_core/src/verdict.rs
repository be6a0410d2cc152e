use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerdictError {
    /// The judge reported a token outside the known verdict vocabulary.
    #[error("Unknown judge verdict {0:?}")]
    Unknown(String),
}

/// Classification of a single execution of a submission.
///
/// Every variant except [`RunVerdict::FeedbackInconsistency`] corresponds to a
/// judge token. The inconsistency verdict is only produced when a minimized
/// case fails to reproduce the verdict that triggered its minimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunVerdict {
    Correct,
    WrongAnswer,
    RuntimeException,
    TimeLimitExceeded,
    CompileError,
    JudgeError,
    FeedbackInconsistency,
}

impl RunVerdict {
    /// Maps a judge token to its verdict.
    pub fn classify(token: &str) -> Result<Self, VerdictError> {
        match token.trim() {
            "AC" => Ok(RunVerdict::Correct),
            "WA" => Ok(RunVerdict::WrongAnswer),
            "RTE" | "RT" => Ok(RunVerdict::RuntimeException),
            "TLE" | "TL" => Ok(RunVerdict::TimeLimitExceeded),
            "CE" => Ok(RunVerdict::CompileError),
            "JE" => Ok(RunVerdict::JudgeError),
            other => Err(VerdictError::Unknown(other.to_string())),
        }
    }

    /// Short code used in logs and judge output.
    pub fn code(&self) -> &'static str {
        match self {
            RunVerdict::Correct => "AC",
            RunVerdict::WrongAnswer => "WA",
            RunVerdict::RuntimeException => "RTE",
            RunVerdict::TimeLimitExceeded => "TLE",
            RunVerdict::CompileError => "CE",
            RunVerdict::JudgeError => "JE",
            RunVerdict::FeedbackInconsistency => "INC",
        }
    }

    /// Whether a failing run with this verdict gets minimized.
    pub fn is_reducible(&self) -> bool {
        matches!(self, RunVerdict::WrongAnswer | RunVerdict::RuntimeException)
    }
}

impl fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunVerdict::Correct => "CORRECT",
            RunVerdict::WrongAnswer => "WRONG_ANSWER",
            RunVerdict::RuntimeException => "RUNTIME_EXCEPTION",
            RunVerdict::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            RunVerdict::CompileError => "COMPILE_ERROR",
            RunVerdict::JudgeError => "JUDGE_ERROR",
            RunVerdict::FeedbackInconsistency => "FEEDBACK_INCONSISTENCY",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judge_tokens_map_to_verdicts() {
        let expected = [
            ("AC", RunVerdict::Correct),
            ("WA", RunVerdict::WrongAnswer),
            ("RTE", RunVerdict::RuntimeException),
            ("RT", RunVerdict::RuntimeException),
            ("TLE", RunVerdict::TimeLimitExceeded),
            ("TL", RunVerdict::TimeLimitExceeded),
            ("CE", RunVerdict::CompileError),
            ("JE", RunVerdict::JudgeError),
        ];
        for (token, verdict) in expected {
            assert_eq!(
                RunVerdict::classify(token),
                Ok(verdict),
                "token {token} should classify as {verdict}"
            );
        }
    }

    #[test]
    fn inconsistency_is_never_accepted_from_the_judge() {
        assert_eq!(
            RunVerdict::classify("INC"),
            Err(VerdictError::Unknown("INC".to_string()))
        );
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        assert!(matches!(
            RunVerdict::classify("OK"),
            Err(VerdictError::Unknown(token)) if token == "OK"
        ));
        assert!(RunVerdict::classify("").is_err());
        assert!(RunVerdict::classify("wa").is_err());
    }

    #[test]
    fn display_uses_verdict_names() {
        assert_eq!(RunVerdict::WrongAnswer.to_string(), "WRONG_ANSWER");
        assert_eq!(
            RunVerdict::FeedbackInconsistency.to_string(),
            "FEEDBACK_INCONSISTENCY"
        );
        assert_eq!(
            serde_json::to_string(&RunVerdict::RuntimeException).unwrap(),
            "\"RUNTIME_EXCEPTION\""
        );
    }

    #[test]
    fn only_wrong_answers_and_runtime_errors_are_reduced() {
        assert!(RunVerdict::WrongAnswer.is_reducible());
        assert!(RunVerdict::RuntimeException.is_reducible());
        assert!(!RunVerdict::TimeLimitExceeded.is_reducible());
        assert!(!RunVerdict::Correct.is_reducible());
    }
}
