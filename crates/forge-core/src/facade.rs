//! Orchestration Facade (§4.8): admission validation for incoming job requests.
//!
//! Grounded on the registry catalog's capability table for the enumerated-language check and
//! the resilience envelope's typed-error idiom for rejecting malformed input up front rather
//! than deep in the pipeline.

use std::sync::OnceLock;

use regex::Regex;

use crate::job::JobRequest;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("task must be 10..10000 characters, got {0}")]
    TaskLength(usize),
    #[error("task contains a disallowed substring: {0}")]
    TaskSanitization(&'static str),
    #[error("context must match ^[A-Za-z0-9_.-]+$ and be 1..200 characters")]
    InvalidContext,
    #[error("workspace must be 1..500 characters and must not contain '..' or '~'")]
    InvalidWorkspace,
    #[error("language {0} is not in the enumerated set")]
    UnsupportedLanguage(String),
    #[error("maxIterations must be 1..1000, got {0}")]
    InvalidMaxIterations(u32),
    #[error("minScore must be 0..10, got {0}")]
    InvalidMinScore(f64),
}

fn context_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap())
}

const DANGEROUS_SUBSTRINGS: &[&str] = &["<script", "javascript:", "data:", "vbscript:"];

const SUPPORTED_LANGUAGES: &[&str] =
    &["csharp", "java", "python", "javascript", "typescript", "go", "rust", "cpp"];

/// Validates an admission request per §4.8. Returns the first violated rule found, in the
/// order the rules are listed there.
pub fn validate_admission(request: &JobRequest) -> Result<(), AdmissionError> {
    if !(10..=10_000).contains(&request.task.chars().count()) {
        return Err(AdmissionError::TaskLength(request.task.chars().count()));
    }
    let lowered = request.task.to_ascii_lowercase();
    for needle in DANGEROUS_SUBSTRINGS {
        if lowered.contains(needle) {
            return Err(AdmissionError::TaskSanitization(needle));
        }
    }

    if request.context.is_empty() || request.context.chars().count() > 200 || !context_pattern().is_match(&request.context) {
        return Err(AdmissionError::InvalidContext);
    }

    let workspace_len = request.workspace.chars().count();
    if !(1..=500).contains(&workspace_len) || request.workspace.contains("..") || request.workspace.contains('~') {
        return Err(AdmissionError::InvalidWorkspace);
    }

    if let Some(language) = &request.language {
        if !SUPPORTED_LANGUAGES.iter().any(|l| l.eq_ignore_ascii_case(language)) {
            return Err(AdmissionError::UnsupportedLanguage(language.clone()));
        }
    }

    if !(1..=1000).contains(&request.max_iterations) {
        return Err(AdmissionError::InvalidMaxIterations(request.max_iterations));
    }

    if !(0.0..=10.0).contains(&request.min_score) {
        return Err(AdmissionError::InvalidMinScore(request.min_score));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ExecutionMode, ValidationMode};

    fn valid_request() -> JobRequest {
        JobRequest {
            task: "Create a Calculator class with add and subtract".into(),
            context: "csharp-calc".into(),
            workspace: "ws1".into(),
            language: Some("csharp".into()),
            max_iterations: 10,
            min_score: 8.0,
            validation_mode: ValidationMode::Standard,
            execution_mode: ExecutionMode::Batch,
            auto_write_files: true,
        }
    }

    #[test]
    fn a_well_formed_request_is_admitted() {
        assert!(validate_admission(&valid_request()).is_ok());
    }

    #[test]
    fn task_too_short_is_rejected() {
        let mut r = valid_request();
        r.task = "short".into();
        assert_eq!(validate_admission(&r), Err(AdmissionError::TaskLength(5)));
    }

    #[test]
    fn task_with_a_script_tag_is_rejected() {
        let mut r = valid_request();
        r.task = "Please run <script>alert(1)</script> in the task".into();
        assert!(matches!(validate_admission(&r), Err(AdmissionError::TaskSanitization(_))));
    }

    #[test]
    fn context_with_illegal_characters_is_rejected() {
        let mut r = valid_request();
        r.context = "has spaces".into();
        assert_eq!(validate_admission(&r), Err(AdmissionError::InvalidContext));
    }

    #[test]
    fn workspace_with_parent_traversal_is_rejected() {
        let mut r = valid_request();
        r.workspace = "../etc".into();
        assert_eq!(validate_admission(&r), Err(AdmissionError::InvalidWorkspace));
    }

    #[test]
    fn unsupported_language_is_rejected() {
        let mut r = valid_request();
        r.language = Some("cobol".into());
        assert_eq!(validate_admission(&r), Err(AdmissionError::UnsupportedLanguage("cobol".into())));
    }

    #[test]
    fn max_iterations_out_of_range_is_rejected() {
        let mut r = valid_request();
        r.max_iterations = 0;
        assert_eq!(validate_admission(&r), Err(AdmissionError::InvalidMaxIterations(0)));
    }

    #[test]
    fn min_score_out_of_range_is_rejected() {
        let mut r = valid_request();
        r.min_score = 11.0;
        assert_eq!(validate_admission(&r), Err(AdmissionError::InvalidMinScore(11.0)));
    }
}
