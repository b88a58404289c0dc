//! Execution Sandbox Adapter (§4.4).
//!
//! Generalizes the teacher's `cargo`-specific process-wrapper idiom (`feedback/compiler.rs`,
//! now trimmed) to an arbitrary language manifest.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::accumulator::FileChange;

/// Describes how to build/run one language's generated output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageManifest {
    pub image: String,
    pub file_extension: String,
    pub build_command: String,
    pub run_command: String,
    /// Globs tried in order to detect the entry-point file.
    pub main_file_patterns: Vec<String>,
    pub skip_execution: bool,
    pub cpu_limit_millis: u32,
    pub memory_limit_mb: u32,
    pub wallclock_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    pub built: bool,
    pub build_errors: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOutcome {
    pub build: BuildResult,
    pub execute: Option<ExecuteResult>,
    pub executed: bool,
    pub skip_reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("no file in the accumulated set matched any main-file pattern")]
    MainFileNotFound,
    #[error("sandbox materialization failed: {0}")]
    Materialize(String),
    #[error("sandbox process failed: {0}")]
    Process(String),
    #[error("sandbox wallclock timeout exceeded")]
    Timeout,
}

/// Finds the entry-point file by walking `patterns` in order against the candidate paths,
/// returning the first match. Patterns are treated as simple suffix/glob-lite matches: a
/// leading `*` matches any prefix within the basename.
pub fn detect_main_file<'a>(files: &'a [&'a FileChange], patterns: &[String]) -> Option<&'a FileChange> {
    for pattern in patterns {
        for file in files {
            if matches_main_pattern(&file.path, pattern) {
                return Some(file);
            }
        }
    }
    None
}

fn matches_main_pattern(path: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        path.ends_with(suffix)
    } else {
        path == pattern
    }
}

/// Substitutes `{mainFile}` and `{className}` placeholders in a command template.
pub fn substitute_command(template: &str, main_file: &str, class_name: &str) -> String {
    template.replace("{mainFile}", main_file).replace("{className}", class_name)
}

/// Derives a class name from a main file path (file stem), used for `{className}` command
/// substitution in class-per-file languages.
pub fn class_name_from_path(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Main")
        .to_string()
}

/// Trait satisfied by any concrete sandbox transport (local process, container runtime,
/// remote execution service). The core depends only on this trait, never a transport.
#[async_trait]
pub trait SandboxAdapter: Send + Sync {
    async fn run(
        &self,
        manifest: &LanguageManifest,
        files: &[FileChange],
    ) -> Result<SandboxOutcome, SandboxError>;
}
