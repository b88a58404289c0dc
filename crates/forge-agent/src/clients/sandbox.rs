//! Process-based `SandboxAdapter` (§4.4): materializes accumulated files into a scratch
//! directory, runs the language manifest's build/run commands via `tokio::process::Command`.
//!
//! Commands are split with `shlex::split` and invoked as `Command::new(argv[0]).args(...)`
//! rather than through a shell, so no manifest-supplied or substituted text can inject
//! additional commands — grounded on `dashflow-shell-tool`'s `parse_command_words` idiom.
//! Subprocess invocation itself follows `orchestrator.rs`'s `git_commit_changes` pattern
//! (`tokio::process::Command::new(...).current_dir(...).output().await`).

use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use forge_core::accumulator::FileChange;
use forge_core::sandbox::{detect_main_file, substitute_command, BuildResult, ExecuteResult, LanguageManifest, SandboxAdapter, SandboxError, SandboxOutcome};

pub struct ProcessSandboxAdapter;

impl ProcessSandboxAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn materialize(&self, dir: &std::path::Path, files: &[FileChange]) -> Result<(), SandboxError> {
        for file in files {
            let path = dir.join(&file.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| SandboxError::Materialize(e.to_string()))?;
            }
            tokio::fs::write(&path, &file.content).await.map_err(|e| SandboxError::Materialize(e.to_string()))?;
        }
        Ok(())
    }

    async fn run_command(&self, dir: &std::path::Path, command: &str, timeout: Duration) -> Result<(std::process::ExitStatus, String, String), SandboxError> {
        let words = shlex::split(command).ok_or_else(|| SandboxError::Process("failed to parse command (unbalanced quotes or invalid escapes)".to_string()))?;
        let (program, args) = words.split_first().ok_or_else(|| SandboxError::Process("empty command".to_string()))?;

        let output = tokio::time::timeout(timeout, tokio::process::Command::new(program).args(args).current_dir(dir).output())
            .await
            .map_err(|_| SandboxError::Timeout)?
            .map_err(|e| SandboxError::Process(e.to_string()))?;

        Ok((output.status, String::from_utf8_lossy(&output.stdout).to_string(), String::from_utf8_lossy(&output.stderr).to_string()))
    }
}

impl Default for ProcessSandboxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxAdapter for ProcessSandboxAdapter {
    async fn run(&self, manifest: &LanguageManifest, files: &[FileChange]) -> Result<SandboxOutcome, SandboxError> {
        let workdir = TempDir::new().map_err(|e| SandboxError::Materialize(e.to_string()))?;
        self.materialize(workdir.path(), files).await?;

        let refs: Vec<&FileChange> = files.iter().collect();
        let main_file = detect_main_file(&refs, &manifest.main_file_patterns).ok_or(SandboxError::MainFileNotFound)?;
        let class_name = forge_core::sandbox::class_name_from_path(&main_file.path);

        let build_command = substitute_command(&manifest.build_command, &main_file.path, &class_name);
        let (build_status, build_stdout, build_stderr) = self.run_command(workdir.path(), &build_command, manifest.wallclock_timeout).await?;

        let build = BuildResult {
            built: build_status.success(),
            build_errors: if build_status.success() { Vec::new() } else { vec![build_stderr.clone()] },
            stdout: build_stdout,
            stderr: build_stderr,
        };

        if !build.built || manifest.skip_execution {
            let skip_reason = if !build.built {
                Some("build failed".to_string())
            } else {
                Some("manifest declares skip_execution".to_string())
            };
            return Ok(SandboxOutcome { build, execute: None, executed: false, skip_reason });
        }

        let run_command = substitute_command(&manifest.run_command, &main_file.path, &class_name);
        let started = std::time::Instant::now();
        let (run_status, run_stdout, run_stderr) = self.run_command(workdir.path(), &run_command, manifest.wallclock_timeout).await?;

        let execute = ExecuteResult {
            exit_code: run_status.code(),
            stdout: run_stdout,
            stderr: run_stderr,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        Ok(SandboxOutcome { build, execute: Some(execute), executed: true, skip_reason: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::accumulator::ChangeType;

    fn manifest() -> LanguageManifest {
        LanguageManifest {
            image: "rust:latest".into(),
            file_extension: "rs".into(),
            build_command: "true".into(),
            run_command: "true".into(),
            main_file_patterns: vec!["*main.rs".into()],
            skip_execution: false,
            cpu_limit_millis: 1000,
            memory_limit_mb: 512,
            wallclock_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn missing_main_file_is_an_error() {
        let adapter = ProcessSandboxAdapter::new();
        let files = vec![FileChange { path: "src/lib.rs".into(), content: String::new(), change_type: ChangeType::Created, reason: None }];
        let err = adapter.run(&manifest(), &files).await.unwrap_err();
        assert!(matches!(err, SandboxError::MainFileNotFound));
    }

    #[tokio::test]
    async fn successful_build_skips_execution_when_manifest_says_so() {
        let adapter = ProcessSandboxAdapter::new();
        let mut m = manifest();
        m.skip_execution = true;
        let files = vec![FileChange { path: "src/main.rs".into(), content: "fn main() {}".into(), change_type: ChangeType::Created, reason: None }];
        let outcome = adapter.run(&m, &files).await.unwrap();
        assert!(outcome.build.built);
        assert!(!outcome.executed);
        assert_eq!(outcome.skip_reason.as_deref(), Some("manifest declares skip_execution"));
    }
}
