//! `std::process` backed invoker.

use super::{authenticated_url, github, ProcessInvoker};
use crate::error::{ErrorContext, NormalizationErrorKind, ReconcileError, Result};
use crate::model::{ScannerSource, ScannerSpec};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Bytes of stderr kept in error messages
const STDERR_TAIL: usize = 2048;

/// Runs `git` and scanner binaries on the local machine.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    git: String,
    shell: String,
    clone_timeout: Duration,
    github_api: String,
}

impl Default for CommandInvoker {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            shell: "sh".to_string(),
            clone_timeout: Duration::from_secs(600),
            github_api: github::GITHUB_API.to_string(),
        }
    }
}

impl CommandInvoker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }

    /// GitHub API base for dependency-graph scanners (GitHub Enterprise).
    #[must_use]
    pub fn with_github_api(mut self, base: impl Into<String>) -> Self {
        self.github_api = base.into();
        self
    }
}

impl ProcessInvoker for CommandInvoker {
    fn clone_repository(&self, url: &str, token: Option<&str>, dest: &Path) -> Result<PathBuf> {
        let acquisition = |message: String| ReconcileError::RepositoryAcquisition {
            url: url.to_string(),
            message,
        };

        if dest.exists() {
            std::fs::remove_dir_all(dest)
                .map_err(|e| acquisition(format!("cannot clear {}: {e}", dest.display())))?;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReconcileError::io(parent, e))?;
        }

        tracing::info!(url, dest = %dest.display(), "Cloning repository");
        let mut command = Command::new(&self.git);
        command
            .args(["clone", "--depth", "1", "--quiet"])
            .arg(authenticated_url(url, token))
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0");

        match run_with_timeout(&mut command, self.clone_timeout) {
            Ok(()) => Ok(dest.to_path_buf()),
            Err(RunError::Timeout) => Err(acquisition(format!(
                "git clone timed out after {:?}",
                self.clone_timeout
            ))),
            // stderr may echo the authenticated URL
            Err(RunError::Failed(stderr)) => Err(acquisition(redact(&stderr, token))),
            Err(RunError::Spawn(e)) => Err(acquisition(format!("cannot run git: {e}"))),
        }
    }

    fn run_scanner(
        &self,
        spec: &ScannerSpec,
        repo: &Path,
        commands: &[String],
    ) -> Result<serde_json::Value> {
        let scanner = spec.id.as_str();
        let started = Instant::now();

        for pre in commands {
            tracing::info!(scanner, command = %pre, "Running pre-scan command");
            let mut command = Command::new(&self.shell);
            command.arg("-c").arg(pre).current_dir(repo);
            let remaining = spec.timeout().saturating_sub(started.elapsed());
            run_with_timeout(&mut command, remaining).map_err(|e| match e {
                RunError::Timeout => ReconcileError::scanner_timeout(scanner, spec.timeout()),
                RunError::Failed(stderr) => {
                    ReconcileError::scanner_execution(scanner, format!("`{pre}` failed: {stderr}"))
                }
                RunError::Spawn(e) => {
                    ReconcileError::scanner_execution(scanner, format!("cannot run `{pre}`: {e}"))
                }
            })?;
        }

        let output = tempfile::Builder::new()
            .prefix(&format!("{scanner}-"))
            .suffix(".json")
            .tempfile()
            .context("creating scanner output file")?;
        let argv = spec.render_command(
            &repo.to_string_lossy(),
            &output.path().to_string_lossy(),
        );
        let Some((program, args)) = argv.split_first() else {
            return Err(ReconcileError::scanner_execution(scanner, "empty command"));
        };

        tracing::info!(scanner, program = %program, "Running scanner");
        let mut command = Command::new(program);
        command.args(args).current_dir(repo);
        let remaining = spec.timeout().saturating_sub(started.elapsed());
        run_with_timeout(&mut command, remaining).map_err(|e| match e {
            RunError::Timeout => ReconcileError::scanner_timeout(scanner, spec.timeout()),
            RunError::Failed(stderr) => ReconcileError::scanner_execution(scanner, stderr),
            RunError::Spawn(e) => {
                ReconcileError::scanner_execution(scanner, format!("cannot run {program}: {e}"))
            }
        })?;

        let file = File::open(output.path()).map_err(|e| ReconcileError::io(output.path(), e))?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            ReconcileError::normalization(
                format!("{scanner} output"),
                NormalizationErrorKind::InvalidJson(e.to_string()),
            )
        })
    }

    fn fetch_sbom(
        &self,
        spec: &ScannerSpec,
        repo_url: &str,
        token: Option<&str>,
    ) -> Result<serde_json::Value> {
        match spec.source {
            #[cfg(feature = "authority")]
            ScannerSource::GithubDependencyGraph => {
                github::fetch_dependency_graph_sbom(&self.github_api, repo_url, token, spec.timeout())
                    .map_err(|e| ReconcileError::scanner_execution(spec.id.as_str(), e.to_string()))
            }
            #[cfg(not(feature = "authority"))]
            ScannerSource::GithubDependencyGraph => {
                let _ = (repo_url, token, &self.github_api);
                Err(ReconcileError::scanner_execution(
                    spec.id.as_str(),
                    "built without the `authority` feature, GitHub fetches are unavailable",
                ))
            }
            ScannerSource::Command => Err(ReconcileError::scanner_execution(
                spec.id.as_str(),
                "command scanners run through run_scanner",
            )),
        }
    }
}

enum RunError {
    Spawn(std::io::Error),
    Timeout,
    Failed(String),
}

/// Run to completion or kill at `timeout`. Stderr goes to an anonymous file
/// so a chatty child cannot block on a full pipe.
fn run_with_timeout(command: &mut Command, timeout: Duration) -> std::result::Result<(), RunError> {
    let mut stderr = tempfile::tempfile().map_err(RunError::Spawn)?;
    let stderr_handle = stderr.try_clone().map_err(RunError::Spawn)?;
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_handle))
        .spawn()
        .map_err(RunError::Spawn)?;

    let status = wait_with_deadline(&mut child, Instant::now() + timeout)?;
    if status.success() {
        return Ok(());
    }

    let mut text = String::new();
    let _ = stderr.seek(SeekFrom::Start(0));
    let _ = stderr.read_to_string(&mut text);
    let text = text.trim();
    let tail = if text.len() > STDERR_TAIL {
        let mut start = text.len() - STDERR_TAIL;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        &text[start..]
    } else {
        text
    };
    Err(RunError::Failed(format!("exit status {status}: {tail}")))
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
) -> std::result::Result<std::process::ExitStatus, RunError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => return Err(RunError::Spawn(e)),
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::Timeout);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn redact(text: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => text.replace(token, "***"),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScannerId, SchemaFamily};

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("fatal: https://s3cret@github.com", Some("s3cret")),
            "fatal: https://***@github.com"
        );
        assert_eq!(redact("plain", None), "plain");
    }

    #[test]
    fn test_fetch_needs_github_remote() {
        let invoker = CommandInvoker::new();
        let ghas = ScannerSpec::github_dependency_graph(ScannerId::ghas());
        let err = invoker.fetch_sbom(&ghas, "/srv/git/app", None).unwrap_err();
        assert!(err.to_string().contains("ghas"));

        let trivy = ScannerSpec::new(ScannerId::trivy(), &["trivy"], SchemaFamily::CycloneDx);
        assert!(invoker.fetch_sbom(&trivy, "https://github.com/o/r", None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_scanner_output_is_read() {
        let repo = tempfile::tempdir().unwrap();
        let spec = ScannerSpec::new(
            ScannerId::new("echo"),
            &["sh", "-c", r#"echo '{"bomFormat":"CycloneDX","components":[]}' > "$0""#, "{output}"],
            SchemaFamily::CycloneDx,
        );
        let doc = CommandInvoker::new()
            .run_scanner(&spec, repo.path(), &[])
            .unwrap();
        assert_eq!(doc["bomFormat"], "CycloneDX");
    }

    #[cfg(unix)]
    #[test]
    fn test_scanner_failure_and_timeout() {
        let repo = tempfile::tempdir().unwrap();
        let failing = ScannerSpec::new(
            ScannerId::new("bad"),
            &["sh", "-c", "echo boom >&2; exit 3"],
            SchemaFamily::Auto,
        );
        let err = CommandInvoker::new()
            .run_scanner(&failing, repo.path(), &[])
            .unwrap_err();
        assert!(err.to_string().contains("bad"));
        assert!(!err.is_timeout());

        let slow = ScannerSpec::new(ScannerId::new("slow"), &["sleep", "5"], SchemaFamily::Auto)
            .with_timeout_secs(0);
        let err = CommandInvoker::new()
            .run_scanner(&slow, repo.path(), &[])
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[cfg(unix)]
    #[test]
    fn test_pre_commands_run_in_repo() {
        let repo = tempfile::tempdir().unwrap();
        let spec = ScannerSpec::new(
            ScannerId::new("cat"),
            &["sh", "-c", r#"cat marker.json > "$0""#, "{output}"],
            SchemaFamily::Auto,
        );
        let doc = CommandInvoker::new()
            .run_scanner(
                &spec,
                repo.path(),
                &[r#"echo '{"ok":true}' > marker.json"#.to_string()],
            )
            .unwrap();
        assert_eq!(doc["ok"], true);
    }
}
