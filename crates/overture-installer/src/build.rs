//! Build subprocesses.
//!
//! Every step is a [`BuildCommand`] with a discrete argument vector; nothing
//! is passed through a shell. Output is streamed line by line into the build
//! log and mirrored to `tracing` at DEBUG.

use async_trait::async_trait;
use overture_core::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lines of build output carried by [`Error::BuildFailed`].
pub const EXCERPT_LINES: usize = 40;

/// One build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    /// Step name used in logs and errors (`configure`, `make`, ...).
    pub step: String,
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments, one element per argument.
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: PathBuf,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl BuildCommand {
    /// A step running `program` in `working_dir`.
    #[must_use]
    pub fn new(step: impl Into<String>, program: impl Into<PathBuf>, working_dir: &Path) -> Self {
        Self {
            step: step.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.to_path_buf(),
            env: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code; `None` when killed by a signal or never started.
    pub exit_code: Option<i32>,
}

impl CommandOutcome {
    /// Exit code 0.
    #[must_use]
    pub const fn success() -> Self {
        Self { exit_code: Some(0) }
    }

    /// Whether the step succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Executes build steps.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, appending its output to `log`.
    ///
    /// A non-zero exit is an ordinary outcome, not an error.
    ///
    /// # Errors
    /// Returns error if the log cannot be written.
    async fn run(&self, command: &BuildCommand, log: &Path) -> Result<CommandOutcome>;
}

/// Runs steps as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

async fn open_log(log: &Path) -> Result<tokio::fs::File> {
    if let Some(parent) = log.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .await
        .map_err(|e| Error::io(log, e))
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &BuildCommand, log: &Path) -> Result<CommandOutcome> {
        let mut out = open_log(log).await?;
        let header = format!("$ {command}\n");
        out.write_all(header.as_bytes())
            .await
            .map_err(|e| Error::io(log, e))?;
        info!(step = %command.step, command = %command, "running build step");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(step = %command.step, error = %e, "failed to start build step");
                let line = format!("failed to start {}: {e}\n", command.program.display());
                out.write_all(line.as_bytes())
                    .await
                    .map_err(|e| Error::io(log, e))?;
                return Ok(CommandOutcome { exit_code: None });
            }
        };

        let (tx, mut rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, tx.clone()));
        }
        drop(tx);

        while let Some(line) = rx.recv().await {
            debug!(step = %command.step, "{line}");
            out.write_all(line.as_bytes())
                .await
                .map_err(|e| Error::io(log, e))?;
            out.write_all(b"\n").await.map_err(|e| Error::io(log, e))?;
        }
        out.flush().await.map_err(|e| Error::io(log, e))?;

        let status = child.wait().await.map_err(|e| Error::io(&command.working_dir, e))?;
        debug!(step = %command.step, status = %status, "build step finished");
        Ok(CommandOutcome {
            exit_code: status.code(),
        })
    }
}

/// Forward `reader` to `tx` line by line until EOF.
///
/// Lines are decoded lossily. The pipe is drained even after the receiver
/// goes away so the child never sees a closed pipe.
async fn pump_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarding = true;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if !forwarding {
                    continue;
                }
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    forwarding = false;
                }
            }
            Err(e) => {
                debug!(error = %e, "build output pipe closed");
                break;
            }
        }
    }
}

/// Log file for building `target` at `version`.
#[must_use]
pub fn log_path(logs_dir: &Path, target: &str, version: &str) -> PathBuf {
    logs_dir.join(format!("{target}-{version}.log"))
}

/// Last `n` lines of `log`; empty when the log cannot be read.
pub async fn tail(log: &Path, n: usize) -> Vec<String> {
    let Ok(bytes) = tokio::fs::read(log).await else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| (*l).to_string()).collect()
}

/// Run `steps` in order, stopping at the first failure.
///
/// # Errors
/// Returns [`Error::BuildFailed`] naming the failing step, its exit code, the
/// log path and the tail of the log.
pub async fn run_steps(
    runner: &dyn CommandRunner,
    target: &str,
    steps: &[BuildCommand],
    log: &Path,
) -> Result<()> {
    for step in steps {
        let outcome = runner.run(step, log).await?;
        if !outcome.is_success() {
            warn!(build = target, step = %step.step, exit_code = ?outcome.exit_code, "build step failed");
            return Err(Error::BuildFailed {
                target: target.to_string(),
                step: step.step.clone(),
                exit_code: outcome.exit_code,
                log_path: log.to_path_buf(),
                excerpt: tail(log, EXCERPT_LINES).await,
            });
        }
    }
    Ok(())
}

/// configure, make, make install for a PHP source tree.
#[must_use]
pub fn php_source_steps(
    source_dir: &Path,
    prefix: &Path,
    configure_flags: &[String],
    jobs: usize,
) -> Vec<BuildCommand> {
    vec![
        BuildCommand::new("configure", source_dir.join("configure"), source_dir)
            .arg(format!("--prefix={}", prefix.display()))
            .arg(format!("--with-config-file-path={}", prefix.join("etc").display()))
            .arg(format!(
                "--with-config-file-scan-dir={}",
                prefix.join("etc").join("conf.d").display()
            ))
            .args(configure_flags.iter().cloned()),
        BuildCommand::new("make", "make", source_dir).arg(format!("-j{}", jobs.max(1))),
        BuildCommand::new("make install", "make", source_dir).arg("install"),
    ]
}

/// phpize, configure, make, make install for an extension against `php_prefix`.
#[must_use]
pub fn extension_steps(source_dir: &Path, php_prefix: &Path, jobs: usize) -> Vec<BuildCommand> {
    let bin = php_prefix.join("bin");
    vec![
        BuildCommand::new("phpize", bin.join("phpize"), source_dir),
        BuildCommand::new("configure", source_dir.join("configure"), source_dir)
            .arg(format!("--with-php-config={}", bin.join("php-config").display())),
        BuildCommand::new("make", "make", source_dir).arg(format!("-j{}", jobs.max(1))),
        BuildCommand::new("make install", "make", source_dir).arg("install"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn configure_flags_stay_discrete() {
        let steps = php_source_steps(
            Path::new("/src/php-8.3.4"),
            Path::new("/home/v/8.3.4"),
            &["--with-pgsql=/opt/pg 16".to_string()],
            0,
        );
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].program, PathBuf::from("/src/php-8.3.4/configure"));
        assert_eq!(
            steps[0].args,
            vec![
                "--prefix=/home/v/8.3.4",
                "--with-config-file-path=/home/v/8.3.4/etc",
                "--with-config-file-scan-dir=/home/v/8.3.4/etc/conf.d",
                "--with-pgsql=/opt/pg 16",
            ]
        );
        assert_eq!(steps[1].args, vec!["-j1"]);
        assert_eq!(steps[2].to_string(), "make install");
    }

    #[test]
    fn extension_steps_use_the_target_php() {
        let steps = extension_steps(Path::new("/tmp/redis"), Path::new("/v/8.2.1"), 4);
        let names: Vec<&str> = steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(names, vec!["phpize", "configure", "make", "make install"]);
        assert_eq!(steps[0].program, PathBuf::from("/v/8.2.1/bin/phpize"));
        assert_eq!(steps[1].args, vec!["--with-php-config=/v/8.2.1/bin/php-config"]);
    }

    struct FailAt {
        step: &'static str,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for FailAt {
        async fn run(&self, command: &BuildCommand, log: &Path) -> Result<CommandOutcome> {
            self.seen.lock().unwrap().push(command.step.clone());
            let mut text = tokio::fs::read_to_string(log).await.unwrap_or_default();
            text.push_str(&format!("running {}\n", command.step));
            tokio::fs::write(log, text).await.unwrap();
            if command.step == self.step {
                Ok(CommandOutcome { exit_code: Some(2) })
            } else {
                Ok(CommandOutcome::success())
            }
        }
    }

    #[tokio::test]
    async fn failing_step_stops_the_build() {
        let dir = TempDir::new().unwrap();
        let log = log_path(dir.path(), "php", "8.3.4");
        let runner = FailAt {
            step: "make",
            seen: Mutex::new(Vec::new()),
        };
        let steps = php_source_steps(dir.path(), dir.path(), &[], 2);

        let err = run_steps(&runner, "php", &steps, &log).await.unwrap_err();
        match err {
            Error::BuildFailed {
                step,
                exit_code,
                log_path,
                excerpt,
                ..
            } => {
                assert_eq!(step, "make");
                assert_eq!(exit_code, Some(2));
                assert_eq!(log_path, log);
                assert_eq!(excerpt, vec!["running configure", "running make"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*runner.seen.lock().unwrap(), vec!["configure", "make"]);
    }

    #[tokio::test]
    async fn tail_keeps_the_last_lines() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("build.log");
        let body: String = (1..=100).map(|i| format!("line {i}\n")).collect();
        tokio::fs::write(&log, body).await.unwrap();
        let lines = tail(&log, EXCERPT_LINES).await;
        assert_eq!(lines.len(), 40);
        assert_eq!(lines[0], "line 61");
        assert_eq!(lines[39], "line 100");
        assert!(tail(&dir.path().join("missing.log"), 5).await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_output_is_streamed_to_the_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs").join("run.log");
        let command = BuildCommand::new("script", "sh", dir.path())
            .arg("-c")
            .arg("echo to-stdout; echo to-stderr >&2; echo \"$GREETING\"; exit 3")
            .env("GREETING", "hello there");

        let outcome = ProcessRunner.run(&command, &log).await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.is_success());

        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.starts_with("$ sh -c"));
        assert!(text.contains("to-stdout"));
        assert!(text.contains("to-stderr"));
        assert!(text.contains("hello there"));
    }

    #[tokio::test]
    async fn non_utf8_output_does_not_stop_the_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("run.log");
        let command = BuildCommand::new("make", "sh", dir.path())
            .arg("-c")
            .arg("printf 'caf\\351 warning\\n'; i=0; while [ $i -lt 20000 ]; do echo line $i; i=$((i+1)); done; echo DONE; exit 0");

        let outcome = ProcessRunner.run(&command, &log).await.unwrap();
        assert_eq!(outcome.exit_code, Some(0));

        let text = String::from_utf8(std::fs::read(&log).unwrap()).unwrap();
        assert!(text.contains("caf\u{fffd} warning"));
        assert!(text.contains("line 19999"));
        assert!(text.trim_end().ends_with("DONE"));
        assert_eq!(text.lines().count(), 20_003);
    }

    #[tokio::test]
    async fn missing_program_is_a_failed_outcome() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("run.log");
        let command = BuildCommand::new("configure", dir.path().join("no-such-configure"), dir.path());
        let outcome = ProcessRunner.run(&command, &log).await.unwrap();
        assert_eq!(outcome.exit_code, None);
        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("failed to start"));
    }
}
