//! Build prerequisite repair.
//!
//! Runs only when asked for (`doctor --fix`); the install pipeline never
//! triggers it.

use crate::build::{BuildCommand, CommandRunner};
use overture_core::{Error, Result};
use overture_platform::{BuildTool, PackageManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// What a repair did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepairReport {
    /// Package manager used.
    pub manager: Option<PackageManager>,
    /// Packages installed.
    pub packages: Vec<String>,
    /// Commands tried, in order.
    pub commands: Vec<String>,
}

impl RepairReport {
    /// Whether there was nothing to install.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Installs missing build tools with the host package manager.
pub struct EnvironmentRepair {
    runner: Arc<dyn CommandRunner>,
    log: PathBuf,
    manager: Option<PackageManager>,
    elevated: bool,
    missing: Vec<BuildTool>,
}

impl std::fmt::Debug for EnvironmentRepair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentRepair")
            .field("log", &self.log)
            .field("manager", &self.manager)
            .field("elevated", &self.elevated)
            .field("missing", &self.missing)
            .finish_non_exhaustive()
    }
}

impl EnvironmentRepair {
    /// Probe the host for its package manager, privileges and missing tools.
    #[must_use]
    pub fn detect(runner: Arc<dyn CommandRunner>, logs_dir: &Path) -> Self {
        Self {
            runner,
            log: logs_dir.join("repair.log"),
            manager: PackageManager::detect(),
            elevated: overture_platform::is_elevated(),
            missing: overture_platform::probe_build_tools(),
        }
    }

    /// Repair with explicit probe results.
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        log: impl Into<PathBuf>,
        manager: Option<PackageManager>,
        missing: Vec<BuildTool>,
    ) -> Self {
        Self {
            runner,
            log: log.into(),
            manager,
            elevated: false,
            missing,
        }
    }

    /// Whether the process already runs as root.
    #[must_use]
    pub const fn with_elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }

    /// Tools found missing.
    #[must_use]
    pub fn missing(&self) -> &[BuildTool] {
        &self.missing
    }

    /// Detected package manager.
    #[must_use]
    pub const fn manager(&self) -> Option<PackageManager> {
        self.manager
    }

    /// Packages that [`run`](Self::run) would install.
    #[must_use]
    pub fn planned_packages(&self) -> Vec<String> {
        self.manager
            .map(|pm| pm.packages_for(&self.missing))
            .unwrap_or_default()
    }

    /// Install the missing tools.
    ///
    /// Without root, the install goes through `sudo` first and is retried once
    /// without it if that fails.
    ///
    /// # Errors
    /// Returns [`Error::EnvironmentRepairFailed`] when no package manager is
    /// known or every attempt fails.
    pub async fn run(&self) -> Result<RepairReport> {
        if self.missing.is_empty() {
            info!("all build prerequisites are present");
            return Ok(RepairReport {
                manager: self.manager,
                ..RepairReport::default()
            });
        }

        let Some(manager) = self.manager else {
            return Err(Error::EnvironmentRepairFailed {
                message: "no supported package manager found".to_string(),
                manager: None,
                packages: self.missing.iter().map(|t| t.name().to_string()).collect(),
            });
        };
        let packages = manager.packages_for(&self.missing);
        let install_args = manager.install_args(&packages);
        let cwd = std::env::temp_dir();

        let direct = BuildCommand::new("install prerequisites", manager.program(), &cwd)
            .args(install_args.iter().cloned());
        let mut attempts = Vec::new();
        if manager.needs_root() && !self.elevated {
            attempts.push(
                BuildCommand::new("install prerequisites (sudo)", "sudo", &cwd)
                    .arg(manager.program())
                    .args(install_args.iter().cloned()),
            );
        }
        attempts.push(direct);

        let mut commands = Vec::new();
        let mut last_failure = String::new();
        for command in &attempts {
            commands.push(command.to_string());
            info!(command = %command, "installing build prerequisites");
            let outcome = self.runner.run(command, &self.log).await?;
            if outcome.is_success() {
                return Ok(RepairReport {
                    manager: Some(manager),
                    packages,
                    commands,
                });
            }
            last_failure = match outcome.exit_code {
                Some(code) => format!("`{command}` exited with code {code}"),
                None => format!("`{command}` did not run to completion"),
            };
            warn!(command = %command, exit_code = ?outcome.exit_code, "prerequisite install failed");
        }

        Err(Error::EnvironmentRepairFailed {
            message: format!("{last_failure} (log: {})", self.log.display()),
            manager: Some(manager.to_string()),
            packages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::CommandOutcome;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Fails every command whose program is in `failing`.
    struct Scripted {
        failing: Vec<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(failing: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                failing: failing.to_vec(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for Scripted {
        async fn run(&self, command: &BuildCommand, _log: &Path) -> Result<CommandOutcome> {
            self.seen.lock().unwrap().push(command.to_string());
            let program = command.program.to_string_lossy().to_string();
            Ok(if self.failing.contains(&program.as_str()) {
                CommandOutcome { exit_code: Some(1) }
            } else {
                CommandOutcome::success()
            })
        }
    }

    #[tokio::test]
    async fn nothing_missing_runs_nothing() {
        let runner = Scripted::new(&[]);
        let repair = EnvironmentRepair::new(runner.clone(), "/tmp/r.log", Some(PackageManager::Apt), vec![]);
        let report = repair.run().await.unwrap();
        assert!(report.is_noop());
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sudo_is_tried_first() {
        let runner = Scripted::new(&[]);
        let repair = EnvironmentRepair::new(
            runner.clone(),
            "/tmp/r.log",
            Some(PackageManager::Apt),
            vec![BuildTool::Make, BuildTool::Re2c],
        );
        let report = repair.run().await.unwrap();
        assert_eq!(report.packages, vec!["make", "re2c"]);
        assert_eq!(
            *runner.seen.lock().unwrap(),
            vec!["sudo apt-get install -y make re2c"]
        );
    }

    #[tokio::test]
    async fn failed_sudo_retries_without_elevation() {
        let runner = Scripted::new(&["sudo"]);
        let repair = EnvironmentRepair::new(
            runner.clone(),
            "/tmp/r.log",
            Some(PackageManager::Dnf),
            vec![BuildTool::Bison],
        );
        let report = repair.run().await.unwrap();
        assert_eq!(report.commands.len(), 2);
        assert_eq!(
            *runner.seen.lock().unwrap(),
            vec!["sudo dnf install -y bison", "dnf install -y bison"]
        );
    }

    #[tokio::test]
    async fn both_attempts_failing_is_reported() {
        let runner = Scripted::new(&["sudo", "pacman"]);
        let repair = EnvironmentRepair::new(
            runner,
            "/tmp/r.log",
            Some(PackageManager::Pacman),
            vec![BuildTool::Autoconf],
        );
        let err = repair.run().await.unwrap_err();
        match err {
            Error::EnvironmentRepairFailed {
                manager, packages, ..
            } => {
                assert_eq!(manager.as_deref(), Some("pacman"));
                assert_eq!(packages, vec!["autoconf"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn root_and_brew_skip_sudo() {
        let runner = Scripted::new(&[]);
        EnvironmentRepair::new(runner.clone(), "/tmp/r.log", Some(PackageManager::Apk), vec![BuildTool::Make])
            .with_elevated(true)
            .run()
            .await
            .unwrap();
        EnvironmentRepair::new(runner.clone(), "/tmp/r.log", Some(PackageManager::Brew), vec![BuildTool::Re2c])
            .run()
            .await
            .unwrap();
        assert_eq!(
            *runner.seen.lock().unwrap(),
            vec!["apk add --no-cache make", "brew install re2c"]
        );
    }

    #[tokio::test]
    async fn unknown_package_manager_fails() {
        let repair = EnvironmentRepair::new(Scripted::new(&[]), "/tmp/r.log", None, vec![BuildTool::Make]);
        let err = repair.run().await.unwrap_err();
        assert!(matches!(err, Error::EnvironmentRepairFailed { manager: None, .. }));
    }
}
