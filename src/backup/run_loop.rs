use crate::backup::archive::walkdir_source::SourceDir;
use crate::backup::backup_config::{BackupConfig, INTERVAL_UNIT};
use crate::backup::cancel::CancelToken;
use crate::backup::function_path;
use crate::backup::notifications::{redact_home, Notification};
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::SweepReport;
use crate::backup::status;
use bon::Builder;
use chrono::Local;
use function_name::named;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the loop currently is. `Done` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    BackingUp,
    Notifying,
    Sweeping,
    Sleeping,
    Done,
    Cancelled,
}

/// How often the config file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigReload {
    /// Read once at startup.
    #[default]
    Once,
    /// Read again before every iteration after the first, so edits apply
    /// without a restart.
    EveryIteration,
}

impl ConfigReload {
    pub fn reloads_before(&self, iteration: usize) -> bool {
        matches!(self, ConfigReload::EveryIteration) && iteration > 0
    }
}

#[derive(Debug, Clone, Builder, Getters)]
#[getset(get = "pub")]
pub struct RunSettings {
    #[builder(into)]
    config_path: PathBuf,
    /// From the command line. Conflicts with a config `encryption_key`.
    passphrase: Option<RedactedString>,
    #[builder(default)]
    reload: ConfigReload,
}

/// The result of backing up one source.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: SourceDir,
    pub result: Result<PathBuf>,
}

impl SourceOutcome {
    fn summary_line(&self, home: Option<&Path>) -> String {
        let name = self
            .source
            .base_name()
            .unwrap_or_else(|_| self.source.src_dir().display().to_string());
        let line = match &self.result {
            Ok(archive) => format!(
                "Backup of **`{name}`** created successfully! Archive saved to **`{}`**",
                archive.display()
            ),
            Err(e) => format!(
                "Backup of **`{name}`** failed: {}",
                e.to_string().lines().last().unwrap_or_default().trim()
            ),
        };
        redact_home(&line, home)
    }
}

#[derive(Debug, Default)]
pub struct IterationReport {
    pub outcomes: Vec<SourceOutcome>,
    pub sweep: SweepReport,
}

impl IterationReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// The notification text: one markdown line per source.
    pub fn summary(&self, home: Option<&Path>) -> String {
        if self.outcomes.is_empty() {
            return String::new();
        }
        let mut summary = self.outcomes.iter().map(|o| o.summary_line(home)).join("\n");
        summary.push('\n');
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RunReport {
    iterations: usize,
    final_phase: Phase,
}

/// Backup, notify, sweep, then sleep for `interval` hours or stop.
///
/// Iterations never overlap. A failing source is reported and the next one
/// is tried. A failing notification is reported and ignored. Config, output
/// directory and sweep failures end the run with an error.
#[derive(Debug)]
pub struct RunLoop {
    settings: RunSettings,
    /// Redacted to `~` in notification text.
    home: Option<PathBuf>,
    /// Length of one `interval` step, an hour unless overridden.
    interval_unit: Duration,
    phase: Phase,
}

impl RunLoop {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            home: dirs::home_dir(),
            interval_unit: INTERVAL_UNIT,
            phase: Phase::Idle,
        }
    }

    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn with_interval_unit(mut self, unit: Duration) -> Self {
        self.interval_unit = unit;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!("Run loop {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn load_config(&self) -> Result<BackupConfig> {
        BackupConfig::load(&self.settings.config_path)
    }

    #[named]
    pub fn run(&mut self, cancel: &CancelToken) -> Result<RunReport> {
        let mut config = self.load_config().add_fn_name(function_path!())?;
        let mut iterations = 0;

        loop {
            if self.settings.reload.reloads_before(iterations) {
                tracing::info!("Reloading config from {:?}", self.settings.config_path);
                config = self.load_config().add_fn_name(function_path!())?;
            }

            let report = self
                .run_iteration(&config, cancel)
                .add_fn_name(function_path!())?;
            iterations += 1;
            tracing::info!(
                "Iteration {} finished: {} succeeded, {} failed, {} old archive(s) removed",
                iterations,
                report.succeeded(),
                report.failed(),
                report.sweep.deleted_files.len()
            );

            if cancel.is_cancelled() {
                self.enter(Phase::Cancelled);
                break;
            }

            let Some(interval) = config.interval_in(self.interval_unit) else {
                self.enter(Phase::Done);
                break;
            };

            self.enter(Phase::Sleeping);
            if let Some(next) = chrono::Duration::from_std(interval)
                .ok()
                .and_then(|d| Local::now().checked_add_signed(d))
            {
                status::print(status::next_run(&next));
            }
            if cancel.sleep(interval) {
                self.enter(Phase::Cancelled);
                break;
            }
        }

        if self.phase == Phase::Cancelled {
            tracing::warn!("Run cancelled after {} iteration(s)", iterations);
        }

        Ok(RunReport {
            iterations,
            final_phase: self.phase,
        })
    }

    /// One pass over every source, then notification and sweep.
    ///
    /// After a cancellation the remaining sources, the notification and the
    /// sweep are skipped.
    #[named]
    pub fn run_iteration(&mut self, config: &BackupConfig, cancel: &CancelToken) -> Result<IterationReport> {
        self.enter(Phase::BackingUp);
        let encryptor = config
            .resolve_encryptor(self.settings.passphrase.clone())
            .add_fn_name(function_path!())?;
        std::fs::create_dir_all(&config.output_dir)
            .map_err(Error::from)
            .add_msg(format!("Creating output dir {:?} failed", config.output_dir))
            .add_fn_name(function_path!())?;
        let writer = config.archive_writer(encryptor);

        let mut report = IterationReport::default();
        for source in &config.source_dirs {
            if cancel.is_cancelled() {
                break;
            }
            status::print(status::backing_up(source.src_dir()));
            let result = writer.create_archive(source, &Local::now(), cancel);
            match &result {
                Ok(archive) => {
                    tracing::info!("Backup of {:?} saved to {:?}", source.src_dir(), archive);
                    status::print(status::archive_created(archive));
                }
                Err(e) if e.is_cancelled() => {
                    tracing::warn!("Backup of {:?} cancelled", source.src_dir());
                }
                Err(e) => {
                    tracing::error!("{e}");
                    status::print(status::archive_failed(source.src_dir(), e));
                }
            }
            report.outcomes.push(SourceOutcome {
                source: source.clone(),
                result,
            });
        }

        if cancel.is_cancelled() {
            return Ok(report);
        }

        self.enter(Phase::Notifying);
        if let Some(notification) = config.notification() {
            match notification.send(report.summary(self.home.as_deref())) {
                Ok(()) => status::print(status::notification_sent()),
                Err(e) => {
                    tracing::warn!("{e}");
                    status::print(status::notification_failed(e));
                }
            }
        }

        self.enter(Phase::Sweeping);
        status::print(status::sweeping(&config.output_dir));
        report.sweep = match config.retention().sweep(&config.output_dir) {
            Ok(sweep) => sweep,
            Err(e) => {
                status::print(status::sweep_failed(&e));
                return Err(e)
                    .add_msg("Error cleaning up old backups")
                    .add_fn_name(function_path!());
            }
        };
        if report.sweep.deleted_any() || !report.sweep.removed_dirs.is_empty() {
            status::print(status::sweep_done(
                report.sweep.deleted_files.len(),
                report.sweep.removed_dirs.len(),
            ));
        } else {
            status::print(status::sweep_nothing());
        }

        Ok(report)
    }
}
