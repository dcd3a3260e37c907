use backubrr::backup::backup_config::DEFAULT_CONFIG_PATH;
use backubrr::backup::build_info::BuildInfo;
use backubrr::backup::cancel::CancelToken;
use backubrr::backup::redacted::RedactedString;
use backubrr::backup::result_error::result::Result;
use backubrr::backup::run_loop::{ConfigReload, RunLoop, RunReport, RunSettings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

static CONFIG_HELP: &str = "\
Configuration options:
  source_dirs                A list of directories to back up.
  output_dir                 The directory where backup files are saved (default $HOME/backups).
  retention_days             The number of days to retain backup files (default 7).
  interval                   Run every X hours, 0 runs once.
  encryption_key             Passphrase used to encrypt archives.
  discord                    Send notifications to Discord after a backup run.
  compressor                 gzip (default), xz or none.
  notification_timeout_secs  Timeout for the Discord request (default 10).";

/// A command-line tool for backing up files and directories.
#[derive(Parser, Debug)]
#[command(name = "backubrr", about, long_about = None, after_help = CONFIG_HELP, disable_version_flag = true)]
struct Args {
    /// Path to config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Encrypt archives with this passphrase instead of `encryption_key`
    #[arg(long)]
    passphrase: Option<String>,

    /// Read the config file again before every run
    #[arg(long)]
    reload_config: bool,

    /// Print version information
    #[arg(short = 'V', long = "version")]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print version information
    Version,
}

fn run(args: Args) -> Result<RunReport> {
    let cancel = CancelToken::new();
    cancel.install_signal_handler()?;

    let settings = RunSettings::builder()
        .config_path(args.config)
        .maybe_passphrase(args.passphrase.map(RedactedString::from))
        .reload(if args.reload_config {
            ConfigReload::EveryIteration
        } else {
            ConfigReload::Once
        })
        .build();

    RunLoop::new(settings).run(&cancel)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let build_info = BuildInfo::from_env();

    if args.version || matches!(args.command, Some(Command::Version)) {
        println!("{build_info}");
        return;
    }

    info!("Starting {build_info}");
    match run(args) {
        Ok(report) => info!(
            "Stopped after {} run(s) in state {:?}",
            report.iterations(),
            report.final_phase()
        ),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
