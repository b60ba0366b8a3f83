//! flockwait: run commands under an advisory file lock.

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use flockwait::config::{CONFIG_FILE_NAME, Config, LockKind};
use flockwait::{LockError, LockFile, LockGuard, LockMode, ProgressWaiter, no_waiter, ui};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use tracing_subscriber::EnvFilter;

/// Exit status when `--nonblock` or `probe` finds the lock held.
const EXIT_BUSY: u8 = 1;

/// Environment variable holding the log filter (e.g. `flockwait=debug`).
const LOG_ENV: &str = "FLOCKWAIT_LOG";

#[derive(Parser)]
#[command(name = "flockwait")]
#[command(about = "Run commands under an advisory file lock, reporting while waiting")]
#[command(version)]
struct Cli {
    /// Path to flockwait config (TOML)
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hold a lock while running a command
    Run {
        #[command(flatten)]
        lock: LockArgs,
        /// Fail immediately instead of waiting if the lock is held
        #[arg(short = 'n', long)]
        nonblock: bool,
        /// Do not print progress while waiting
        #[arg(short = 'q', long)]
        quiet: bool,
        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Take a lock and hold it until stdin is closed
    Hold {
        #[command(flatten)]
        lock: LockArgs,
        /// Do not print progress while waiting
        #[arg(short = 'q', long)]
        quiet: bool,
    },

    /// Check whether a lock could be taken right now (exit 1 if held)
    Probe {
        #[command(flatten)]
        lock: LockArgs,
    },

    /// Write a default config to the current directory
    Init {
        /// Overwrite existing config
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
struct LockArgs {
    /// Take a shared lock
    #[arg(short = 's', long, conflicts_with = "exclusive")]
    shared: bool,
    /// Take an exclusive lock
    #[arg(short = 'x', long)]
    exclusive: bool,
    /// Lock file
    file: PathBuf,
}

impl LockArgs {
    fn mode(&self, config: &Config) -> LockMode {
        let kind = if self.shared {
            LockKind::Shared
        } else if self.exclusive {
            LockKind::Exclusive
        } else {
            config.lock.mode
        };
        kind.mode()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            ui::error(format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run {
            lock,
            nonblock,
            quiet,
            command,
        } => run_locked(&config, lock, *nonblock, *quiet, command),
        Commands::Hold { lock, quiet } => hold(&config, lock, *quiet),
        Commands::Probe { lock } => probe(&config, lock),
        Commands::Init { force } => init(*force),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "flockwait", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_lock_file(config: &Config, path: &Path) -> Result<LockFile> {
    let opened = if config.lock.create {
        LockFile::open(path)
    } else {
        LockFile::open_existing(path)
    };
    opened.with_context(|| format!("Failed to open lock file: {}", path.display()))
}

/// Block for `mode`, drawing progress on stderr unless quiet.
fn acquire<'a>(
    config: &Config,
    lock: &'a LockFile,
    mode: LockMode,
    quiet: bool,
) -> Result<LockGuard<'a>> {
    let acquired = if quiet || config.waiter.quiet {
        lock.acquire(mode, no_waiter)
    } else {
        lock.acquire(
            mode,
            ProgressWaiter::stderr().with_interval(config.waiter.interval()),
        )
    };
    acquired.with_context(|| {
        format!(
            "Failed to acquire {} lock: {}",
            mode.as_ref(),
            lock.path().display()
        )
    })
}

/// Take `mode` without waiting. `None` means someone else holds it.
fn try_acquire<'a>(lock: &'a LockFile, mode: LockMode) -> Result<Option<LockGuard<'a>>> {
    match lock.try_acquire(mode) {
        Ok(guard) => Ok(Some(guard)),
        Err(LockError::WouldBlock) => Ok(None),
        Err(e) => Err(e).with_context(|| {
            format!(
                "Failed to acquire {} lock: {}",
                mode.as_ref(),
                lock.path().display()
            )
        }),
    }
}

fn run_locked(
    config: &Config,
    args: &LockArgs,
    nonblock: bool,
    quiet: bool,
    command: &[String],
) -> Result<ExitCode> {
    let Some((program, program_args)) = command.split_first() else {
        anyhow::bail!("No command given");
    };

    let lock = open_lock_file(config, &args.file)?;
    let mode = args.mode(config);

    let guard = if nonblock {
        match try_acquire(&lock, mode)? {
            Some(guard) => guard,
            None => {
                ui::held(lock.path(), mode.as_ref());
                return Ok(ExitCode::from(EXIT_BUSY));
            }
        }
    } else {
        acquire(config, &lock, mode, quiet)?
    };

    let status = Command::new(program)
        .args(program_args)
        .status()
        .with_context(|| format!("Failed to run command: {program}"))?;

    guard
        .release()
        .with_context(|| format!("Failed to release lock: {}", lock.path().display()))?;

    Ok(status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE))
}

fn hold(config: &Config, args: &LockArgs, quiet: bool) -> Result<ExitCode> {
    let lock = open_lock_file(config, &args.file)?;
    let mode = args.mode(config);
    let guard = acquire(config, &lock, mode, quiet)?;

    // Readiness line for scripts; stdout carries nothing else.
    println!("locked {} {}", mode.as_ref(), lock.path().display());
    io::Write::flush(&mut io::stdout()).context("Failed to write to stdout")?;

    io::copy(&mut io::stdin().lock(), &mut io::sink()).context("Failed to read stdin")?;

    guard
        .release()
        .with_context(|| format!("Failed to release lock: {}", lock.path().display()))?;
    ui::released(lock.path());
    Ok(ExitCode::SUCCESS)
}

fn probe(config: &Config, args: &LockArgs) -> Result<ExitCode> {
    let lock = open_lock_file(config, &args.file)?;
    let mode = args.mode(config);

    match try_acquire(&lock, mode)? {
        Some(guard) => {
            guard
                .release()
                .with_context(|| format!("Failed to release lock: {}", lock.path().display()))?;
            println!("free");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            ui::held(lock.path(), mode.as_ref());
            println!("held");
            Ok(ExitCode::from(EXIT_BUSY))
        }
    }
}

fn init(force: bool) -> Result<ExitCode> {
    let path = PathBuf::from(CONFIG_FILE_NAME);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }
    std::fs::write(&path, Config::default_toml())
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    ui::success(format!("Created {}", path.display()));
    Ok(ExitCode::SUCCESS)
}
