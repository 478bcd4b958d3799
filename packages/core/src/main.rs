// secret-exec - launch a program with its secrets in the environment
//
// This is the main entry point for the application.

use anyhow::{Context, Result};
use clap::Parser;
use secret_exec::config::{LaunchConfig, SecretMode, Settings, DEFAULT_CONFIG_FILE};
use secret_exec::launcher::platform_launcher;
use secret_exec::run::run;
use secret_exec::source::{SecretFetcher, SecretManagerClient};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Resolve secrets from a mounted directory or Google Cloud Secret Manager
/// and exec a program with them as its environment
#[derive(Parser, Debug)]
#[command(name = "secret-exec")]
#[command(version)]
#[command(about = "Launch a program with secrets injected as environment variables", long_about = None)]
#[command(after_help = r#"SECRET MODES:
    file   Every file under --secrets-path becomes NAME=CONTENTS
    api    --secret-name in --project holds a flat JSON object of strings

COMMAND:
    The first word is the path of the program to execute (not searched on
    PATH), the rest is its complete argument vector including argv[0]:

        secret-exec /usr/bin/node node server.js"#)]
struct Cli {
    /// Print the secrets before launching (shows values, use with caution)
    #[arg(short, long)]
    verbose: bool,

    /// Secret name. Required in 'api' secret mode
    #[arg(short = 'n', long, env = "SECRET_NAME")]
    secret_name: Option<String>,

    /// Project. Required in 'api' secret mode
    #[arg(short, long, env = "PROJECT")]
    project: Option<String>,

    /// Secret version [default: latest]
    #[arg(long, env = "SECRET_VERSION")]
    secret_version: Option<String>,

    /// Secret mode, 'file' or 'api' [default: file]
    #[arg(long, env = "SECRET_MODE")]
    secret_mode: Option<String>,

    /// Directory read in 'file' secret mode [default: ./secrets/]
    #[arg(long, env = "SECRETS_PATH")]
    secrets_path: Option<String>,

    /// Keep the current environment and add the secrets on top
    #[arg(long, env = "INHERIT_ENV", value_parser = clap::builder::FalseyValueParser::new())]
    inherit_env: bool,

    /// Run the command through this interpreter (e.g. python3)
    #[arg(long, env = "SECRET_EXEC_INTERPRETER")]
    interpreter: Option<String>,

    /// Give up on Secret Manager requests after this many seconds
    #[arg(long, env = "SECRET_API_TIMEOUT", value_name = "SECONDS")]
    api_timeout: Option<u64>,

    /// Path to a YAML config file [default: secret-exec.yaml if present]
    #[arg(short, long, env = "SECRET_EXEC_CONFIG")]
    config: Option<PathBuf>,

    /// Path to binary and its arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "CMD"
    )]
    cmd: Vec<String>,
}

impl Cli {
    /// Settings given on the command line or through environment variables.
    fn settings(&self) -> Settings {
        Settings {
            secret_mode: self.secret_mode.clone(),
            project: self.project.clone(),
            secret_name: self.secret_name.clone(),
            secret_version: self.secret_version.clone(),
            secrets_path: self.secrets_path.clone(),
            inherit_env: self.inherit_env.then_some(true),
            interpreter: self.interpreter.clone(),
            api_timeout: self.api_timeout,
        }
    }
}

/// Merge command-line settings over the config file.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let file = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Settings::from_file(DEFAULT_CONFIG_FILE)?,
        None => Settings::default(),
    };

    Ok(cli.settings().or(file))
}

fn run_cli(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    let config = LaunchConfig::from_settings(settings, cli.verbose, cli.cmd)?;

    let fetcher = match config.mode() {
        SecretMode::Api => Some(SecretManagerClient::with_timeout(config.api_timeout)?),
        SecretMode::File => None,
    };
    let launcher = platform_launcher();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let mut stdout = std::io::stdout();
    let fetcher = fetcher.as_ref().map(|client| client as &dyn SecretFetcher);
    runtime.block_on(run(&config, fetcher, &launcher, &mut stdout))?;

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        eprintln!("## ERROR: {:#}", e);
        std::process::exit(1);
    }
}
