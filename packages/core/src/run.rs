//! Run sequencing: read secrets, materialize them, launch.
//!
//! Each step either hands its output to the next one or stops the run with
//! an error. Nothing is retried and no partial environment is ever used.

use crate::config::{LaunchConfig, SourceConfig};
use crate::env::EnvironmentSet;
use crate::error::{Error, Result};
use crate::launcher::{LaunchSpec, ProcessLauncher};
use crate::source::{access_secret, read_secret_files, SecretFetcher};
use std::io::Write;
use tracing::{debug, warn};

/// Read the configured source and turn it into assignments.
///
/// `fetcher` is only consulted in api mode, where it must be present.
pub async fn resolve_environment(
    source: &SourceConfig,
    fetcher: Option<&dyn SecretFetcher>,
) -> Result<EnvironmentSet> {
    match source {
        SourceConfig::Files { root } => {
            debug!(root = %root.display(), "reading secrets from files");
            let files = read_secret_files(root)?;
            EnvironmentSet::from_files(files)
        }
        SourceConfig::Api { reference } => {
            debug!(secret = %reference, "reading secrets from Secret Manager");
            let fetcher = fetcher.ok_or_else(|| {
                Error::Config("api secret mode needs a Secret Manager client".to_string())
            })?;
            let payload = access_secret(fetcher, reference).await?;
            EnvironmentSet::from_json(&payload)
        }
    }
}

/// Build the launch spec for `config` around an already resolved set.
pub fn build_launch_spec(config: &LaunchConfig, env: EnvironmentSet) -> Result<LaunchSpec> {
    let env = if config.inherit_env {
        env.merge_inherited(std::env::vars_os())
    } else {
        env
    };

    match &config.interpreter {
        Some(interpreter) => LaunchSpec::interpreted(interpreter, &config.command, env),
        None => LaunchSpec::direct(&config.command, env),
    }
}

/// Run one invocation end to end.
///
/// With a process-replacing launcher this only returns on failure. The
/// verbose listing goes to `out` and covers the secrets only, never the
/// inherited environment.
pub async fn run<W: Write>(
    config: &LaunchConfig,
    fetcher: Option<&dyn SecretFetcher>,
    launcher: &dyn ProcessLauncher,
    out: &mut W,
) -> Result<()> {
    let secrets = resolve_environment(&config.source, fetcher).await?;
    debug!(count = secrets.len(), mode = %config.mode(), "secrets resolved");

    if config.verbose {
        if let Err(e) = secrets.render(out) {
            warn!("failed to print resolved secrets: {}", e);
        }
    }

    let spec = build_launch_spec(config, secrets)?;
    launcher.launch(&spec)
}
