// secret-exec configuration module
//
// Invocation parameters come from three layers: command-line flags (with
// their environment variable fallbacks, handled by clap), an optional
// secret-exec.yaml file, and built-in defaults. This module merges the
// layers and validates the result into a LaunchConfig.

use crate::error::{Error, Result};
use crate::source::api::{SecretReference, SecretVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file looked up in the working directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "secret-exec.yaml";

/// Directory read in file mode when nothing else is configured.
pub const DEFAULT_SECRETS_PATH: &str = "./secrets/";

/// Where secrets come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecretMode {
    /// One file per variable under a directory.
    #[default]
    File,
    /// One JSON object stored in Secret Manager.
    Api,
}

impl FromStr for SecretMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "api" => Ok(Self::Api),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for SecretMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Api => f.write_str("api"),
        }
    }
}

/// One layer of unvalidated settings. Unset fields fall through to the next
/// layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// `file` or `api`
    pub secret_mode: Option<String>,

    /// Secret Manager project id
    pub project: Option<String>,

    /// Secret Manager secret name
    pub secret_name: Option<String>,

    /// Secret version selector (`latest`, a number, or an alias)
    pub secret_version: Option<String>,

    /// Root directory for file mode
    pub secrets_path: Option<String>,

    /// Merge the invoking process environment under the secrets
    pub inherit_env: Option<bool>,

    /// Interpreter to prefix the command with
    pub interpreter: Option<String>,

    /// Deadline for Secret Manager requests, in seconds
    pub api_timeout: Option<u64>,
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&content)
            .map_err(|e| Error::Config(format!("config file {}: {}", path.display(), e)))
    }

    /// Parse settings from YAML text. An empty document yields empty settings.
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Fill every unset field from `fallback`.
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            secret_mode: self.secret_mode.or(fallback.secret_mode),
            project: self.project.or(fallback.project),
            secret_name: self.secret_name.or(fallback.secret_name),
            secret_version: self.secret_version.or(fallback.secret_version),
            secrets_path: self.secrets_path.or(fallback.secrets_path),
            inherit_env: self.inherit_env.or(fallback.inherit_env),
            interpreter: self.interpreter.or(fallback.interpreter),
            api_timeout: self.api_timeout.or(fallback.api_timeout),
        }
    }
}

/// Where to read secrets from, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Files { root: PathBuf },
    Api { reference: SecretReference },
}

/// Validated parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub source: SourceConfig,
    pub verbose: bool,
    pub inherit_env: bool,
    pub interpreter: Option<String>,
    pub api_timeout: Option<Duration>,
    pub command: Vec<String>,
}

impl LaunchConfig {
    /// Validate merged settings.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMode`] for a mode other than `file` or `api`
    /// - [`Error::MissingParameter`] for api mode without project or secret name
    /// - [`Error::Config`] for an empty command or interpreter
    pub fn from_settings(settings: Settings, verbose: bool, command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::Config("a command to execute is required".to_string()));
        }

        let mode = match settings.secret_mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => SecretMode::default(),
        };

        let source = match mode {
            SecretMode::File => {
                let path = settings
                    .secrets_path
                    .unwrap_or_else(|| DEFAULT_SECRETS_PATH.to_string());
                SourceConfig::Files {
                    root: expand_home(&path)?,
                }
            }
            SecretMode::Api => {
                let project = settings
                    .project
                    .ok_or(Error::MissingParameter("project"))?;
                let secret_name = settings
                    .secret_name
                    .ok_or(Error::MissingParameter("secret-name"))?;
                let version = settings
                    .secret_version
                    .as_deref()
                    .map(SecretVersion::parse)
                    .unwrap_or_default();

                SourceConfig::Api {
                    reference: SecretReference::new(project, secret_name, version)?,
                }
            }
        };

        let interpreter = match settings.interpreter {
            Some(interpreter) if interpreter.trim().is_empty() => {
                return Err(Error::Config("interpreter cannot be empty".to_string()));
            }
            other => other,
        };

        Ok(Self {
            source,
            verbose,
            inherit_env: settings.inherit_env.unwrap_or(false),
            interpreter,
            api_timeout: settings.api_timeout.map(Duration::from_secs),
            command,
        })
    }

    pub fn mode(&self) -> SecretMode {
        match self.source {
            SourceConfig::Files { .. } => SecretMode::File,
            SourceConfig::Api { .. } => SecretMode::Api,
        }
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            let home = dirs::home_dir()
                .ok_or_else(|| Error::Config("failed to determine home directory".to_string()))?;
            Ok(home.join(rest.trim_start_matches('/')))
        }
        _ => Ok(PathBuf::from(path)),
    }
}
