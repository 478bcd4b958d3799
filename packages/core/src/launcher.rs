//! Process launch.
//!
//! [`LaunchSpec`] fixes the program, argv and environment; a
//! [`ProcessLauncher`] turns it into a running program. On unix that means
//! replacing the current process image, so a successful launch never
//! returns.
//!
//! A direct program is executed by the path it was given. A name without a
//! `/` resolves against the working directory, never `PATH`. Only an
//! interpreter is looked up on `PATH`.

use crate::env::EnvironmentSet;
use crate::error::{Error, Result};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

/// Everything needed to start the target program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    program: String,
    argv: Vec<String>,
    env: EnvironmentSet,
    search_path: bool,
}

impl LaunchSpec {
    /// Launch `command[0]` directly.
    ///
    /// `command[1..]` is the complete argv, argv[0] included, and is passed
    /// through unmodified. When it is empty argv becomes `[command[0]]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `command` is empty.
    pub fn direct(command: &[String], env: EnvironmentSet) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Config("a command to execute is required".to_string()))?;

        Ok(Self {
            program: program.clone(),
            argv: build_argv(program, args),
            env,
            search_path: false,
        })
    }

    /// Launch `command` through `interpreter`: argv is `[interpreter] + command`.
    pub fn interpreted(interpreter: &str, command: &[String], env: EnvironmentSet) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::Config("a command to execute is required".to_string()));
        }

        let mut argv = Vec::with_capacity(command.len() + 1);
        argv.push(interpreter.to_string());
        argv.extend(command.iter().cloned());

        Ok(Self {
            program: interpreter.to_string(),
            argv,
            env,
            search_path: true,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn env(&self) -> &EnvironmentSet {
        &self.env
    }

    /// The file to execute.
    ///
    /// # Errors
    ///
    /// Fails with [`io::ErrorKind::NotFound`] when an interpreter name is not
    /// on `PATH`.
    pub fn executable(&self) -> io::Result<PathBuf> {
        if !self.search_path || self.program.contains('/') {
            return Ok(PathBuf::from(&self.program));
        }

        which::which(&self.program).map_err(|e| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found on PATH: {}", self.program, e),
            )
        })
    }

    /// Build a command with the environment replaced. Duplicate names
    /// collapse to the last value here, unlike the unix exec path.
    #[cfg(not(unix))]
    fn command(&self) -> io::Result<std::process::Command> {
        let mut executable = self.executable()?;
        if !self.search_path && executable.parent() == Some(std::path::Path::new("")) {
            executable = std::path::Path::new(".").join(executable);
        }

        let mut cmd = std::process::Command::new(executable);
        cmd.args(&self.argv[1..]);
        cmd.env_clear();
        for assignment in &self.env {
            cmd.env(assignment.name(), assignment.value());
        }
        Ok(cmd)
    }
}

/// An empty argument list still needs argv[0]; use the program path.
fn build_argv(program: &str, args: &[String]) -> Vec<String> {
    if args.is_empty() {
        vec![program.to_string()]
    } else {
        args.to_vec()
    }
}

/// Starts the target program.
pub trait ProcessLauncher {
    /// Hand control to the target. Implementations that replace the process
    /// only ever return an error.
    fn launch(&self, spec: &LaunchSpec) -> Result<()>;
}

/// Replaces the current process image via `execve`.
///
/// The environment block is built entry by entry, so duplicate names reach
/// the target as-is.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecLauncher;

#[cfg(unix)]
impl ProcessLauncher for ExecLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        log_launch(spec);

        // execve only returns if there was an error
        let source = match exec_image(spec) {
            Ok(never) => match never {},
            Err(e) => e,
        };
        Err(Error::Launch {
            program: spec.program.clone(),
            source,
        })
    }
}

#[cfg(unix)]
fn exec_image(spec: &LaunchSpec) -> io::Result<std::convert::Infallible> {
    use std::os::unix::ffi::OsStrExt;

    let path = c_string(spec.executable()?.as_os_str().as_bytes().to_vec())?;
    let argv = spec
        .argv
        .iter()
        .map(|arg| c_string(arg.as_bytes().to_vec()))
        .collect::<io::Result<Vec<_>>>()?;
    let envp = spec
        .env
        .iter()
        .map(|assignment| {
            let mut entry = assignment.name().as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(assignment.value().as_bytes());
            c_string(entry)
        })
        .collect::<io::Result<Vec<_>>>()?;

    nix::unistd::execve(&path, &argv, &envp).map_err(io::Error::from)
}

#[cfg(unix)]
fn c_string(bytes: Vec<u8>) -> io::Result<std::ffi::CString> {
    std::ffi::CString::new(bytes).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("argument or environment entry contains a NUL byte at {}", e.nul_position()),
        )
    })
}

/// Runs the target as a child and exits with its status, for platforms
/// without an exec primitive.
#[cfg(not(unix))]
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnLauncher;

#[cfg(not(unix))]
impl ProcessLauncher for SpawnLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        log_launch(spec);

        let status = spec
            .command()
            .and_then(|mut cmd| cmd.status())
            .map_err(|source| Error::Launch {
                program: spec.program.clone(),
                source,
            })?;

        std::process::exit(status.code().unwrap_or(1));
    }
}

/// The launcher for the current platform.
#[cfg(unix)]
pub fn platform_launcher() -> ExecLauncher {
    ExecLauncher
}

/// The launcher for the current platform.
#[cfg(not(unix))]
pub fn platform_launcher() -> SpawnLauncher {
    SpawnLauncher
}

fn log_launch(spec: &LaunchSpec) {
    info!(
        "Executing '{}' with args {:?} and {} env var(s)",
        spec.program,
        spec.argv,
        spec.env.len()
    );
}

/// Records launch requests instead of acting on them.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    launches: Mutex<Vec<LaunchSpec>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every spec passed to [`ProcessLauncher::launch`], oldest first.
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches
            .lock()
            .map(|launches| launches.clone())
            .unwrap_or_default()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(spec.clone());
        }
        Ok(())
    }
}
