//! External tool invocation
//!
//! Tools run synchronously with inherited stdio, so their diagnostics reach
//! the terminal unmodified. A non-zero exit becomes [`BuildError::ToolFailed`].

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::error::{BuildError, Result};

/// One command line: the executable followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tokens: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            tokens: vec![program.into()],
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.tokens.push(arg.into());
        self
    }

    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.tokens.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or("")
    }

    /// Space-joined command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Runs tool invocations to completion.
#[cfg_attr(test, mockall::automock)]
pub trait ToolRunner {
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        let (program, args) = invocation
            .tokens
            .split_first()
            .ok_or(BuildError::EmptyCommand)?;
        let command_line = invocation.command_line();
        info!("> {command_line}");

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let status = cmd.status().map_err(|source| BuildError::Spawn {
            command: command_line.clone(),
            source,
        })?;
        debug!("{program} exited with {status}");

        if status.success() {
            Ok(())
        } else {
            Err(BuildError::ToolFailed {
                code: status.code(),
                command: command_line,
            })
        }
    }
}

/// Locate `name` the way the shell would, logging the outcome.
///
/// Only advisory: a missing tool is a warning, and the invocation itself
/// reports the real failure later.
pub fn check_tool(name: &str) -> Option<PathBuf> {
    match find_executable(name, env::var_os("PATH").as_deref()) {
        Some(path) => {
            info!("[OK] {name}: {}", path.display());
            Some(path)
        }
        None => {
            warn!("'{name}' not found in PATH; make sure the tool is installed");
            None
        }
    }
}

/// Resolve `name` against `search_path` (a `PATH`-style list).
///
/// Names containing a path separator are checked as given.
pub fn find_executable(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let as_path = Path::new(name);
    if as_path.components().count() > 1 {
        return candidates(as_path).find(|p| is_executable(p));
    }

    let search_path = search_path?;
    env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates(&dir.join(name)).collect::<Vec<_>>())
        .find(|p| is_executable(p))
}

fn candidates(path: &Path) -> impl Iterator<Item = PathBuf> {
    let plain = path.to_path_buf();
    let suffixed = (!env::consts::EXE_SUFFIX.is_empty()).then(|| {
        let mut name = plain.clone().into_os_string();
        name.push(env::consts::EXE_SUFFIX);
        PathBuf::from(name)
    });
    std::iter::once(plain).chain(suffixed)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
