//! Build errors
//!
//! Every fatal condition a target can hit. Phases propagate these with `?`;
//! only the binary turns them into an exit status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Exit status for a tool that ran and reported failure.
pub const EXIT_TOOL_FAILED: u8 = 1;
/// Exit status for everything else (spawn errors, filesystem errors, bugs).
pub const EXIT_INTERNAL: u8 = 2;

/// Fatal build error
#[derive(Error, Debug)]
pub enum BuildError {
    /// A tool exited with a non-zero status, or was killed (`code` is `None`).
    #[error("command failed with code {}: {command}", display_code(.code))]
    ToolFailed { code: Option<i32>, command: String },

    /// The executable could not be started at all.
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("filesystem error on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A flag string that shell word splitting cannot parse.
    #[error("malformed flag string {input:?}: {reason}")]
    FlagSyntax { input: String, reason: &'static str },

    #[error("refusing to run an empty command line")]
    EmptyCommand,
}

impl BuildError {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Process exit status the CLI reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            BuildError::ToolFailed { .. } => EXIT_TOOL_FAILED,
            _ => EXIT_INTERNAL,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_message_carries_code_and_command() {
        let err = BuildError::ToolFailed {
            code: Some(3),
            command: "gcc -m32 -c kernel.c".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "command failed with code 3: gcc -m32 -c kernel.c"
        );
        assert_eq!(err.exit_code(), EXIT_TOOL_FAILED);
    }

    #[test]
    fn test_signal_termination_has_no_code() {
        let err = BuildError::ToolFailed {
            code: None,
            command: "ld".to_string(),
        };
        assert!(err.to_string().contains("<signal>"));
    }

    #[test]
    fn test_non_tool_errors_map_to_internal_exit() {
        let err = BuildError::filesystem("build", io::Error::other("denied"));
        assert_eq!(err.exit_code(), EXIT_INTERNAL);
        assert!(err.to_string().starts_with("filesystem error on build"));
        assert_eq!(BuildError::EmptyCommand.exit_code(), EXIT_INTERNAL);
    }
}
