//! Error types for argument decoding, chain dispatch and configuration loading.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Reasons a chain stops before its end.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler exists for the command name.
    #[error("command \"{name}\" not found")]
    HandlerNotFound {
        name: String,
        /// Commands that did resolve at the time of the lookup.
        available: Vec<String>,
    },

    /// The handler ran and reported failure.
    #[error("command {name} failed (exit code {code})")]
    HandlerExecutionFailed { name: String, code: i32 },

    /// The handler was killed after exceeding the configured timeout.
    #[error("command {name} failed (timed out after {}s)", .after.as_secs())]
    HandlerTimedOut { name: String, after: Duration },

    /// The handler could not be started or waited on.
    #[error("command {name} failed ({reason})")]
    HandlerSpawnFailed { name: String, reason: String },

    /// Writing the console protocol failed.
    #[error("console output error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Process exit code for a run aborted by this error.
    ///
    /// Follows shell conventions where one exists:
    /// - 127: command not found
    /// - 126: command found but not runnable
    /// - 124: timed out (as `timeout(1)`)
    /// - handler failures pass the handler's own code through
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::HandlerNotFound { .. } => 127,
            DispatchError::HandlerExecutionFailed { code, .. } if (1..=255).contains(code) => *code,
            DispatchError::HandlerExecutionFailed { .. } => 1,
            DispatchError::HandlerTimedOut { .. } => 124,
            DispatchError::HandlerSpawnFailed { .. } => 126,
            DispatchError::Io(_) => 74, // EX_IOERR
        }
    }

    /// Name of the command the error is about, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            DispatchError::HandlerNotFound { name, .. }
            | DispatchError::HandlerExecutionFailed { name, .. }
            | DispatchError::HandlerTimedOut { name, .. }
            | DispatchError::HandlerSpawnFailed { name, .. } => Some(name),
            DispatchError::Io(_) => None,
        }
    }
}

/// The argument vector cannot be turned into a chain.
#[derive(Debug, Error)]
pub enum ArgumentError {
    /// `position` is 1-based and does not count the program name.
    #[error("argument {position} is not valid UTF-8: {raw:?}")]
    NotUnicode { position: usize, raw: OsString },
}

impl ArgumentError {
    pub fn exit_code(&self) -> i32 {
        64 // EX_USAGE
    }
}

/// Errors raised while assembling [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`crate::config::Config`].
    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// An environment override holds a value that cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn exit_code(&self) -> i32 {
        78 // EX_CONFIG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_exit_codes_pass_through() {
        let err = DispatchError::HandlerExecutionFailed {
            name: "build".into(),
            code: 3,
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "command build failed (exit code 3)");
    }

    #[test]
    fn out_of_range_handler_codes_become_one() {
        for code in [-1, 0, 256] {
            let err = DispatchError::HandlerExecutionFailed {
                name: "build".into(),
                code,
            };
            assert_eq!(err.exit_code(), 1, "code {code}");
        }
    }

    #[test]
    fn abort_reasons_map_to_shell_codes() {
        let not_found = DispatchError::HandlerNotFound {
            name: "nope".into(),
            available: vec![],
        };
        let timed_out = DispatchError::HandlerTimedOut {
            name: "adb".into(),
            after: Duration::from_secs(5),
        };
        assert_eq!(not_found.exit_code(), 127);
        assert_eq!(timed_out.exit_code(), 124);
        assert_eq!(timed_out.to_string(), "command adb failed (timed out after 5s)");
        assert_eq!(not_found.command(), Some("nope"));
    }

    #[test]
    fn console_errors_name_no_command() {
        let err = DispatchError::from(std::io::Error::other("broken pipe"));
        assert_eq!(err.command(), None);
        assert_eq!(err.exit_code(), 74);
    }

    #[test]
    fn bad_argument_is_a_usage_error() {
        let err = ArgumentError::NotUnicode {
            position: 2,
            raw: OsString::from("out"),
        };
        assert_eq!(err.exit_code(), 64);
        assert_eq!(err.to_string(), "argument 2 is not valid UTF-8: \"out\"");
    }
}
