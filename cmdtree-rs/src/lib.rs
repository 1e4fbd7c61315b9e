//! # cmdtree: dispatch for trees of named commands
//!
//! A program describes its commands as a tree of [`Command`] values, each
//! with its own flags, help text, and nested subcommands. [`run`] walks the
//! argument list through that tree, parsing each command's flags as it
//! goes, and executes the command that was selected or prints help.
//!
//! ## Core Principles
//!
//! - **Scoped flags**: every command declares its own flags; with merging
//!   enabled they may appear anywhere after the command's name
//! - **Lazy declaration**: a command's flag hook runs once, the first time
//!   dispatch reaches it
//! - **Contained failures**: a panic anywhere in a hook or action comes back
//!   as a [`CliError::Panic`], never as a crashed process
//! - **Help as a signal**: printing help is reported as
//!   [`CliError::HelpRequested`], which callers treat as informational
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cmdtree::{help_command, run_or_fail, Command, Flag, HelpTopic};
//!
//! let shout = Flag::new(false);
//! let bind = shout.clone();
//!
//! let root: Command = Command::new("echo-tool")
//!     .help("Echo things back.")
//!     .subcommand(help_command(vec![HelpTopic::new("quoting", "Arguments are echoed verbatim.")]))
//!     .subcommand(
//!         Command::new("echo")
//!             .usage("text ...")
//!             .help("Print the arguments.")
//!             .set_flags(move |_env, fs| fs.var(&bind, "shout", false, "Print in upper case"))
//!             .run(move |env| {
//!                 let text = env.args().join(" ");
//!                 println!("{}", if shout.get() { text.to_uppercase() } else { text });
//!                 Ok(())
//!             }),
//!     );
//!
//! let mut env = root.new_env(()).with_merge_flags(true);
//! run_or_fail(&mut env, std::env::args().skip(1));
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

pub mod adapt;
pub mod build_info;
pub mod command;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod flags;
pub mod help;
mod recover;
pub mod split;
pub mod tracing_support;

pub use build_info::{version_command, version_short, VersionInfo};
pub use command::Command;
pub use context::{Cause, Context};
pub use dispatch::{report, run, run_or_fail};
pub use env::{Buffer, Env, EnvSnapshot, Sink};
pub use flags::{Flag, FlagError, FlagSet, FlagType, Value};
pub use help::{fail_with_usage, help_command, CommandInfo, FlagInfo, HelpFlags, HelpTopic};
pub use tracing_support::{init_subscriber, InitError, TracingConfig, TracingFormat, UnknownFormat};

#[cfg(feature = "logging")]
pub use tracing_support::init_subscriber_with_config;

/// Result type for hooks, actions, and dispatch.
pub type CliResult<T = ()> = Result<T, CliError>;

// ============================================================================
// Error Types
// ============================================================================

/// Exit status for help output and usage errors.
pub const EXIT_USAGE: i32 = 2;

/// Exit status for every other failure.
pub const EXIT_FAILURE: i32 = 1;

/// Top-level error type for dispatch.
///
/// Help and usage problems (exit code 2) are separated from failures of the
/// program itself (exit code 1).
#[derive(Debug, Error)]
pub enum CliError {
    /// Help text was printed. Informational, not a failure of the program.
    #[error("help requested")]
    HelpRequested,

    /// The arguments given to a command were malformed.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// A command's init hook failed.
    #[error("initializing {command:?}: {source}")]
    Init {
        command: String,
        #[source]
        source: Box<CliError>,
    },

    /// A hook or action panicked.
    #[error(transparent)]
    Panic(#[from] Box<PanicError>),

    /// Writing help or diagnostics failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other error reported by an action.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::HelpRequested | CliError::Usage(_) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }

    /// Wrap an arbitrary error as an action failure.
    pub fn other(err: impl Into<anyhow::Error>) -> Self {
        CliError::Other(err.into())
    }

    pub fn is_help(&self) -> bool {
        matches!(self, CliError::HelpRequested)
    }

    pub fn as_usage(&self) -> Option<&UsageError> {
        match self {
            CliError::Usage(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_panic(&self) -> Option<&PanicError> {
        match self {
            CliError::Panic(p) => Some(p.as_ref()),
            _ => None,
        }
    }
}

/// Malformed arguments for one command.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UsageError {
    env: EnvSnapshot,
    message: String,
    usage: String,
    #[source]
    cause: Option<FlagError>,
}

impl UsageError {
    pub(crate) fn new<C>(env: &Env<'_, C>, message: String, cause: Option<FlagError>) -> Self {
        Self {
            env: env.snapshot(),
            message,
            usage: env.usage_text(),
            cause,
        }
    }

    pub(crate) fn from_flags<C>(env: &Env<'_, C>, cause: FlagError) -> Self {
        Self::new(env, cause.to_string(), Some(cause))
    }

    /// The environment of the command at fault.
    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Usage summary of the command at fault (may be empty).
    pub fn usage(&self) -> &str {
        &self.usage
    }

    /// The flag parsing failure behind this error, if any.
    pub fn flag_error(&self) -> Option<&FlagError> {
        self.cause.as_ref()
    }
}

/// A panic intercepted during dispatch.
pub struct PanicError {
    env: EnvSnapshot,
    stack: String,
    message: Option<String>,
    value: Mutex<Box<dyn Any + Send>>,
}

impl PanicError {
    pub(crate) fn new(env: EnvSnapshot, stack: String, value: Box<dyn Any + Send>) -> Self {
        let message = value
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| value.downcast_ref::<String>().cloned());
        Self {
            env,
            stack,
            message,
            value: Mutex::new(value),
        }
    }

    /// The environment of the command that was running when the panic
    /// occurred.
    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// Panic location and backtrace captured where the panic occurred.
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// The panic value, if it was a string.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Inspect the raw panic value.
    pub fn with_value<R>(&self, f: impl FnOnce(&(dyn Any + Send)) -> R) -> R {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        f(&**value)
    }

    /// Take the raw panic value, e.g. to resume the panic.
    pub fn into_value(self) -> Box<dyn Any + Send> {
        self.value.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.message.as_deref().unwrap_or("(non-string panic value)");
        write!(f, "panic in {:?}: {}", self.env.path().join(" "), value)
    }
}

impl fmt::Debug for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicError")
            .field("env", &self.env)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl std::error::Error for PanicError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_and_usage_exit_code() {
        assert_eq!(CliError::HelpRequested.exit_code(), EXIT_USAGE);
        let cmd: Command = Command::new("x");
        let env = cmd.new_env(());
        assert_eq!(env.usage_error("bad").exit_code(), EXIT_USAGE);
    }

    #[test]
    fn test_failure_exit_code() {
        let err = CliError::other(anyhow::anyhow!("nope"));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
        assert_eq!(err.to_string(), "nope");

        let init = CliError::Init {
            command: "db".into(),
            source: Box::new(err),
        };
        assert_eq!(init.exit_code(), EXIT_FAILURE);
        assert_eq!(init.to_string(), "initializing \"db\": nope");
    }

    #[test]
    fn test_usage_error_carries_usage_and_cause() {
        let cmd: Command = Command::new("tool").usage("tool [flags] file");
        let env = cmd.new_env(());
        let usage = UsageError::from_flags(&env, FlagError::Undefined("q".into()));
        assert_eq!(usage.message(), "flag provided but not defined: -q");
        assert_eq!(usage.env().name(), "tool");
        assert!(usage.usage().contains("tool [flags] file"));
        assert!(std::error::Error::source(&usage).is_some());
    }

    #[test]
    fn test_panic_error_value() {
        let err = PanicError::new(EnvSnapshot::default(), String::new(), Box::new("boom"));
        assert_eq!(err.message(), Some("boom"));
        assert!(err.with_value(|v| v.is::<&str>()));
        assert!(err.to_string().contains("boom"));
        let value = err.into_value();
        assert_eq!(value.downcast_ref::<&str>(), Some(&"boom"));

        let opaque = PanicError::new(EnvSnapshot::default(), String::new(), Box::new(42_u8));
        assert_eq!(opaque.message(), None);
        assert!(opaque.with_value(|v| v.downcast_ref::<u8>() == Some(&42)));
    }
}
