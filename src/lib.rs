//! A front-end that chains developer-toolchain commands.
//!
//! `nken gen msvc ; build msvc --config release` runs the `gen` handler, then the
//! `build` handler, stopping at the first one that is unknown or fails. Handlers
//! are files named `<name>.<extension>` in a handler directory, run as child
//! processes, plus a few builtins such as `help`.
//!
//! The pieces, in the order a run uses them:
//! - [`chain`] turns the argument vector into a [`chain::CommandChain`];
//! - [`registry`] resolves each command name to a handler;
//! - [`dispatcher`] runs the chain and falls back to `help` when it is empty.
//!
//! [`config`] and [`env`] describe where handlers live and what they see.

mod builtin;
pub mod chain;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod env;
pub mod error;
mod external;
pub mod registry;

pub use chain::{CommandChain, CommandInvocation, SplitMode, decode_args, parse_chain};
pub use config::Config;
pub use dispatcher::{ChainReport, DispatchState, Dispatcher};
pub use env::Environment;
pub use error::{ArgumentError, ConfigError, DispatchError};
pub use external::{HandlerDir, TimeoutElapsed};
