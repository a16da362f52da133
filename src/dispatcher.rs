//! Sequential, fail-fast execution of a [`CommandChain`].
//!
//! Each invocation is resolved through the [`Registry`] and run to completion before
//! the next one is looked at. The first unknown command or failing handler aborts
//! the rest of the chain. A chain that runs nothing (it was empty) ends with one
//! call of the fallback command with no options.

use std::fmt;
use std::io::Write;

use crate::chain::{CommandChain, CommandInvocation};
use crate::command::CommandContext;
use crate::config::Config;
use crate::env::Environment;
use crate::error::DispatchError;
use crate::external::TimeoutElapsed;
use crate::registry::Registry;

const BANNER_RULE: &str = "-----------------------------------";

/// Command name that runs `help` with the rest of its invocation as options.
const HELP_SHORTHAND: &str = "?";

/// Where the dispatcher is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    /// About to run (or running) the invocation at this index.
    Running(usize),
    Aborted,
    FallingBack,
    Done,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchState::Idle => write!(f, "idle"),
            DispatchState::Running(i) => write!(f, "running({i})"),
            DispatchState::Aborted => write!(f, "aborted"),
            DispatchState::FallingBack => write!(f, "falling-back"),
            DispatchState::Done => write!(f, "done"),
        }
    }
}

/// Summary of a run that reached [`DispatchState::Done`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReport {
    /// Invocations of the chain that ran successfully.
    pub executed: usize,
    /// Whether the fallback command ran.
    pub fell_back: bool,
}

pub struct Dispatcher {
    registry: Registry,
    env: Environment,
    fallback: String,
}

impl Dispatcher {
    pub fn new(registry: Registry, env: Environment, fallback: impl Into<String>) -> Self {
        Self {
            registry,
            env,
            fallback: fallback.into(),
        }
    }

    /// Wire the standard registry and an environment carrying the toolchain exports.
    pub fn from_config(config: &Config, mut env: Environment) -> Self {
        env.export_toolchain(&config.toolchain);
        Self::new(Registry::from_config(config), env, config.fallback.clone())
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Check at startup that the fallback command resolves.
    pub fn validate(&self) -> Result<(), DispatchError> {
        self.registry.validate(&self.env, &self.fallback)
    }

    /// Run the chain, writing banners and diagnostics to `out`.
    ///
    /// `Err` carries the reason the chain aborted; the diagnostic for it has
    /// already been written to `out`.
    pub fn run(&self, chain: &CommandChain, out: &mut dyn Write) -> Result<ChainReport, DispatchError> {
        let mut state = DispatchState::Idle;
        let mut executed = 0;

        for (index, invocation) in chain.iter().enumerate() {
            transition(&mut state, DispatchState::Running(index));
            if let Err(err) = self.run_one(invocation, out) {
                transition(&mut state, DispatchState::Aborted);
                return Err(err);
            }
            executed += 1;
        }

        // Only an empty chain gets here with nothing executed.
        let fell_back = executed == 0;
        if fell_back {
            transition(&mut state, DispatchState::FallingBack);
            let fallback = CommandInvocation::new(self.fallback.clone(), Vec::new());
            if let Err(err) = self.run_one(&fallback, out) {
                transition(&mut state, DispatchState::Aborted);
                return Err(err);
            }
        }

        transition(&mut state, DispatchState::Done);
        Ok(ChainReport { executed, fell_back })
    }

    fn run_one(&self, invocation: &CommandInvocation, out: &mut dyn Write) -> Result<(), DispatchError> {
        let name = match invocation.name.as_str() {
            HELP_SHORTHAND => "help",
            name => name,
        };
        let handler = match self.registry.resolve(&self.env, name, &invocation.options) {
            Ok(handler) => handler,
            Err(err) => {
                self.report_not_found(&err, out)?;
                return Err(err);
            }
        };

        tracing::info!(command = name, options = ?invocation.options, "executing");
        writeln!(out, "{BANNER_RULE} Executing : {name} {BANNER_RULE}\n")?;
        out.flush()?;

        let ctx = CommandContext {
            env: &self.env,
            registry: &self.registry,
        };
        let outcome = handler.execute(out, &ctx);

        writeln!(out, "\n{BANNER_RULE} End executing : {name} {BANNER_RULE}\n")?;

        let failure = match outcome {
            Ok(0) => None,
            Ok(code) => Some(DispatchError::HandlerExecutionFailed {
                name: name.to_owned(),
                code,
            }),
            Err(err) => Some(match err.downcast_ref::<TimeoutElapsed>() {
                Some(TimeoutElapsed(after)) => DispatchError::HandlerTimedOut {
                    name: name.to_owned(),
                    after: *after,
                },
                None => DispatchError::HandlerSpawnFailed {
                    name: name.to_owned(),
                    reason: format!("{err:#}"),
                },
            }),
        };

        match failure {
            None => {
                out.flush()?;
                Ok(())
            }
            Some(err) => {
                tracing::warn!(command = name, %err, "handler failed");
                writeln!(out, "Error: {err}")?;
                out.flush()?;
                Err(err)
            }
        }
    }

    fn report_not_found(&self, err: &DispatchError, out: &mut dyn Write) -> Result<(), DispatchError> {
        if let DispatchError::HandlerNotFound { name, available } = err {
            tracing::warn!(command = %name, "unknown command");
            writeln!(
                out,
                "Error: {name} is not a command, run [nken {}] to list commands",
                self.fallback
            )?;
            writeln!(out, "Command \"{name}\" not found!")?;
            writeln!(out)?;
            writeln!(out, "Available commands:")?;
            for command in available {
                writeln!(out, "- {command}")?;
            }
            out.flush()?;
        }
        Ok(())
    }
}

fn transition(state: &mut DispatchState, next: DispatchState) {
    tracing::debug!(from = %state, to = %next, "dispatch state");
    *state = next;
}
