use crate::env::Environment;
use crate::registry::Registry;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// What a handler can see while it runs.
pub struct CommandContext<'a> {
    /// Variables and working directory for the handler.
    pub env: &'a Environment,
    /// The registry the handler was resolved from, for commands that list or describe others.
    pub registry: &'a Registry,
}

/// A resolved handler, ready to run once.
///
/// In-process commands write to `stdout`. External handlers inherit the process
/// streams, so the caller flushes `stdout` before executing one.
pub trait ExecutableCommand {
    /// Executes the command and reports its exit code.
    ///
    /// `Err` means the command could not be run at all (spawn or wait failure).
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        ctx: &CommandContext<'_>,
    ) -> Result<ExitCode>;
}

/// Source of handlers for command names.
///
/// Returns `None` when the factory doesn't recognize the `name`. Lookups have no
/// side effects and are never cached, so two calls with no change in between
/// return equivalent answers.
pub trait CommandFactory {
    /// Attempt to create a handler for the provided name and options.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        options: &[String],
    ) -> Option<Box<dyn ExecutableCommand>>;

    /// Every command this factory can currently produce, with a one-line description.
    fn list(&self, env: &Environment) -> Vec<CommandSummary>;
}

/// Listing entry for one available command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSummary {
    pub name: String,
    pub description: String,
}
