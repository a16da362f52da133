use crate::command::{CommandContext, CommandFactory, CommandSummary, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::registry::Factory;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::io::Write;

/// Commands implemented in-process.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "help".
    fn name() -> &'static str;

    /// One-line description shown in command listings.
    fn description() -> &'static str;

    /// Executes the command, writing its output to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, ctx: &CommandContext<'_>) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        ctx: &CommandContext<'_>,
    ) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, stdout, ctx) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stdout, "{}: {e}", T::name())?;
                Ok(1)
            }
        }
    }
}

/// Result of `--help` or a parse failure: argh's text and whether it was an error.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _ctx: &CommandContext<'_>,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.output.trim_end())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        options: &[String],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        let args: Vec<&str> = options.iter().map(String::as_str).collect();
        Some(match T::from_args(&[name], &args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }

    fn list(&self, _env: &Environment) -> Vec<CommandSummary> {
        vec![CommandSummary {
            name: T::name().to_owned(),
            description: T::description().to_owned(),
        }]
    }
}

#[derive(FromArgs)]
/// Show the available commands and how to chain them.
pub struct Help {
    #[argh(positional, greedy)]
    /// commands to describe; every command is listed when omitted.
    pub commands: Vec<String>,
}

impl Help {
    fn lists_everything(&self) -> bool {
        match self.commands.first() {
            None => true,
            Some(first) => matches!(first.as_str(), "" | "?" | "help"),
        }
    }
}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn description() -> &'static str {
        "show the available commands and how to chain them"
    }

    fn execute(self, stdout: &mut dyn Write, ctx: &CommandContext<'_>) -> Result<ExitCode> {
        let available = ctx.registry.available(ctx.env);

        writeln!(stdout, "nken: chained toolchain commands")?;
        writeln!(stdout, "--------------------------------")?;

        if self.lists_everything() {
            writeln!(stdout, "Available commands:")?;
            for summary in &available {
                writeln!(stdout, " - {} : {}", summary.name, summary.description)?;
            }
        } else {
            for name in &self.commands {
                match available.iter().find(|summary| summary.name == *name) {
                    Some(summary) => {
                        writeln!(stdout, "{} : {}", summary.name, summary.description)?;
                        // Handler files carry no metadata, so the listing stops at their location.
                        writeln!(
                            stdout,
                            "   options are not listed here, run [nken {} --help] for them",
                            summary.name
                        )?;
                    }
                    None => writeln!(stdout, "Unknown command: '{name}'")?,
                }
            }
        }

        writeln!(stdout)?;
        writeln!(stdout, "Usage:")?;
        writeln!(stdout, " - nken <command> [options]")?;
        writeln!(stdout, " - nken <command> [options] ; <command> [options]")?;
        writeln!(stdout, "Help for a specific command:")?;
        writeln!(stdout, " - nken help <command>")?;
        Ok(0)
    }
}
