//! Splitting of the raw argument vector into a chain of command invocations.
//!
//! The grammar is flat: `name [option...] ; name [option...] ; ...`. A token is a
//! separator only when it is exactly [`SEPARATOR`]. Separators are consumed and never
//! recorded, and runs of separators (or a trailing one) never produce empty invocations.

use std::ffi::OsString;

use crate::error::ArgumentError;

/// The literal token that separates two invocations of a chain.
pub const SEPARATOR: &str = ";";

/// One step of a chain: the command name and its options in argument order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub options: Vec<String>,
}

impl CommandInvocation {
    pub fn new(name: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

/// How tokens containing the separator character are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SplitMode {
    /// Only a token equal to `;` splits the chain. Everything else is kept verbatim.
    #[default]
    Strict,
    /// Compatibility with the old front-end: a token that contains `;` without being
    /// equal to it first contributes its text before the first `;` (when non-empty)
    /// as an option, and is then recorded whole as usual. Nothing is split off.
    Legacy,
}

/// An ordered, immutable sequence of invocations built once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandChain {
    invocations: Vec<CommandInvocation>,
}

impl CommandChain {
    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn invocations(&self) -> &[CommandInvocation] {
        &self.invocations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandInvocation> {
        self.invocations.iter()
    }
}

impl<'a> IntoIterator for &'a CommandChain {
    type Item = &'a CommandInvocation;
    type IntoIter = std::slice::Iter<'a, CommandInvocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.invocations.iter()
    }
}

struct ChainBuilder {
    mode: SplitMode,
    invocations: Vec<CommandInvocation>,
    current: Option<CommandInvocation>,
}

impl ChainBuilder {
    fn new(mode: SplitMode) -> Self {
        Self {
            mode,
            invocations: Vec::new(),
            current: None,
        }
    }

    fn push_token(&mut self, token: &str) {
        if token == SEPARATOR {
            self.finish_current();
            return;
        }

        let legacy_prefix = match self.mode {
            SplitMode::Legacy if token.contains(SEPARATOR) => token
                .split(SEPARATOR)
                .next()
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_owned),
            _ => None,
        };

        match &mut self.current {
            Some(invocation) => {
                invocation.options.extend(legacy_prefix);
                invocation.options.push(token.to_owned());
            }
            None => {
                let options = legacy_prefix.into_iter().collect();
                self.current = Some(CommandInvocation::new(token, options));
            }
        }
    }

    fn finish_current(&mut self) {
        if let Some(invocation) = self.current.take() {
            self.invocations.push(invocation);
        }
    }

    fn build(mut self) -> CommandChain {
        self.finish_current();
        CommandChain {
            invocations: self.invocations,
        }
    }
}

/// Build the chain for the arguments that follow the program name.
///
/// # Examples
/// ```
/// use nken::chain::{parse_chain, SplitMode};
/// let chain = parse_chain(["gen", "msvc", ";", "build", "gradle"], SplitMode::Strict);
/// assert_eq!(chain.len(), 2);
/// assert_eq!(chain.invocations()[1].name, "build");
/// ```
pub fn parse_chain<I, S>(tokens: I, mode: SplitMode) -> CommandChain
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut builder = ChainBuilder::new(mode);
    for token in tokens {
        builder.push_token(token.as_ref());
    }
    builder.build()
}

/// Convert raw process arguments to tokens, rejecting any that is not valid UTF-8.
///
/// Handler names and options are passed on as text, so a lossy conversion would
/// silently run a different command or hand a handler a different path.
pub fn decode_args<I>(args: I) -> Result<Vec<String>, ArgumentError>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(position, arg)| {
            arg.into_string()
                .map_err(|raw| ArgumentError::NotUnicode { position: position + 1, raw })
        })
        .collect()
}
