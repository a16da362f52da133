//! Name → handler resolution.
//!
//! A [`Registry`] is an ordered list of [`CommandFactory`] values assembled once at
//! startup. Resolution asks each factory in turn and the first answer wins. The same
//! registry backs the "available commands" listing, so what is listed is exactly
//! what resolves.

use std::collections::BTreeMap;

use crate::builtin::Help;
use crate::command::{CommandFactory, CommandSummary, ExecutableCommand};
use crate::config::Config;
use crate::env::Environment;
use crate::error::DispatchError;
use crate::external::HandlerDir;

/// Factory allows creating instances of builtin commands.
///
/// The type parameter selects the builtin; see [`crate::builtin`].
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

pub struct Registry {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl Registry {
    /// Create a registry from factories, in lookup order.
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    /// The standard registry: the configured handler directory, then builtins.
    ///
    /// Handler files come first so a `help` handler on disk replaces the builtin one.
    pub fn from_config(config: &Config) -> Self {
        Self::new(vec![
            Box::new(HandlerDir::from_config(config)),
            Box::new(Factory::<Help>::default()),
        ])
    }

    /// Resolve `name` to a handler bound to `options`.
    ///
    /// Every call hits the factories afresh; nothing is cached between calls.
    pub fn resolve(
        &self,
        env: &Environment,
        name: &str,
        options: &[String],
    ) -> Result<Box<dyn ExecutableCommand>, DispatchError> {
        self.factories
            .iter()
            .find_map(|factory| factory.try_create(env, name, options))
            .ok_or_else(|| DispatchError::HandlerNotFound {
                name: name.to_owned(),
                available: self.names(env),
            })
    }

    /// Every resolvable command, sorted by name.
    ///
    /// When two factories offer the same name, the entry of the one that would win
    /// resolution is kept.
    pub fn available(&self, env: &Environment) -> Vec<CommandSummary> {
        let mut by_name = BTreeMap::new();
        for factory in &self.factories {
            for summary in factory.list(env) {
                by_name.entry(summary.name.clone()).or_insert(summary);
            }
        }
        by_name.into_values().collect()
    }

    pub fn names(&self, env: &Environment) -> Vec<String> {
        self.available(env).into_iter().map(|s| s.name).collect()
    }

    /// Eager startup check: the fallback command has to resolve.
    pub fn validate(&self, env: &Environment, fallback: &str) -> Result<(), DispatchError> {
        self.resolve(env, fallback, &[])?;
        tracing::debug!(
            fallback,
            commands = self.factories.iter().map(|f| f.list(env).len()).sum::<usize>(),
            "registry validated"
        );
        Ok(())
    }
}
