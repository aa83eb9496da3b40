//! Command descriptors and the lookup table built from them.

use std::collections::HashMap;
use std::fmt;

use super::{CommandContext, CommandError};
use crate::error::DhtShellError;
use crate::Result;

/// What a session does after a command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading commands.
    Continue,
    /// Close this session.
    Close,
}

/// Handler invoked with the context and the argument tokens (command
/// name excluded).
pub type Handler = fn(&mut CommandContext<'_>, &[String]) -> std::result::Result<Flow, CommandError>;

/// Accepted number of argument tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    /// Check whether `count` arguments are acceptable.
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Self::Exact(n) => count == n,
            Self::AtLeast(n) => count >= n,
            Self::Between(min, max) => (min..=max).contains(&count),
        }
    }
}

/// Immutable command descriptor.
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub description: &'static str,
    pub arity: Arity,
    pub handler: Handler,
}

impl Command {
    /// Validate arity, then run the handler.
    pub fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[String],
    ) -> std::result::Result<Flow, CommandError> {
        if !self.arity.accepts(args.len()) {
            return Err(CommandError::Usage(self.usage));
        }
        (self.handler)(ctx, args)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Ordered command list plus a name/alias index.
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    index: HashMap<&'static str, usize>,
}

impl CommandRegistry {
    /// Build a registry, failing if any name or alias is taken twice.
    pub fn register<I>(commands: I) -> Result<Self>
    where
        I: IntoIterator<Item = Command>,
    {
        let commands: Vec<Command> = commands.into_iter().collect();
        let mut index = HashMap::new();

        for (position, command) in commands.iter().enumerate() {
            for name in std::iter::once(&command.name).chain(command.aliases) {
                if index.insert(*name, position).is_some() {
                    return Err(DhtShellError::DuplicateCommand(name.to_string()));
                }
            }
        }

        Ok(Self { commands, index })
    }

    /// Registry holding the built-in command set.
    pub fn builtin() -> Result<Self> {
        Self::register(super::builtin::BUILTIN_COMMANDS.iter().copied())
    }

    /// Exact, case-sensitive lookup by name or alias.
    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.index.get(name).map(|&position| &self.commands[position])
    }

    /// Commands in registration order.
    pub fn list(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
