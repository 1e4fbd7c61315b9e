//! Declarative command trees.

use std::cell::{OnceCell, Ref, RefCell};
use std::fmt;

use crate::env::Env;
use crate::flags::FlagSet;
use crate::CliResult;

/// Hook declaring a command's flags. Runs at most once per command.
pub type SetFlagsFn<C> = Box<dyn Fn(&Env<'_, C>, &mut FlagSet) + Send>;

/// Hook run after flag parsing and before subcommands are explored.
pub type InitFn<C> = Box<dyn Fn(&mut Env<'_, C>) -> CliResult + Send>;

/// The action of a command.
pub type RunFn<C> = Box<dyn Fn(&Env<'_, C>) -> CliResult + Send>;

/// A named command with its own flags, help, and subcommands.
///
/// When dispatch first reaches a command, its flag hook (if any) declares
/// the command's flags. Unless the command does its own flag handling, its
/// tokens are then parsed against those flags. The init hook runs next; then
/// any remaining tokens are matched against subcommands, and failing that
/// the action runs with them.
///
/// A `Command` is not `Sync`: flag state is filled in lazily and updated by
/// each dispatch, so dispatches sharing a tree must run one at a time.
///
/// # Example
///
/// ```
/// use cmdtree::Command;
///
/// let root: Command = Command::new("tool")
///     .help("Do tool things.")
///     .subcommand(
///         Command::new("greet")
///             .usage("name")
///             .help("Print a greeting.")
///             .run(|env| {
///                 println!("hello, {}", env.args().join(" "));
///                 Ok(())
///             }),
///     );
///
/// assert!(root.find_subcommand("greet").is_some_and(|c| c.is_runnable()));
/// ```
pub struct Command<C = ()> {
    name: String,
    usage: String,
    help: String,
    custom_flags: bool,
    unlisted: bool,
    pub(crate) set_flags: Option<SetFlagsFn<C>>,
    pub(crate) init: Option<InitFn<C>>,
    pub(crate) run: Option<RunFn<C>>,
    commands: Vec<Command<C>>,
    flags: OnceCell<RefCell<FlagSet>>,
}

impl<C> Command<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: String::new(),
            help: String::new(),
            custom_flags: false,
            unlisted: false,
            set_flags: None,
            init: None,
            run: None,
            commands: Vec::new(),
            flags: OnceCell::new(),
        }
    }

    /// Usage summary. Each line is one usage sense; a leading command name
    /// is optional and stripped for display.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Help text. The first non-blank line is the synopsis.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// If set, the command's tokens are passed to it unparsed.
    pub fn custom_flags(mut self, custom: bool) -> Self {
        self.custom_flags = custom;
        self
    }

    /// If set, the command is left out of help listings and help-topic
    /// lookups, but can still be run by name.
    pub fn unlisted(mut self, unlisted: bool) -> Self {
        self.unlisted = unlisted;
        self
    }

    pub fn subcommand(mut self, command: Command<C>) -> Self {
        self.commands.push(command);
        self
    }

    pub fn subcommands(mut self, commands: impl IntoIterator<Item = Command<C>>) -> Self {
        self.commands.extend(commands);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage_text(&self) -> &str {
        &self.usage
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }

    /// First non-blank line of the help text.
    pub fn synopsis(&self) -> &str {
        self.help.trim().lines().next().unwrap_or("")
    }

    pub fn has_custom_flags(&self) -> bool {
        self.custom_flags
    }

    pub fn is_unlisted(&self) -> bool {
        self.unlisted
    }

    pub fn children(&self) -> &[Command<C>] {
        &self.commands
    }

    /// Whether the command has an action or an init hook.
    pub fn is_runnable(&self) -> bool {
        self.run.is_some() || self.init.is_some()
    }

    pub fn has_action(&self) -> bool {
        self.run.is_some()
    }

    /// Whether any descendant of this command is runnable.
    pub fn has_runnable_subcommands(&self) -> bool {
        self.commands
            .iter()
            .any(|c| c.is_runnable() || c.has_runnable_subcommands())
    }

    /// The direct subcommand called `name`, listed or not.
    pub fn find_subcommand(&self, name: &str) -> Option<&Command<C>> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// A root environment for dispatching this command.
    pub fn new_env(&self, config: C) -> Env<'_, C> {
        Env::root(self, config)
    }

    /// The command's flags, once they have been declared.
    pub fn flags(&self) -> Option<Ref<'_, FlagSet>> {
        self.flags.get().map(RefCell::borrow)
    }

    /// Whether the flag hook has already run.
    pub fn is_materialized(&self) -> bool {
        self.flags.get().is_some()
    }

    /// Declare this command's flags against `env`, unless already done.
    pub(crate) fn materialize(&self, env: &Env<'_, C>) -> &RefCell<FlagSet> {
        self.flags.get_or_init(|| {
            let mut fs = FlagSet::new();
            if let Some(hook) = &self.set_flags {
                tracing::trace!(command = %self.name, "declaring flags");
                hook(env, &mut fs);
            }
            RefCell::new(fs)
        })
    }
}

impl<C: 'static> Command<C> {
    /// Set the hook that declares this command's flags.
    pub fn set_flags<F>(mut self, f: F) -> Self
    where
        F: Fn(&Env<'_, C>, &mut FlagSet) + Send + 'static,
    {
        self.set_flags = Some(Box::new(f));
        self
    }

    /// Set the init hook. It may adjust the environment (configuration,
    /// sink, merge mode, cancellation handle) for this command's subtree.
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Env<'_, C>) -> CliResult + Send + 'static,
    {
        self.init = Some(Box::new(f));
        self
    }

    /// Set the action.
    pub fn run<F>(mut self, f: F) -> Self
    where
        F: Fn(&Env<'_, C>) -> CliResult + Send + 'static,
    {
        self.run = Some(Box::new(f));
        self
    }
}

impl<C> fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("runnable", &self.is_runnable())
            .field("unlisted", &self.unlisted)
            .field("custom_flags", &self.custom_flags)
            .field("commands", &self.commands)
            .finish()
    }
}
