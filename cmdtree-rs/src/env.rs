//! The per-invocation environment chain.
//!
//! Each command reached while dispatching gets its own [`Env`], linked to the
//! environment of its parent command. The chain lives on the stack of the
//! dispatch call and is discarded when that call returns.

use std::cell::OnceCell;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crate::command::Command;
use crate::context::{Cause, Context};
use crate::help::HelpFlags;
use crate::{CliError, UsageError};

// ============================================================================
// Output sinks
// ============================================================================

/// A shared destination for diagnostic output.
#[derive(Clone)]
pub struct Sink(Arc<Mutex<Box<dyn Write + Send>>>);

impl Sink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// The process standard error stream.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// A sink that drops everything written to it.
    pub fn discard() -> Self {
        Self::new(io::sink())
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sink")
    }
}

/// An in-memory sink whose contents can be read back.
///
/// ```
/// use std::io::Write;
/// use cmdtree::Buffer;
///
/// let buf = Buffer::new();
/// write!(buf.sink(), "hello").unwrap();
/// assert_eq!(buf.contents(), "hello");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> Sink {
        Sink::new(self.clone())
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Environment
// ============================================================================

/// The environment passed to the hooks and action of a command.
///
/// `C` is the caller's configuration payload. It is cloned into each child
/// environment, so shared mutable configuration should live behind handles
/// such as [`Flag`](crate::Flag) or `Arc`.
pub struct Env<'a, C = ()> {
    pub(crate) parent: Option<&'a Env<'a, C>>,
    pub(crate) command: &'a Command<C>,
    pub(crate) config: C,
    pub(crate) args: Vec<String>,
    pub(crate) log: Sink,
    pub(crate) merge_flags: bool,
    pub(crate) context: OnceCell<Context>,
}

impl<'a, C> Env<'a, C> {
    pub(crate) fn root(command: &'a Command<C>, config: C) -> Self {
        Self {
            parent: None,
            command,
            config,
            args: Vec::new(),
            log: Sink::stderr(),
            merge_flags: false,
            context: OnceCell::new(),
        }
    }

    /// Direct diagnostic output to `sink` instead of standard error.
    pub fn with_log(mut self, sink: Sink) -> Self {
        self.log = sink;
        self
    }

    /// Allow each command's flags to appear anywhere among its remaining
    /// tokens, not only before its first non-flag token.
    pub fn with_merge_flags(mut self, merge: bool) -> Self {
        self.merge_flags = merge;
        self
    }

    /// Give this environment its own cancellation handle.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.context = OnceCell::from(ctx);
        self
    }

    /// The parent command's environment, or `None` at the root.
    pub fn parent(&self) -> Option<&'a Env<'a, C>> {
        self.parent
    }

    pub fn command(&self) -> &'a Command<C> {
        self.command
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut C {
        &mut self.config
    }

    /// Replace the configuration for this command and its subcommands.
    pub fn set_config(&mut self, config: C) {
        self.config = config;
    }

    /// Arguments left for this command after flag parsing.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The diagnostic sink. Write to it with `write!(env.log(), ...)`.
    pub fn log(&self) -> Sink {
        self.log.clone()
    }

    pub fn set_log(&mut self, sink: Sink) {
        self.log = sink;
    }

    pub fn merges_flags(&self) -> bool {
        self.merge_flags
    }

    pub fn set_merge_flags(&mut self, merge: bool) {
        self.merge_flags = merge;
    }

    /// Make `ctx` the cancellation handle for this command and its
    /// subcommands.
    pub fn set_context(&mut self, ctx: Context) {
        self.context = OnceCell::from(ctx);
    }

    /// The handle owned by this environment, if any.
    pub fn owned_context(&self) -> Option<&Context> {
        self.context.get()
    }

    /// The nearest cancellation handle up the chain. If no environment owns
    /// one, a handle is created at the root on first use.
    pub fn context(&self) -> Context {
        let mut env = self;
        loop {
            if let Some(ctx) = env.context.get() {
                return ctx.clone();
            }
            match env.parent {
                Some(parent) => env = parent,
                None => return env.context.get_or_init(Context::new).clone(),
            }
        }
    }

    /// Cancel the nearest owned handle up the chain. Returns `false` if there
    /// is none, or it was already canceled.
    pub fn cancel(&self, cause: Cause) -> bool {
        self.ancestors()
            .find_map(|env| env.context.get())
            .is_some_and(|ctx| ctx.cancel(cause))
    }

    /// This environment followed by its parents, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Env<'a, C>> + '_ {
        std::iter::successors(Some(self), |env| env.parent)
    }

    /// Command names from the root down to this command.
    pub fn path(&self) -> Vec<&'a str> {
        let mut names: Vec<&'a str> = self.ancestors().map(|env| env.command.name()).collect();
        names.reverse();
        names
    }

    /// A usage error attributed to this command.
    pub fn usage_error(&self, message: impl Into<String>) -> CliError {
        CliError::Usage(UsageError::new(self, message.into(), None))
    }

    /// An owned record of this environment that can outlive the dispatch.
    pub fn snapshot(&self) -> EnvSnapshot {
        EnvSnapshot {
            path: self.path().into_iter().map(String::from).collect(),
            args: self.args.clone(),
            command_id: command_id(self.command),
        }
    }

    /// Usage block for this command, as shown in help output.
    pub(crate) fn usage_text(&self) -> String {
        self.command.info(HelpFlags::default()).usage_block()
    }
}

impl<'a, C: Clone> Env<'a, C> {
    /// Environment for the subcommand `command`, inheriting the sink, merge
    /// mode and configuration of this one.
    pub(crate) fn child<'b>(&'b self, command: &'b Command<C>, args: Vec<String>) -> Env<'b, C> {
        Env {
            parent: Some(self),
            command,
            config: self.config.clone(),
            args,
            log: self.log.clone(),
            merge_flags: self.merge_flags,
            context: OnceCell::new(),
        }
    }
}

impl<C> fmt::Debug for Env<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("path", &self.path())
            .field("args", &self.args)
            .field("merge_flags", &self.merge_flags)
            .field("context", &self.context.get())
            .finish()
    }
}

fn command_id<C>(command: &Command<C>) -> usize {
    command as *const Command<C> as usize
}

/// An owned record of an [`Env`], kept by errors that outlive the dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    path: Vec<String>,
    args: Vec<String>,
    command_id: usize,
}

impl EnvSnapshot {
    /// Command names from the root down to the recorded command.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Name of the recorded command.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether the record was taken for `command` (by identity, not name).
    pub fn is_command<C>(&self, command: &Command<C>) -> bool {
        self.command_id == command_id(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Command {
        Command::new("root").subcommand(Command::new("sub").subcommand(Command::new("leaf")))
    }

    #[test]
    fn test_child_inherits_settings() {
        let root = tree();
        let buf = Buffer::new();
        let env = root
            .new_env(())
            .with_log(buf.sink())
            .with_merge_flags(true);
        let sub = env.child(&root.children()[0], vec!["x".into()]);

        assert!(sub.merges_flags());
        assert_eq!(sub.path(), ["root", "sub"]);
        assert_eq!(sub.args(), ["x"]);
        writeln!(sub.log(), "from sub").unwrap();
        assert_eq!(buf.contents(), "from sub\n");
    }

    #[test]
    fn test_context_is_created_at_root_when_unowned() {
        let root = tree();
        let env = root.new_env(());
        let sub = env.child(&root.children()[0], vec![]);
        assert!(env.owned_context().is_none());

        let ctx = sub.context();
        assert!(sub.owned_context().is_none());
        assert!(env.owned_context().is_some_and(|owned| owned.same_as(&ctx)));
    }

    #[test]
    fn test_cancel_targets_nearest_owner() {
        let root = tree();
        let outer = Context::new();
        let inner = Context::new();
        let env = root.new_env(()).with_context(outer.clone());
        let mut sub = env.child(&root.children()[0], vec![]);
        sub.set_context(inner.clone());
        let leaf_cmd = &root.children()[0].children()[0];
        let leaf = sub.child(leaf_cmd, vec![]);

        assert!(leaf.context().same_as(&inner));
        assert!(leaf.cancel(Cause::Canceled));
        assert!(inner.is_cancelled());
        assert!(!outer.is_cancelled());
    }

    #[test]
    fn test_cancel_without_owner_creates_nothing() {
        let root = tree();
        let env = root.new_env(());
        assert!(!env.cancel(Cause::Canceled));
        assert!(env.owned_context().is_none());
    }

    #[test]
    fn test_snapshot_identity() {
        let root = tree();
        let env = root.new_env(());
        let sub = env.child(&root.children()[0], vec!["a".into()]);
        let snap = sub.snapshot();
        assert_eq!(snap.name(), "sub");
        assert_eq!(snap.args(), ["a"]);
        assert!(snap.is_command(&root.children()[0]));
        assert!(!snap.is_command(&root));
    }
}
