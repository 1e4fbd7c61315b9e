//! The recursive dispatcher.
//!
//! Each command reached goes through the same steps: declare its flags (once
//! per tree), parse its tokens, run its init hook, then either descend into
//! a subcommand, print help, or run its action.

use std::cell::RefCell;
use std::io::Write;

use crate::context::Cause;
use crate::env::{Env, EnvSnapshot};
use crate::flags::FlagError;
use crate::help;
use crate::recover;
use crate::split::split_flags;
use crate::{CliError, CliResult, PanicError, UsageError};

/// Dispatch `args` through the command tree rooted at `env`.
///
/// Returns [`CliError::HelpRequested`] if help was printed instead of an
/// action running. Panics raised by flag hooks, init hooks, or actions are
/// returned as [`CliError::Panic`]. When the call ends, the handle owned by
/// `env` (if any, including one created lazily by an action) is canceled
/// with the outcome as its cause. A handle that `env` did not own on entry
/// is dropped afterwards, so the next call starts with a fresh one.
///
/// # Example
///
/// ```
/// use cmdtree::{run, Buffer, Command};
///
/// let root: Command = Command::new("tool")
///     .subcommand(Command::new("ok").run(|_| Ok(())));
///
/// let buf = Buffer::new();
/// let mut env = root.new_env(()).with_log(buf.sink());
/// assert!(run(&mut env, ["ok"]).is_ok());
/// assert!(run(&mut env, ["nope"]).unwrap_err().is_help());
/// assert_eq!(buf.contents(), "Error: tool command \"nope\" not understood\n");
/// ```
pub fn run<C, I, S>(env: &mut Env<'_, C>, args: I) -> CliResult
where
    C: Clone,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    env.args = args.into_iter().map(Into::into).collect();
    let owned_on_entry = env.owned_context().is_some();
    let origin = RefCell::new(env.snapshot());

    let result = match recover::catch(|| step(env, &origin)) {
        Ok(result) => result,
        Err(caught) => {
            let at = origin.into_inner();
            tracing::debug!(command = %at.path().join(" "), "captured panic");
            Err(CliError::Panic(Box::new(PanicError::new(
                at,
                caught.stack,
                caught.value,
            ))))
        }
    };

    if let Some(ctx) = env.owned_context() {
        ctx.cancel(Cause::from_result(&result));
    }
    if !owned_on_entry {
        env.context.take();
    }
    result
}

fn step<C: Clone>(env: &mut Env<'_, C>, origin: &RefCell<EnvSnapshot>) -> CliResult {
    let cmd = env.command;
    *origin.borrow_mut() = env.snapshot();

    let flags = cmd.materialize(env);
    if !cmd.has_custom_flags() {
        let tokens = if env.merge_flags {
            let split = split_flags(&flags.borrow(), &env.args);
            match split {
                Ok(split) => split.join(),
                Err(e) => return Err(UsageError::from_flags(env, e).into()),
            }
        } else {
            env.args.clone()
        };

        let parsed = {
            let mut fs = flags.borrow_mut();
            fs.parse(&tokens).map(|()| fs.args().to_vec())
        };
        match parsed {
            Ok(rest) => env.args = rest,
            Err(FlagError::Help) => {
                tracing::debug!(command = %cmd.name(), "help flag given");
                return help::print_long(env, Vec::new());
            }
            Err(e) => return Err(UsageError::from_flags(env, e).into()),
        }
        *origin.borrow_mut() = env.snapshot();
    }

    if let Some(init) = &cmd.init {
        tracing::debug!(command = %cmd.name(), "running init hook");
        init(env).map_err(|e| CliError::Init {
            command: cmd.name().to_string(),
            source: Box::new(e),
        })?;
    }

    if let Some((first, rest)) = env.args.split_first() {
        if let Some(sub) = cmd.find_subcommand(first) {
            let descends = sub.has_runnable_subcommands();
            if sub.is_runnable() || (descends && !rest.is_empty()) {
                tracing::trace!(from = %cmd.name(), to = %sub.name(), "descending");
                let mut child = env.child(sub, rest.to_vec());
                return step(&mut child, origin);
            }
            if descends {
                tracing::trace!(topic = %sub.name(), "showing topic help");
                let child = env.child(sub, Vec::new());
                *origin.borrow_mut() = child.snapshot();
                sub.materialize(&child);
                return help::print_long(&child, Vec::new());
            }
        }
        if cmd.run.is_none() {
            tracing::debug!(command = %cmd.name(), token = %first, "command not understood");
            writeln!(env.log(), "Error: {} command {:?} not understood", cmd.name(), first)?;
            return Err(CliError::HelpRequested);
        }
    }

    match &cmd.run {
        Some(action) => {
            tracing::debug!(command = %cmd.name(), args = ?env.args, "running action");
            action(env)
        }
        None => help::print_short(env),
    }
}

/// Write a diagnostic for `err` to the sink of `env` and return the exit
/// status it calls for.
///
/// Help requests print nothing more. Usage errors print the message and the
/// usage summary of the command at fault. Panics print the captured stack.
pub fn report<C>(env: &Env<'_, C>, err: &CliError) -> i32 {
    let mut log = env.log();
    let written = match err {
        CliError::HelpRequested => Ok(()),
        CliError::Usage(usage) => {
            tracing::warn!(command = %usage.env().name(), "{}", usage.message());
            writeln!(log, "Error: {}", usage.message()).and_then(|()| {
                if usage.usage().is_empty() {
                    Ok(())
                } else {
                    write!(log, "{}\n\n", usage.usage())
                }
            })
        }
        CliError::Panic(panic) => {
            tracing::error!(command = %panic.env().path().join(" "), "{}", panic);
            writeln!(log, "Error: {panic}\n{}", panic.stack())
        }
        other => {
            tracing::error!(error = %other, "command failed");
            writeln!(log, "Error: {other}")
        }
    };
    // The exit status stands even if the sink is gone.
    if let Err(e) = written {
        tracing::debug!(error = %e, "failed to write diagnostic");
    }
    err.exit_code()
}

/// Like [`run`], but on failure reports the error and exits the process:
/// with status 2 for help and usage errors, 1 for anything else.
pub fn run_or_fail<C, I, S>(env: &mut Env<'_, C>, args: I)
where
    C: Clone,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    if let Err(err) = run(env, args) {
        let code = report(env, &err);
        std::process::exit(code);
    }
}
