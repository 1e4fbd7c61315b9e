//! Lookahead classification of tokens into a single command's flag scope.
//!
//! When flags are merged, a command's own flags may appear anywhere among
//! its remaining tokens, including after the names and arguments of its
//! subcommands. [`split_flags`] pulls those flags (and their values) out
//! without parsing them, leaving everything else in order for the next
//! scope down.

use crate::flags::{FlagError, FlagSet};

/// Token that ends flag recognition for the rest of a scope.
pub const TERMINATOR: &str = "--";

/// Tokens partitioned by [`split_flags`]. Relative order is preserved
/// within each half.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    /// Flags declared by the scope, with their value tokens.
    pub flags: Vec<String>,
    /// Everything else.
    pub free: Vec<String>,
}

impl Split {
    /// Recombine into one sequence for standard flag parsing.
    ///
    /// A terminator separates the halves when both are non-empty, so no free
    /// token can be read as a flag of this scope. If the free tokens already
    /// begin with a terminator, that one serves.
    pub fn join(self) -> Vec<String> {
        let Split { mut flags, free } = self;
        let guarded = free.first().is_some_and(|t| t == TERMINATOR);
        if !flags.is_empty() && !free.is_empty() && !guarded {
            flags.push(TERMINATOR.to_string());
        }
        flags.extend(free);
        flags
    }
}

/// Partition `args` into the flags declared by `fs` and free tokens.
///
/// Flag-shaped tokens naming a flag `fs` does not declare are free: they may
/// belong to a descendant scope. A declared non-boolean flag without an
/// inline `=value` claims the following token as its value; if there is none,
/// the result is [`FlagError::MissingValue`].
pub fn split_flags(fs: &FlagSet, args: &[String]) -> Result<Split, FlagError> {
    let mut split = Split::default();
    let mut tokens = args.iter();

    while let Some(token) = tokens.next() {
        if token == TERMINATOR {
            split.free.push(token.clone());
            split.free.extend(tokens.by_ref().cloned());
            break;
        }

        let Some(body) = flag_body(token) else {
            split.free.push(token.clone());
            continue;
        };
        let (name, has_value) = match body.split_once('=') {
            Some((name, _)) => (name, true),
            None => (body, false),
        };

        match fs.lookup(name) {
            Some(def) => {
                split.flags.push(token.clone());
                if !has_value && !def.is_bool() {
                    let value = tokens
                        .next()
                        .ok_or_else(|| FlagError::MissingValue(token.clone()))?;
                    split.flags.push(value.clone());
                }
            }
            None => split.free.push(token.clone()),
        }
    }
    Ok(split)
}

/// The text after the leading dash(es) of a flag-shaped token. A bare `-`
/// is not flag-shaped.
fn flag_body(token: &str) -> Option<&str> {
    let rest = token.strip_prefix('-')?;
    let body = rest.strip_prefix('-').unwrap_or(rest);
    (!body.is_empty()).then_some(body)
}
