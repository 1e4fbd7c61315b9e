//! Typed constructors for command actions.
//!
//! Each adapter checks the number of arguments left for the command before
//! calling the wrapped function, and reports a mismatch as a usage error.
//!
//! ```
//! use cmdtree::{adapt, run, Buffer, Command, Env};
//!
//! let root: Command = Command::new("kv").subcommand(
//!     Command::new("set")
//!         .usage("key value")
//!         .run(adapt::fixed(|_env: &Env, [key, value]: [&str; 2]| {
//!             println!("{key} = {value}");
//!             Ok(())
//!         })),
//! );
//!
//! let mut env = root.new_env(()).with_log(Buffer::new().sink());
//! let err = run(&mut env, ["set", "only-key"]).unwrap_err();
//! assert_eq!(err.to_string(), "wrong number of arguments: got 1, want 2");
//! ```

use crate::env::Env;
use crate::CliResult;

/// An action taking no arguments.
pub fn nullary<C, F>(f: F) -> impl Fn(&Env<'_, C>) -> CliResult + Send + 'static
where
    C: 'static,
    F: Fn(&Env<'_, C>) -> CliResult + Send + 'static,
{
    move |env: &Env<'_, C>| {
        if !env.args().is_empty() {
            return Err(env.usage_error(format!(
                "extra arguments after command: {:?}",
                env.args()
            )));
        }
        f(env)
    }
}

/// An action taking exactly `N` arguments.
pub fn fixed<const N: usize, C, F>(f: F) -> impl Fn(&Env<'_, C>) -> CliResult + Send + 'static
where
    C: 'static,
    F: Fn(&Env<'_, C>, [&str; N]) -> CliResult + Send + 'static,
{
    move |env: &Env<'_, C>| {
        let args = env.args();
        if args.len() != N {
            return Err(env.usage_error(format!(
                "wrong number of arguments: got {}, want {}",
                args.len(),
                N
            )));
        }
        f(env, std::array::from_fn(|i| args[i].as_str()))
    }
}

/// An action taking at least `N` arguments, followed by the rest.
pub fn rest<const N: usize, C, F>(f: F) -> impl Fn(&Env<'_, C>) -> CliResult + Send + 'static
where
    C: 'static,
    F: Fn(&Env<'_, C>, [&str; N], &[String]) -> CliResult + Send + 'static,
{
    move |env: &Env<'_, C>| {
        let args = env.args();
        if args.len() < N {
            return Err(env.usage_error(format!(
                "wrong number of arguments: got {}, want at least {}",
                args.len(),
                N
            )));
        }
        let (head, tail) = args.split_at(N);
        f(env, std::array::from_fn(|i| head[i].as_str()), tail)
    }
}
