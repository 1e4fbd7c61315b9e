//! Flag declarations and parsing for a single command scope.
//!
//! A [`FlagSet`] holds the flags one command declares. Parsing follows the
//! conventional single-scope grammar:
//!
//! - `-name`, `--name` (boolean flags, or flags given a value below)
//! - `-name=value`, `--name=value`
//! - `-name value` (non-boolean flags only)
//!
//! Parsing stops at the first non-flag token or at a lone `-`. A `--`
//! terminator is consumed and also stops parsing. Whatever remains is
//! available from [`FlagSet::args`].
//!
//! Values are bound through [`Flag<T>`] handles, which are cheap to clone
//! and can be shared between a flag-declaration hook and a command action.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Usage prefix marking a flag as private: parseable, but hidden from help.
pub const PRIVATE_PREFIX: &str = "PRIVATE:";

/// Errors reported while classifying or parsing flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    /// `-h` or `-help` was given and not declared by the scope.
    #[error("help requested")]
    Help,

    /// A flag-shaped token named a flag the scope does not declare.
    #[error("flag provided but not defined: -{0}")]
    Undefined(String),

    /// A non-boolean flag was the last token and had no value.
    #[error("flag needs an argument: -{0}")]
    NeedsArgument(String),

    /// A token such as `---x` or `-=v`.
    #[error("bad flag syntax: {0}")]
    BadSyntax(String),

    /// The flag value was rejected by the flag's type.
    #[error("invalid value {value:?} for flag -{name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    /// Lookahead classification found a flag with no value token after it.
    #[error("missing value for flag {0:?}")]
    MissingValue(String),
}

// ============================================================================
// Value types
// ============================================================================

/// A type that can be stored in a [`Flag<T>`].
pub trait FlagType: Clone + Default + Send + 'static {
    /// Name shown in help output for the flag's argument.
    const TYPE_NAME: &'static str;

    /// Boolean flags do not consume a following value token.
    const IS_BOOL: bool = false;

    fn parse_flag(raw: &str) -> Result<Self, String>;

    fn format_flag(&self) -> String;
}

impl FlagType for bool {
    const TYPE_NAME: &'static str = "bool";
    const IS_BOOL: bool = true;

    fn parse_flag(raw: &str) -> Result<Self, String> {
        match raw {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err("parse error".to_string()),
        }
    }

    fn format_flag(&self) -> String {
        self.to_string()
    }
}

impl FlagType for String {
    const TYPE_NAME: &'static str = "string";

    fn parse_flag(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }

    fn format_flag(&self) -> String {
        self.clone()
    }
}

macro_rules! numeric_flag_type {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FlagType for $ty {
                const TYPE_NAME: &'static str = $name;

                fn parse_flag(raw: &str) -> Result<Self, String> {
                    raw.parse::<$ty>().map_err(|e| e.to_string())
                }

                fn format_flag(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

numeric_flag_type!(
    i32 => "int",
    i64 => "int",
    u32 => "uint",
    u64 => "uint",
    usize => "uint",
    f64 => "float",
);

/// A shared, typed flag binding.
///
/// Cloning a `Flag` yields another handle to the same storage, so a handle
/// captured by a flag-declaration hook observes the value parsed for it.
///
/// # Example
///
/// ```
/// use cmdtree::{Flag, FlagSet};
///
/// let verbose = Flag::new(false);
/// let mut fs = FlagSet::new();
/// fs.var(&verbose, "v", false, "Verbose output");
/// fs.parse(&["-v".to_string(), "rest".to_string()]).unwrap();
///
/// assert!(verbose.get());
/// assert_eq!(fs.args(), ["rest"]);
/// ```
#[derive(Debug)]
pub struct Flag<T>(Arc<Mutex<T>>);

impl<T> Clone for Flag<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: FlagType> Default for Flag<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: FlagType> Flag<T> {
    pub fn new(initial: T) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    /// Current value of the flag.
    pub fn get(&self) -> T {
        self.lock().clone()
    }

    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The dynamic interface a [`FlagSet`] uses to store flag values.
///
/// [`Flag<T>`] implements this for every [`FlagType`]; implement it directly
/// for values that need custom parsing (lists, enums, and so on).
pub trait Value: Send {
    fn set(&mut self, raw: &str) -> Result<(), String>;

    /// Textual form of the current value.
    fn current(&self) -> String;

    fn is_bool(&self) -> bool {
        false
    }

    fn type_name(&self) -> &'static str {
        "value"
    }

    /// Whether `text` is the zero value for this type. Zero defaults are
    /// omitted from help output.
    fn is_zero(&self, text: &str) -> bool {
        text.is_empty()
    }
}

impl<T: FlagType> Value for Flag<T> {
    fn set(&mut self, raw: &str) -> Result<(), String> {
        let parsed = T::parse_flag(raw)?;
        Flag::set(self, parsed);
        Ok(())
    }

    fn current(&self) -> String {
        self.lock().format_flag()
    }

    fn is_bool(&self) -> bool {
        T::IS_BOOL
    }

    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn is_zero(&self, text: &str) -> bool {
        T::default().format_flag() == text
    }
}

// ============================================================================
// Flag sets
// ============================================================================

/// One declared flag.
pub struct FlagDef {
    name: String,
    usage: String,
    default: String,
    value: Box<dyn Value>,
}

impl FlagDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Usage text as declared, including any [`PRIVATE_PREFIX`].
    pub fn usage(&self) -> &str {
        &self.usage
    }

    /// The value the flag held when it was declared.
    pub fn default_value(&self) -> &str {
        &self.default
    }

    pub fn current(&self) -> String {
        self.value.current()
    }

    pub fn is_bool(&self) -> bool {
        self.value.is_bool()
    }

    pub fn is_private(&self) -> bool {
        self.usage.starts_with(PRIVATE_PREFIX)
    }

    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }

    pub fn has_zero_default(&self) -> bool {
        self.value.is_zero(&self.default)
    }
}

impl fmt::Debug for FlagDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagDef")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("default", &self.default)
            .field("current", &self.value.current())
            .finish()
    }
}

/// The flags declared by one command, plus the result of the last parse.
#[derive(Debug, Default)]
pub struct FlagSet {
    flags: BTreeMap<String, FlagDef>,
    actual: Vec<String>,
    args: Vec<String>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a boolean flag and return its handle.
    pub fn bool(&mut self, name: &str, default: bool, usage: &str) -> Flag<bool> {
        self.typed(name, default, usage)
    }

    pub fn string(&mut self, name: &str, default: &str, usage: &str) -> Flag<String> {
        self.typed(name, default.to_string(), usage)
    }

    pub fn int(&mut self, name: &str, default: i64, usage: &str) -> Flag<i64> {
        self.typed(name, default, usage)
    }

    pub fn uint(&mut self, name: &str, default: u64, usage: &str) -> Flag<u64> {
        self.typed(name, default, usage)
    }

    pub fn float(&mut self, name: &str, default: f64, usage: &str) -> Flag<f64> {
        self.typed(name, default, usage)
    }

    /// Declare a flag bound to an existing handle, resetting it to `default`.
    pub fn var<T: FlagType>(&mut self, flag: &Flag<T>, name: &str, default: T, usage: &str) {
        flag.set(default);
        self.define(name, usage, Box::new(flag.clone()));
    }

    /// Declare a flag backed by a custom [`Value`].
    pub fn value(&mut self, name: &str, usage: &str, value: impl Value + 'static) {
        self.define(name, usage, Box::new(value));
    }

    fn typed<T: FlagType>(&mut self, name: &str, default: T, usage: &str) -> Flag<T> {
        let flag = Flag::new(default);
        self.define(name, usage, Box::new(flag.clone()));
        flag
    }

    /// # Panics
    ///
    /// Panics if `name` is already declared in this set.
    fn define(&mut self, name: &str, usage: &str, value: Box<dyn Value>) {
        if self.flags.contains_key(name) {
            panic!("flag redefined: {name}");
        }
        let def = FlagDef {
            name: name.to_string(),
            usage: usage.to_string(),
            default: value.current(),
            value,
        };
        self.flags.insert(name.to_string(), def);
    }

    pub fn lookup(&self, name: &str) -> Option<&FlagDef> {
        self.flags.get(name)
    }

    /// Declared flags in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &FlagDef> {
        self.flags.values()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Whether `name` was given by the most recent [`parse`](Self::parse).
    pub fn is_set(&self, name: &str) -> bool {
        self.actual.iter().any(|n| n == name)
    }

    /// Tokens left over after the most recent parse.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Set a declared flag from its textual form.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<(), FlagError> {
        let def = self
            .flags
            .get_mut(name)
            .ok_or_else(|| FlagError::Undefined(name.to_string()))?;
        def.value
            .set(raw)
            .map_err(|reason| FlagError::InvalidValue {
                name: name.to_string(),
                value: raw.to_string(),
                reason,
            })?;
        self.actual.push(name.to_string());
        Ok(())
    }

    /// Parse leading flag tokens from `args`.
    pub fn parse(&mut self, args: &[String]) -> Result<(), FlagError> {
        self.actual.clear();
        self.args.clear();

        let mut rest = args;
        while let Some((token, tail)) = rest.split_first() {
            if token.len() < 2 || !token.starts_with('-') {
                break;
            }
            rest = tail;
            if token == "--" {
                break;
            }

            let body = token.strip_prefix("--").unwrap_or(&token[1..]);
            if body.is_empty() || body.starts_with('-') || body.starts_with('=') {
                return Err(FlagError::BadSyntax(token.clone()));
            }
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (body, None),
            };

            let Some(def) = self.flags.get(name) else {
                if name == "help" || name == "h" {
                    return Err(FlagError::Help);
                }
                return Err(FlagError::Undefined(name.to_string()));
            };

            let raw = match inline {
                Some(value) => value.to_string(),
                None if def.is_bool() => "true".to_string(),
                None => match rest.split_first() {
                    Some((value, tail)) => {
                        rest = tail;
                        value.clone()
                    }
                    None => return Err(FlagError::NeedsArgument(name.to_string())),
                },
            };
            self.set(name, &raw)?;
        }

        self.args = rest.to_vec();
        Ok(())
    }
}
