//! Help text for command trees.
//!
//! [`Command::info`] collects what is known about a command into a
//! [`CommandInfo`], which can be rendered as a usage summary, a short
//! synopsis, or a long description, or serialized as data.

use std::io::{self, Write};

use serde::Serialize;

use crate::command::Command;
use crate::env::Env;
use crate::flags::{FlagDef, PRIVATE_PREFIX};
use crate::{CliError, CliResult};

const NO_DESCRIPTION: &str = "(no description available)";

/// Selects what [`Command::info`] includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HelpFlags {
    /// Include subcommands and help topics (one level deep).
    pub commands: bool,
    /// Include unlisted subcommands.
    pub unlisted: bool,
    /// Include flags whose usage begins with `PRIVATE:`.
    pub private_flags: bool,
}

impl HelpFlags {
    pub const COMMANDS: HelpFlags = HelpFlags {
        commands: true,
        unlisted: false,
        private_flags: false,
    };

    pub const ALL: HelpFlags = HelpFlags {
        commands: true,
        unlisted: true,
        private_flags: true,
    };
}

/// Help details for one declared flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagInfo {
    pub name: String,
    /// Name of the flag's argument; empty for boolean flags.
    pub value_name: String,
    /// Usage text, without the private marker.
    pub usage: String,
    /// The default, unless it is the zero value of the flag's type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub private: bool,
    #[serde(skip)]
    quoted_default: bool,
}

impl FlagInfo {
    fn from_def(def: &FlagDef) -> Self {
        let declared = def.usage();
        let (private, usage) = match declared.strip_prefix(PRIVATE_PREFIX) {
            Some(rest) => (true, rest.strip_prefix(' ').unwrap_or(rest)),
            None => (false, declared),
        };
        let (value_name, usage) = unquote_usage(usage, def);
        Self {
            name: def.name().to_string(),
            value_name,
            usage,
            default: (!def.has_zero_default()).then(|| def.default_value().to_string()),
            private,
            quoted_default: def.type_name() == "string",
        }
    }

    fn write_to(&self, out: &mut String) {
        let short = self.name.chars().count() == 1;
        out.push_str(if short { "  -" } else { " --" });
        out.push_str(&self.name);
        if !self.value_name.is_empty() {
            out.push(' ');
            out.push_str(&self.value_name);
        }
        out.push_str(if short && self.value_name.is_empty() {
            "\t"
        } else {
            "\n    \t"
        });
        out.push_str(&self.usage.replace('\n', "\n    \t"));
        match &self.default {
            Some(value) if self.quoted_default => out.push_str(&format!(" (default {value:?})")),
            Some(value) => out.push_str(&format!(" (default {value})")),
            None => {}
        }
        out.push('\n');
    }
}

/// Extract a back-quoted argument name from `usage`, falling back to the
/// flag's type name.
fn unquote_usage(usage: &str, def: &FlagDef) -> (String, String) {
    if let Some((head, tail)) = usage.split_once('`') {
        if let Some((name, rest)) = tail.split_once('`') {
            return (name.to_string(), format!("{head}{name}{rest}"));
        }
    }
    let name = if def.is_bool() { "" } else { def.type_name() };
    (name.to_string(), usage.to_string())
}

/// Synthesized help for a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandInfo {
    pub name: String,
    /// First line of the help text.
    pub synopsis: String,
    /// Usage lines with the command name stripped.
    pub usage: Vec<String>,
    pub help: String,
    pub flags: Vec<FlagInfo>,
    pub runnable: bool,
    pub unlisted: bool,
    /// Runnable subcommands and groups.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandInfo>,
    /// Children that are neither runnable nor have children of their own.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<CommandInfo>,
}

impl CommandInfo {
    /// The `Usage:` block, or an empty string if there are no usage lines.
    pub fn usage_block(&self) -> String {
        if self.usage.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = self
            .usage
            .iter()
            .map(|line| format!("  {} {}", self.name, line).trim_end().to_string())
            .collect();
        format!("Usage:\n\n{}", lines.join("\n"))
    }

    /// The `Flags:` block, or an empty string if no flags are shown.
    pub fn flags_block(&self) -> String {
        if self.flags.is_empty() {
            return String::new();
        }
        let mut out = String::from("Flags:\n");
        for flag in &self.flags {
            flag.write_to(&mut out);
        }
        out.trim_end().to_string()
    }

    pub fn write_usage(&self, w: &mut impl Write) -> io::Result<()> {
        let usage = self.usage_block();
        if !usage.is_empty() {
            write!(w, "{usage}\n\n")?;
        }
        Ok(())
    }

    /// Usage, synopsis and flags.
    pub fn write_synopsis(&self, w: &mut impl Write) -> io::Result<()> {
        self.write_usage(w)?;
        let synopsis = if self.synopsis.is_empty() {
            NO_DESCRIPTION
        } else {
            &self.synopsis
        };
        write!(w, "{synopsis}\n\n")?;
        self.write_flags(w)
    }

    /// Usage, full help text, flags, subcommands and help topics.
    pub fn write_long(&self, w: &mut impl Write) -> io::Result<()> {
        self.write_usage(w)?;
        let help = if self.help.is_empty() {
            NO_DESCRIPTION
        } else {
            &self.help
        };
        write!(w, "{help}\n\n")?;
        self.write_flags(w)?;
        if !self.commands.is_empty() {
            write_table(w, &format!("{} ", self.name), "Subcommands:", &self.commands)?;
        }
        if !self.topics.is_empty() {
            write_table(w, "", "Help topics:", &self.topics)?;
        }
        Ok(())
    }

    fn write_flags(&self, w: &mut impl Write) -> io::Result<()> {
        let flags = self.flags_block();
        if !flags.is_empty() {
            write!(w, "{flags}\n\n")?;
        }
        Ok(())
    }
}

fn write_table(w: &mut impl Write, base: &str, label: &str, rows: &[CommandInfo]) -> io::Result<()> {
    writeln!(w, "{label}")?;
    let names: Vec<String> = rows.iter().map(|r| format!("  {base}{}", r.name)).collect();
    let width = names
        .iter()
        .map(|n| n.chars().count() + 1)
        .max()
        .unwrap_or(0)
        .max(4);
    for (name, row) in names.iter().zip(rows) {
        let synopsis = if row.synopsis.is_empty() {
            NO_DESCRIPTION
        } else {
            &row.synopsis
        };
        writeln!(w, "{name:<width$}: {synopsis}")?;
    }
    writeln!(w)
}

impl<C> Command<C> {
    /// Help details for this command.
    ///
    /// Flags are listed only once they have been declared, i.e. after
    /// dispatch (or the help command) has reached this command.
    pub fn info(&self, opts: HelpFlags) -> CommandInfo {
        let help = self.help_text().trim();
        let flags = self.visible_flags(opts.private_flags);

        let mut info = CommandInfo {
            name: self.name().to_string(),
            synopsis: help.lines().next().unwrap_or("").to_string(),
            usage: self.usage_lines(!flags.is_empty()),
            help: help.to_string(),
            flags,
            runnable: self.is_runnable(),
            unlisted: self.is_unlisted(),
            commands: Vec::new(),
            topics: Vec::new(),
        };

        if opts.commands {
            let nested = HelpFlags {
                commands: false,
                ..opts
            };
            for child in self.children() {
                if child.is_unlisted() && !opts.unlisted {
                    continue;
                }
                let sub = child.info(nested);
                if child.is_runnable() || !child.children().is_empty() {
                    info.commands.push(sub);
                } else {
                    info.topics.push(sub);
                }
            }
        }
        info
    }

    fn visible_flags(&self, private: bool) -> Vec<FlagInfo> {
        if self.has_custom_flags() {
            return Vec::new();
        }
        self.flags()
            .map(|fs| {
                fs.iter()
                    .filter(|def| private || !def.is_private())
                    .map(FlagInfo::from_def)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }

    fn usage_lines(&self, has_flags: bool) -> Vec<String> {
        let prefix = format!("{} ", self.name());
        let lines: Vec<String> = self
            .usage_text()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                if line == self.name() {
                    String::new()
                } else {
                    line.strip_prefix(&prefix).unwrap_or(line).to_string()
                }
            })
            .collect();
        if lines.is_empty() && has_flags {
            return vec!["[flags]".to_string()];
        }
        lines
    }
}

// ============================================================================
// Help output during dispatch
// ============================================================================

/// Write long help for the command of `env`, with `extra` appended to its
/// help topics.
pub(crate) fn print_long<C>(env: &Env<'_, C>, extra: Vec<CommandInfo>) -> CliResult {
    let mut info = env.command().info(HelpFlags::COMMANDS);
    info.topics.extend(extra);
    info.write_long(&mut env.log())?;
    Err(CliError::HelpRequested)
}

/// Write the synopsis for the command of `env`.
pub(crate) fn print_short<C>(env: &Env<'_, C>) -> CliResult {
    env.command()
        .info(HelpFlags::default())
        .write_synopsis(&mut env.log())?;
    Err(CliError::HelpRequested)
}

/// An action that writes the command's usage summary and requests help.
pub fn fail_with_usage<C>(env: &Env<'_, C>) -> CliResult {
    env.command()
        .info(HelpFlags::default())
        .write_usage(&mut env.log())?;
    Err(CliError::HelpRequested)
}

/// A named piece of help text, listed under `Help topics:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpTopic {
    pub name: String,
    pub help: String,
}

impl HelpTopic {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
        }
    }

    fn command<C>(self) -> Command<C> {
        Command::new(self.name).help(self.help)
    }
}

/// A `help` command that describes its parent, the parent's subcommands,
/// and the given topics.
///
/// `help` alone prints long help for the parent. `help a b` prints help for
/// the subcommand `a b` of the parent, or failing that for the topic `a b`
/// of the help command. Unlisted commands are not found this way.
pub fn help_command<C: Clone + 'static>(topics: impl IntoIterator<Item = HelpTopic>) -> Command<C> {
    Command::new("help")
        .usage("[topic/command]")
        .help("Print help for the specified command or topic.")
        .custom_flags(true)
        .subcommands(topics.into_iter().map(HelpTopic::command))
        .run(run_help)
}

/// Action of [`help_command`].
pub fn run_help<C: Clone>(env: &Env<'_, C>) -> CliResult {
    let Some(parent) = env.parent() else {
        return print_long(env, Vec::new());
    };
    if env.args().is_empty() {
        let own = env.command().info(HelpFlags::COMMANDS).topics;
        return print_long(parent, own);
    }

    if let Some(result) = with_target(parent, env.args(), |target| print_long(target, Vec::new())) {
        return result;
    }
    if let Some(result) = with_target(env, env.args(), |target| print_long(target, Vec::new())) {
        return result;
    }

    tracing::debug!(topic = %env.args().join(" "), "unknown help topic");
    writeln!(env.log(), "Unknown help topic {:?}", env.args().join(" "))?;
    Err(CliError::HelpRequested)
}

/// Follow `names` down from `env` through listed subcommands, declaring
/// flags along the way, and apply `f` to the environment reached.
fn with_target<C, R, F>(env: &Env<'_, C>, names: &[String], f: F) -> Option<R>
where
    C: Clone,
    F: FnOnce(&Env<'_, C>) -> R,
{
    let Some((name, rest)) = names.split_first() else {
        return Some(f(env));
    };
    let next = env
        .command()
        .find_subcommand(name)
        .filter(|c| !c.is_unlisted())?;
    let child = env.child(next, Vec::new());
    next.materialize(&child);
    with_target(&child, rest, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Buffer;

    fn tree() -> Command {
        Command::new("tool")
            .usage("tool [flags] file\ntool\n  other thing  ")
            .help("\nTool does things.\n\nAt length.\n")
            .set_flags(|_, fs| {
                fs.bool("v", false, "Verbose output");
                fs.string("name", "x", "The `who` to greet");
                fs.int("n", 0, "Count");
                fs.bool("debug", false, "PRIVATE: Dump internals");
            })
            .subcommand(
                Command::new("run")
                    .help("Run it.")
                    .set_flags(|_, fs| {
                        fs.bool("fast", false, "Go fast");
                    })
                    .run(|_| Ok(())),
            )
            .subcommand(Command::new("group").subcommand(Command::new("leaf").run(|_| Ok(()))))
            .subcommand(Command::new("notes").help("About notes."))
            .subcommand(Command::new("hidden").unlisted(true).run(|_| Ok(())))
            .subcommand(help_command(vec![HelpTopic::new("env", "Environment variables.")]))
    }

    #[test]
    fn test_usage_lines_are_normalized() {
        let root = tree();
        let info = root.info(HelpFlags::default());
        assert_eq!(info.usage, ["[flags] file", "", "other thing"]);
        assert_eq!(
            info.usage_block(),
            "Usage:\n\n  tool [flags] file\n  tool\n  tool other thing"
        );
    }

    #[test]
    fn test_flags_placeholder_needs_visible_flags() {
        let bare: Command = Command::new("bare");
        assert!(bare.info(HelpFlags::default()).usage.is_empty());
        assert_eq!(bare.info(HelpFlags::default()).usage_block(), "");

        let with_flags: Command = Command::new("f").set_flags(|_, fs| {
            fs.bool("q", false, "quiet");
        });
        with_flags.materialize(&with_flags.new_env(()));
        assert_eq!(with_flags.info(HelpFlags::default()).usage, ["[flags]"]);

        let private_only: Command = Command::new("p").set_flags(|_, fs| {
            fs.bool("q", false, "PRIVATE:quiet");
        });
        private_only.materialize(&private_only.new_env(()));
        assert!(private_only.info(HelpFlags::default()).usage.is_empty());
        assert_eq!(
            private_only.info(HelpFlags::ALL).usage,
            ["[flags]"]
        );
    }

    #[test]
    fn test_flag_block_formatting() {
        let root = tree();
        root.materialize(&root.new_env(()));
        let info = root.info(HelpFlags::default());
        assert_eq!(
            info.flags_block(),
            "Flags:\n  -n int\n    \tCount\n --name who\n    \tThe who to greet (default \"x\")\n  -v\tVerbose output"
        );

        let all = root.info(HelpFlags::ALL);
        let debug = all.flags.iter().find(|f| f.name == "debug").unwrap();
        assert!(debug.private);
        assert_eq!(debug.usage, "Dump internals");
        assert_eq!(debug.default, None);
    }

    #[test]
    fn test_children_split_into_commands_and_topics() {
        let root = tree();
        let info = root.info(HelpFlags::COMMANDS);
        let commands: Vec<&str> = info.commands.iter().map(|c| c.name.as_str()).collect();
        let topics: Vec<&str> = info.topics.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(commands, ["run", "group", "help"]);
        assert_eq!(topics, ["notes"]);

        let all = root.info(HelpFlags::ALL);
        assert!(all.commands.iter().any(|c| c.name == "hidden"));
        assert!(all.commands.iter().all(|c| c.commands.is_empty()));
    }

    #[test]
    fn test_write_long() {
        let root = tree();
        let mut out = Vec::new();
        root.info(HelpFlags::COMMANDS).write_long(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Usage:\n\n  tool [flags] file\n"));
        assert!(text.contains("Tool does things.\n\nAt length.\n\n"));
        assert!(text.contains(
            "Subcommands:\n  tool run   : Run it.\n  tool group : (no description available)\n  tool help  : Print help for the specified command or topic.\n\n"
        ));
        assert!(text.ends_with("Help topics:\n  notes : About notes.\n\n"));
        assert!(!text.contains("hidden"));
    }

    #[test]
    fn test_write_synopsis() {
        let cmd: Command = Command::new("solo");
        let mut out = Vec::new();
        cmd.info(HelpFlags::default()).write_synopsis(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "(no description available)\n\n");
    }

    #[test]
    fn test_info_serializes() {
        let root = tree();
        let value = serde_json::to_value(root.info(HelpFlags::COMMANDS)).unwrap();
        assert_eq!(value["name"], "tool");
        assert_eq!(value["synopsis"], "Tool does things.");
        assert_eq!(value["topics"][0]["name"], "notes");
    }

    fn help_env<'a>(root_env: &'a Env<'a>, args: &[&str]) -> Env<'a> {
        let help = root_env.command().find_subcommand("help").unwrap();
        root_env.child(help, args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_help_for_parent_includes_own_topics() {
        let root = tree();
        let buf = Buffer::new();
        let env = root.new_env(()).with_log(buf.sink());
        let help = help_env(&env, &[]);

        assert!(run_help(&help).unwrap_err().is_help());
        let text = buf.contents();
        assert!(text.contains("Tool does things."));
        assert!(text.contains("Help topics:\n  notes : About notes.\n  env   : Environment variables.\n"));
    }

    #[test]
    fn test_help_for_nested_command_declares_flags() {
        let root = tree();
        let buf = Buffer::new();
        let env = root.new_env(()).with_log(buf.sink());
        let help = help_env(&env, &["run"]);

        assert!(run_help(&help).unwrap_err().is_help());
        assert!(buf.contents().contains("Flags:\n --fast\n    \tGo fast"));
        assert!(root.find_subcommand("run").unwrap().is_materialized());
    }

    #[test]
    fn test_help_for_own_topic() {
        let root = tree();
        let buf = Buffer::new();
        let env = root.new_env(()).with_log(buf.sink());
        let help = help_env(&env, &["env"]);

        assert!(run_help(&help).unwrap_err().is_help());
        assert!(buf.contents().starts_with("Environment variables.\n"));
    }

    #[test]
    fn test_help_does_not_find_unlisted_or_missing() {
        let root = tree();
        let buf = Buffer::new();
        let env = root.new_env(()).with_log(buf.sink());

        assert!(run_help(&help_env(&env, &["hidden"])).unwrap_err().is_help());
        assert_eq!(buf.contents(), "Unknown help topic \"hidden\"\n");

        buf.clear();
        assert!(run_help(&help_env(&env, &["group", "nope"])).unwrap_err().is_help());
        assert_eq!(buf.contents(), "Unknown help topic \"group nope\"\n");
    }

    #[test]
    fn test_fail_with_usage() {
        let cmd: Command = Command::new("x").usage("x arg");
        let buf = Buffer::new();
        let env = cmd.new_env(()).with_log(buf.sink());
        assert!(fail_with_usage(&env).unwrap_err().is_help());
        assert_eq!(buf.contents(), "Usage:\n\n  x arg\n\n");
    }
}
