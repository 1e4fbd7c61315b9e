use cmdtree::{
    adapt, help_command, init_subscriber, run_or_fail, version_command, CliResult, Command, Env, Flag,
    HelpTopic,
};

// ============================================
// Options
// ============================================

/// Flag bindings shared by every command through the environment.
#[derive(Clone, Default)]
struct Options {
    no_newline: Flag<bool>,
    label: Flag<String>,
    private: Flag<i64>,
    confirm: Flag<bool>,
}

// ============================================
// Commands
// ============================================

fn root() -> Command<Options> {
    Command::new("example")
        .usage("command args...")
        .help(
            "Do interesting things with arguments.\n\
             \n\
             This program demonstrates command dispatch with scoped flags.\n\
             This help text is printed by the \"help\" subcommand.",
        )
        .set_flags(|env, fs| {
            let opt = env.config();
            fs.var(&opt.label, "label", String::new(), "Label text");
            fs.var(&opt.private, "p", 0, "PRIVATE: Unadvertised flag");
            fs.var(&opt.confirm, "y", false, "Confirm activity");
        })
        .subcommands([
            help_command([
                HelpTopic::new(
                    "special",
                    "This is some useful information a user might care about.",
                ),
                HelpTopic::new(
                    "magic",
                    "The user can write \"example help <topic>\" to get this text.",
                ),
            ]),
            echo(),
            secret(),
            version_command(),
        ])
}

fn echo() -> Command<Options> {
    Command::new("echo")
        .usage("text ...")
        .help("Concatenate the arguments with spaces and print to stdout.")
        .set_flags(|env, fs| {
            fs.var(&env.config().no_newline, "n", false, "Do not print a trailing newline");
        })
        .run(handlers::echo)
}

fn secret() -> Command<Options> {
    Command::new("secret")
        .usage("args ...")
        .help("A command that is hidden from help listings.")
        .unlisted(true)
        .run(adapt::rest(|_env: &Env<'_, Options>, [first]: [&str; 1], rest: &[String]| {
            println!("easter-egg {first} {}", rest.join(", "));
            Ok(())
        }))
}

mod handlers {
    use super::*;

    pub fn echo(env: &Env<'_, Options>) -> CliResult {
        let opt = env.config();
        tracing::debug!(args = ?env.args(), "echo");

        let label = opt.label.get();
        if !label.is_empty() {
            print!("[{label}] ");
        }
        if opt.private.get() > 0 {
            print!("<{}> ", opt.private.get());
        }
        print!("{}", env.args().join(" "));
        if !opt.no_newline.get() {
            println!();
        }
        Ok(())
    }
}

fn main() {
    // Controlled by RUST_LOG and CMDTREE_LOG_FORMAT
    if let Err(e) = init_subscriber() {
        eprintln!("{e}");
    }

    let root = root();
    let mut env = root.new_env(Options::default()).with_merge_flags(true);
    run_or_fail(&mut env, std::env::args().skip(1));
}
