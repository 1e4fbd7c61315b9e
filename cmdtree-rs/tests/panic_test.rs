//! Integration tests for panic containment and cancellation on exit

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cmdtree::{report, run, Buffer, Cause, CliError, Command, Context, EXIT_FAILURE};

#[test]
fn test_action_panic_is_captured() {
    let root: Command = Command::new("root")
        .subcommand(Command::new("freak-out").run(|_| panic!("boom")));
    let buf = Buffer::new();
    let mut env = root.new_env(()).with_log(buf.sink());

    let err = run(&mut env, ["freak-out", "now"]).unwrap_err();

    let panic = err.as_panic().expect("panic error");
    assert_eq!(panic.message(), Some("boom"));
    assert!(panic.with_value(|v| v.downcast_ref::<&str>() == Some(&"boom")));
    assert!(panic.env().is_command(&root.children()[0]));
    assert!(!panic.env().is_command(&root));
    assert_eq!(panic.env().path(), ["root", "freak-out"]);
    assert_eq!(panic.env().args(), ["now"]);
    assert!(panic.stack().contains("panic_test.rs"));
    assert!(err.to_string().contains("boom"));

    assert_eq!(report(&env, &err), EXIT_FAILURE);
    assert!(buf.contents().starts_with("Error: panic in \"root freak-out\": boom\n"));
}

#[test]
fn test_flag_hook_panic_is_captured() {
    let root: Command = Command::new("root").subcommand(
        Command::new("dup")
            .set_flags(|_, fs| {
                fs.bool("x", false, "first");
                fs.bool("x", false, "second");
            })
            .run(|_| Ok(())),
    );
    let mut env = root.new_env(()).with_log(Buffer::new().sink());

    let err = run(&mut env, ["dup"]).unwrap_err();

    let panic = err.as_panic().expect("panic error");
    assert_eq!(panic.message(), Some("flag redefined: x"));
    assert!(panic.env().is_command(&root.children()[0]));
    assert!(!root.children()[0].is_materialized());
}

#[test]
fn test_topic_flag_hook_panic_names_the_topic() {
    let root: Command = Command::new("root").subcommand(
        Command::new("topic")
            .set_flags(|_, _| panic!("hook"))
            .subcommand(Command::new("leaf").run(|_| Ok(()))),
    );
    let mut env = root.new_env(()).with_log(Buffer::new().sink());

    let err = run(&mut env, ["topic"]).unwrap_err();

    let panic = err.as_panic().expect("panic error");
    assert_eq!(panic.message(), Some("hook"));
    assert!(panic.env().is_command(&root.children()[0]));
    assert_eq!(panic.env().path(), ["root", "topic"]);
}

#[test]
fn test_init_panic_is_captured() {
    let root: Command = Command::new("root")
        .init(|_| panic!("{} went wrong", "init"))
        .run(|_| Ok(()));
    let mut env = root.new_env(()).with_log(Buffer::new().sink());

    let err = run(&mut env, Vec::<String>::new()).unwrap_err();

    assert_eq!(err.as_panic().and_then(|p| p.message()), Some("init went wrong"));
}

#[test]
fn test_non_string_panic_value() {
    let root: Command = Command::new("root").run(|_| std::panic::panic_any(42_i32));
    let mut env = root.new_env(()).with_log(Buffer::new().sink());

    let err = run(&mut env, Vec::<String>::new()).unwrap_err();

    let CliError::Panic(panic) = err else {
        panic!("want a panic error");
    };
    assert_eq!(panic.message(), None);
    let value = panic.into_value();
    assert_eq!(value.downcast_ref::<i32>(), Some(&42));
}

#[test]
fn test_owned_context_is_canceled_on_every_exit() {
    let root: Command = Command::new("root")
        .subcommand(Command::new("ok").run(|_| Ok(())))
        .subcommand(Command::new("fail").run(|env| Err(env.usage_error("bad input"))))
        .subcommand(Command::new("boom").run(|_| panic!("boom")));

    let ctx = Context::new();
    let mut env = root
        .new_env(())
        .with_log(Buffer::new().sink())
        .with_context(ctx.clone());
    run(&mut env, ["ok"]).expect("ok");
    assert_eq!(ctx.cause(), Some(Cause::Canceled));

    let ctx = Context::new();
    env.set_context(ctx.clone());
    let err = run(&mut env, ["fail"]).unwrap_err();
    assert_eq!(ctx.cause(), Some(Cause::Failed(err.to_string())));
    assert_eq!(err.to_string(), "bad input");

    let ctx = Context::new();
    env.set_context(ctx.clone());
    let err = run(&mut env, ["boom"]).unwrap_err();
    assert!(err.as_panic().is_some());
    assert!(matches!(ctx.cause(), Some(Cause::Failed(msg)) if msg.contains("boom")));
}

#[test]
fn test_lazily_created_context_is_cancelled() {
    let seen: Arc<Mutex<Option<Context>>> = Arc::default();
    let slot = Arc::clone(&seen);
    let root: Command = Command::new("root").subcommand(Command::new("leaf").run(move |env| {
        let ctx = env.context();
        assert!(!ctx.is_cancelled());
        *slot.lock().unwrap() = Some(ctx);
        Ok(())
    }));
    let mut env = root.new_env(()).with_log(Buffer::new().sink());

    run(&mut env, ["leaf"]).expect("dispatch");

    let ctx = seen.lock().unwrap().take().expect("context");
    assert_eq!(ctx.cause(), Some(Cause::Canceled));
    assert!(env.owned_context().is_none());
}

#[test]
fn test_cancel_reaches_nearest_owner_only() {
    let inner = Context::new();
    let handle = inner.clone();
    let root: Command = Command::new("root").subcommand(
        Command::new("mid")
            .init(move |env| {
                env.set_context(handle.clone());
                Ok(())
            })
            .subcommand(Command::new("leaf").run(|env| {
                env.cancel(Cause::Failed("stop".into()));
                Ok(())
            })),
    );
    let outer = Context::new();
    let mut env = root
        .new_env(())
        .with_log(Buffer::new().sink())
        .with_context(outer.clone());

    run(&mut env, ["mid", "leaf"]).expect("dispatch");

    assert_eq!(inner.cause(), Some(Cause::Failed("stop".into())));
    assert_eq!(outer.cause(), Some(Cause::Canceled));
}

#[tokio::test]
async fn test_spawned_work_observes_cancellation() {
    let task: Arc<Mutex<Option<tokio::task::JoinHandle<&'static str>>>> = Arc::default();
    let slot = Arc::clone(&task);
    let root: Command = Command::new("serve").run(move |env| {
        let ctx = env.context().child();
        let handle = tokio::spawn(async move {
            ctx.cancelled().await;
            "stopped"
        });
        *slot.lock().unwrap() = Some(handle);
        Ok(())
    });
    let mut env = root.new_env(()).with_log(Buffer::new().sink());

    run(&mut env, Vec::<String>::new()).expect("dispatch");

    let handle = task.lock().unwrap().take().expect("spawned");
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("canceled in time")
        .expect("task");
    assert_eq!(result, "stopped");
}
