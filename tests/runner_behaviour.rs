// tests/runner_behaviour.rs

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::time::{Duration, Instant};

use taskflow::context::{Context, ContextError};
use taskflow::engine::{FanOutTask, Runner, SubTask, Task, sub_task};
use taskflow_test_utils::doubles::{CountingExecutable, FailingExecutable};
use taskflow_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_dependency_runs_once() -> TestResult {
    init_tracing();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let shared = Task::new("shared", move |_ctx, _: ()| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(10_i64)
        }
    });
    let left = Task::new("left", |_ctx, x: i64| async move { Ok(x + 1) })
        .after([shared.executable()]);
    let right = Task::new("right", |_ctx, x: i64| async move { Ok(x + 2) })
        .after([shared.executable()]);

    let mut runner = Runner::new();
    runner.add([left.executable(), right.executable()]);
    with_timeout(runner.run(&Context::background())).await?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(left.result().transpose()?, Some(11));
    assert_eq!(right.result().transpose()?, Some(12));
    Ok(())
}

#[tokio::test]
async fn empty_runner_succeeds_immediately() -> TestResult {
    init_tracing();

    let runner = Runner::new();
    assert!(runner.is_empty());

    runner.run(&Context::background()).await?;
    Ok(())
}

#[tokio::test]
async fn first_failure_is_reported_and_others_still_run() {
    init_tracing();

    let ok = CountingExecutable::with_delay("ok", 1, Duration::from_millis(10));
    let bad = FailingExecutable::new("bad", "bad entry");

    let mut runner = Runner::new();
    runner.add([ok.shared()]).add([bad.shared()]);
    assert_eq!(runner.task_names().collect::<Vec<_>>(), vec!["ok", "bad"]);

    let err = with_timeout(runner.run(&Context::background()))
        .await
        .unwrap_err();

    assert!(err.same_failure(bad.error()));
    assert_eq!(ok.calls(), 1);
}

#[tokio::test]
async fn deadline_is_returned_while_workers_hang() {
    init_tracing();

    let hung = CountingExecutable::with_delay("hung", 0, Duration::from_secs(5));
    let mut runner = Runner::new();
    runner.add([hung.shared()]);

    let ctx = Context::background().with_timeout(Duration::from_millis(30));
    let started = Instant::now();
    let err = with_timeout(runner.run(&ctx)).await.unwrap_err();

    assert_eq!(err.context_error(), Some(ContextError::DeadlineExceeded));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn cancellation_is_distinct_from_deadline() {
    init_tracing();

    let hung = CountingExecutable::with_delay("hung", 0, Duration::from_secs(5));
    let mut runner = Runner::new();
    runner.add([hung.shared()]);

    let ctx = Context::background().with_cancel();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = with_timeout(runner.run(&ctx)).await.unwrap_err();

    assert_eq!(err.context_error(), Some(ContextError::Canceled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resubmitted_task_returns_cached_outcome() -> TestResult {
    init_tracing();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let task = Task::new("once", move |_ctx, _: ()| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(3_i64) }
    });

    let mut first = Runner::new();
    first.add([task.executable()]);
    with_timeout(first.run(&Context::background())).await?;

    let mut second = Runner::new();
    second.add([task.executable(), task.executable()]);
    with_timeout(second.run(&Context::background())).await?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(task.result().transpose()?, Some(3));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn already_cancelled_context_launches_nothing() {
    init_tracing();

    let ctx = Context::background().with_cancel();
    ctx.cancel();

    for _ in 0..50 {
        let instant = CountingExecutable::new("instant", 1);
        let mut runner = Runner::new();
        runner.add([instant.shared()]);

        let err = runner.run(&ctx).await.unwrap_err();

        assert_eq!(err.context_error(), Some(ContextError::Canceled));
        assert_eq!(instant.calls(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fan_out_stage_feeds_an_ordinary_task() -> TestResult {
    init_tracing();

    let stage = FanOutTask::new(
        "parts",
        |_ctx: Context, _input: Vec<()>| async move {
            Ok((1..=4_i64)
                .map(|v| -> SubTask<(), i64> {
                    sub_task(move |_ctx: Context, _: ()| async move { Ok(v) })
                })
                .collect::<Vec<_>>())
        },
        |_ctx: Context, results: Vec<i64>| async move { Ok(results.iter().sum()) },
    )
    .to_task();
    let doubled = Task::new("doubled", |_ctx, total: i64| async move { Ok(total * 2) })
        .after([stage.executable()]);

    let mut runner = Runner::new();
    runner.add([doubled.executable(), stage.executable()]);
    with_timeout(runner.run(&Context::background())).await?;

    assert_eq!(stage.result().transpose()?, Some(10));
    assert_eq!(doubled.result().transpose()?, Some(20));
    Ok(())
}
