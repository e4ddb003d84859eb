// tests/task_memoization.rs

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use tokio::time::Duration;

use taskflow::context::{Context, ContextError};
use taskflow::engine::{Task, Value};
use taskflow::errors::TaskError;
use taskflow_test_utils::doubles::{CountingExecutable, FailingExecutable, RecordingLogger};
use taskflow_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// A task whose work function bumps `calls`, sleeps a little and returns 7.
fn slow_counted_task(calls: &Arc<AtomicUsize>) -> Task<(), i64> {
    let calls = Arc::clone(calls);
    Task::new("slow", move |_ctx, _: ()| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(7_i64)
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_execute_work_function_once() -> TestResult {
    init_tracing();

    let calls = Arc::new(AtomicUsize::new(0));
    let task = slow_counted_task(&calls);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let task = task.clone();
            tokio::spawn(async move { task.run(&Context::background(), None).await })
        })
        .collect();

    for joined in with_timeout(join_all(handles)).await {
        assert_eq!(joined??, 7);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A later call still sees the cached value without re-running.
    assert_eq!(task.run(&Context::background(), None).await?, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn first_claimer_input_wins_for_every_caller() -> TestResult {
    init_tracing();

    let echo = Task::new("echo", |_ctx, x: i64| async move { Ok(x) });

    let first = echo
        .run(&Context::background(), Some(Value::new(1_i64)))
        .await?;
    let second = echo
        .run(&Context::background(), Some(Value::new(2_i64)))
        .await?;

    assert_eq!(first, 1);
    assert_eq!(second, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_different_inputs_share_one_outcome() -> TestResult {
    init_tracing();

    let echo = Task::new("echo", |_ctx, x: i64| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(x)
    });

    let handles: Vec<_> = (1..=8_i64)
        .map(|x| {
            let echo = echo.clone();
            tokio::spawn(async move {
                echo.run(&Context::background(), Some(Value::new(x))).await
            })
        })
        .collect();

    let mut outputs = Vec::new();
    for joined in with_timeout(join_all(handles)).await {
        outputs.push(joined??);
    }
    assert!(outputs.windows(2).all(|w| w[0] == w[1]), "outputs: {outputs:?}");
    Ok(())
}

#[tokio::test]
async fn failing_dependency_stops_the_chain() {
    init_tracing();

    let d1 = CountingExecutable::new("d1", 1);
    let d2 = FailingExecutable::new("d2", "d2 exploded");
    let d3 = CountingExecutable::new("d3", 3);
    let logger = RecordingLogger::new();

    let work_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&work_calls);
    let task = Task::new("t", move |_ctx, x: i64| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(x) }
    })
    .with_logger(logger.clone())
    .after([d1.shared(), d2.shared(), d3.shared()]);

    let err = task.run(&Context::background(), None).await.unwrap_err();

    assert!(err.same_failure(d2.error()));
    assert_eq!(err.to_string(), "d2 exploded");
    assert_eq!(d1.calls(), 1);
    assert_eq!(d2.calls(), 1);
    assert_eq!(d3.calls(), 0);
    assert_eq!(work_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        logger.messages(),
        vec!["task t dependency d2 failed: d2 exploded".to_string()]
    );

    // The cached failure is handed out again, not recomputed.
    let again = task.run(&Context::background(), None).await.unwrap_err();
    assert!(again.same_failure(d2.error()));
    assert_eq!(d2.calls(), 1);
}

#[tokio::test]
async fn dependency_outputs_thread_through_in_order() -> TestResult {
    init_tracing();

    let base = Task::new("base", |_ctx, _: ()| async { Ok(5_i64) });
    let plus_one = Task::new("plus_one", |_ctx, x: i64| async move { Ok(x + 1) });
    let times_ten = Task::new("times_ten", |_ctx, x: i64| async move { Ok(x * 10) })
        .after([base.executable(), plus_one.executable()]);

    assert_eq!(times_ten.run(&Context::background(), None).await?, 60);
    assert_eq!(plus_one.result().transpose()?, Some(6));
    Ok(())
}

#[tokio::test]
async fn wrong_input_type_is_a_type_mismatch() {
    init_tracing();

    let producer = Task::new("producer", |_ctx, _: ()| async {
        Ok("not a number".to_string())
    });
    let logger = RecordingLogger::new();
    let consumer = Task::new("consumer", |_ctx, x: i64| async move { Ok(x) })
        .with_logger(logger.clone())
        .after([producer.executable()]);

    let err = consumer.run(&Context::background(), None).await.unwrap_err();

    assert!(err.is_type_mismatch(), "unexpected error: {err}");
    match &err {
        TaskError::TypeMismatch { task, expected, .. } => {
            assert_eq!(task, "consumer");
            assert_eq!(*expected, "i64");
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
    let messages = logger.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("input type mismatch"));
}

#[tokio::test]
async fn context_errors_keep_their_class_through_user_functions() {
    init_tracing();

    let ctx = Context::background().with_cancel();
    ctx.cancel();

    let task = Task::new("observer", |ctx: Context, _: ()| async move {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        Ok(())
    });

    let err = task.run(&ctx, None).await.unwrap_err();

    assert_eq!(err.context_error(), Some(ContextError::Canceled));
}

#[tokio::test]
async fn wrong_direct_input_leaves_work_function_uninvoked() {
    init_tracing();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let task = Task::new("typed", move |_ctx, x: i64| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(x) }
    });

    let err = task
        .run(&Context::background(), Some(Value::new("seven")))
        .await
        .unwrap_err();

    assert!(err.is_type_mismatch());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_waiter_still_receives_the_single_outcome() -> TestResult {
    init_tracing();

    let calls = Arc::new(AtomicUsize::new(0));
    let task = slow_counted_task(&calls);

    let claimer = {
        let task = task.clone();
        tokio::spawn(async move { task.run(&Context::background(), None).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let ctx = Context::background().with_cancel();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let waited = with_timeout(task.run(&ctx, None)).await?;

    assert!(ctx.is_done());
    assert_eq!(waited, 7);
    assert_eq!(claimer.await??, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}
