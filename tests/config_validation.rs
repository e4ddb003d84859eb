// tests/config_validation.rs

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use taskflow::config::{load_and_validate, load_from_path, load_from_str, topological_order};
use taskflow::errors::TaskflowError;
use taskflow::types::ReduceOp;
use taskflow_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn loads_pipeline_file_from_disk() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Taskflow.toml");
    fs::write(
        &path,
        r#"
[config]
timeout_ms = 2500

[retry]
max_retries = 4
initial_backoff_ms = 15

[task.fetch]
value = 2

[task.double]
after = ["fetch"]
multiply = 2

[task.spread]
fan_out = [1, 2, 3]
reduce = "max"
"#,
    )?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.config.timeout(), Some(Duration::from_millis(2500)));
    assert_eq!(cfg.retry.max_retries, 4);
    assert_eq!(cfg.retry.initial_backoff, Duration::from_millis(15));
    assert_eq!(cfg.task["double"].after, vec!["fetch".to_string()]);
    assert_eq!(cfg.task["spread"].effective_reduce(), ReduceOp::Max);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = tempdir()?;
    let err = load_from_path(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, TaskflowError::IoError(_)), "got {err}");
    Ok(())
}

#[test]
fn malformed_toml_is_reported() {
    let err = load_from_str("[task.a\nvalue = 1").unwrap_err();
    assert!(matches!(err, TaskflowError::TomlError(_)), "got {err}");
}

#[test]
fn cycle_is_rejected() {
    let err = load_from_str(
        r#"
[task.a]
after = ["c"]

[task.b]
after = ["a"]

[task.c]
after = ["b"]
"#,
    )
    .unwrap_err();

    assert!(matches!(err, TaskflowError::DagCycle(_)), "got {err}");
}

#[test]
fn unknown_dependency_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new().after("ghost").build())
        .try_build()
        .unwrap_err();

    match err {
        TaskflowError::ConfigError(msg) => assert!(msg.contains("unknown dependency 'ghost'")),
        other => panic!("expected ConfigError, got {other}"),
    }
}

#[test]
fn self_dependency_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new().after("a").build())
        .try_build()
        .unwrap_err();

    assert!(matches!(err, TaskflowError::ConfigError(ref msg) if msg.contains("itself")));
}

#[test]
fn empty_task_set_is_rejected() {
    let err = ConfigFileBuilder::new().try_build().unwrap_err();
    assert!(matches!(err, TaskflowError::ConfigError(_)));
}

#[test]
fn fan_out_with_after_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("src", TaskConfigBuilder::value(1).build())
        .with_task("spread", TaskConfigBuilder::fan_out(&[1, 2]).after("src").build())
        .try_build()
        .unwrap_err();

    assert!(matches!(err, TaskflowError::ConfigError(ref msg) if msg.contains("fan-out")));
}

#[test]
fn reduce_without_fan_out_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::value(1).reduce(ReduceOp::Product).build())
        .try_build()
        .unwrap_err();

    assert!(matches!(err, TaskflowError::ConfigError(ref msg) if msg.contains("reduce")));
}

#[test]
fn topological_order_puts_dependencies_first() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task("c", TaskConfigBuilder::new().after("b").build())
        .with_task("b", TaskConfigBuilder::new().after("a").build())
        .with_task("a", TaskConfigBuilder::value(1).build())
        .build();

    let order = topological_order(&cfg.task)?;

    assert_eq!(order, vec!["a", "b", "c"]);
    Ok(())
}

#[test]
fn reduce_op_deserializes_and_applies() -> TestResult {
    #[derive(serde::Deserialize)]
    struct Wrapper {
        reduce: ReduceOp,
    }
    let parsed: Wrapper = toml::from_str("reduce = \"product\"")?;
    assert_eq!(parsed.reduce, ReduceOp::Product);
    assert!(toml::from_str::<Wrapper>("reduce = \"median\"").is_err());

    assert_eq!(ReduceOp::Sum.apply(&[1, 2, 3])?, 6);
    assert_eq!(ReduceOp::Product.apply(&[2, 3, 4])?, 24);
    assert_eq!(ReduceOp::Max.apply(&[])?, 0);
    assert_eq!(ReduceOp::default(), ReduceOp::Sum);
    Ok(())
}

#[test]
fn reduce_op_reports_overflow() {
    let err = ReduceOp::Sum.apply(&[i64::MAX, 1]).unwrap_err();
    assert!(err.to_string().contains("overflow"), "got {err}");
    assert!(ReduceOp::Product.apply(&[i64::MAX, 2]).is_err());
    assert_eq!(ReduceOp::Max.apply(&[i64::MAX, 1]).ok(), Some(i64::MAX));
}
