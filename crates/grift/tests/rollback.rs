//! Integration tests for failure handling and compensation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use grift::{StepStatus, Transaction, TransactionError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
struct TestError(String);

type Txn = Transaction<String, TestError>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// External state a step mutates and its compensation restores.
#[derive(Debug, Default)]
struct RollbackData {
    mutated: Vec<String>,
    pre_rollback: Vec<String>,
}

const ORIGINAL: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn rollback_data() -> Arc<Mutex<RollbackData>> {
    Arc::new(Mutex::new(RollbackData {
        mutated: ORIGINAL.iter().map(ToString::to_string).collect(),
        pre_rollback: Vec::new(),
    }))
}

fn mark_all(data: &Mutex<RollbackData>) {
    let mut data = data.lock().expect("data lock");
    data.mutated = ORIGINAL.iter().map(|v| format!("{v}X")).collect();
}

fn restore_all(data: &Mutex<RollbackData>) {
    let mut data = data.lock().expect("data lock");
    for (slot, original) in data.mutated.iter_mut().zip(ORIGINAL) {
        *slot = original.to_string();
    }
}

fn push_xyz(data: &Mutex<RollbackData>) {
    let mut data = data.lock().expect("data lock");
    data.mutated.extend(["x", "y", "z"].map(String::from));
}

fn snapshot_and_drop_xyz(data: &Mutex<RollbackData>) {
    let mut data = data.lock().expect("data lock");
    data.pre_rollback = data.mutated.clone();
    data.mutated.retain(|v| !["x", "y", "z"].contains(&v.as_str()));
}

fn choke() -> Result<String, TestError> {
    Err(TestError("choke".to_string()))
}

#[tokio::test]
async fn single_step_rollback_restores_state() {
    init_tracing();
    let data = rollback_data();
    let (forward, backward) = (Arc::clone(&data), Arc::clone(&data));
    let mut txn = Txn::new()
        .add_with_compensation(
            "step1",
            move |_ctx| {
                mark_all(&forward);
                async { Ok("ok".to_string()) }.boxed()
            },
            move |_ctx| {
                {
                    let mut data = backward.lock().expect("data lock");
                    data.pre_rollback = data.mutated.clone();
                }
                restore_all(&backward);
                async { Ok(()) }.boxed()
            },
        )
        .add("stepf", |_ctx| async { choke() }.boxed());

    let txn = txn.execute().await;

    assert!(!txn.success());
    assert!(txn.failed());
    assert!(txn.step_succeeded("step1"));
    assert!(txn.step_failed("stepf"));
    assert_eq!(txn.error_from("stepf"), Some(&TestError("choke".to_string())));

    let data = data.lock().expect("data lock");
    assert_eq!(data.mutated, ORIGINAL);
    assert_eq!(
        data.pre_rollback,
        ["aX", "bX", "cX", "dX", "eX", "fX"]
    );
}

#[tokio::test]
async fn multiple_step_rollback_runs_in_reverse() {
    init_tracing();
    let data = rollback_data();
    let (f1, b1, f2, b2) = (
        Arc::clone(&data),
        Arc::clone(&data),
        Arc::clone(&data),
        Arc::clone(&data),
    );
    let mut txn = Txn::new()
        .add_with_compensation(
            "step1",
            move |_ctx| {
                mark_all(&f1);
                async { Ok("ok".to_string()) }.boxed()
            },
            move |_ctx| {
                restore_all(&b1);
                async { Ok(()) }.boxed()
            },
        )
        .add_with_compensation(
            "step2",
            move |_ctx| {
                push_xyz(&f2);
                async { Ok("ok".to_string()) }.boxed()
            },
            move |_ctx| {
                snapshot_and_drop_xyz(&b2);
                async { Ok(()) }.boxed()
            },
        )
        .add("stepf", |_ctx| async { choke() }.boxed());

    let txn = txn.execute().await;

    assert!(txn.failed());
    assert!(txn.step_succeeded("step1"));
    assert!(txn.step_succeeded("step2"));
    assert!(txn.step_failed("stepf"));

    let data = data.lock().expect("data lock");
    assert_eq!(data.mutated, ORIGINAL);
    assert_eq!(
        data.pre_rollback,
        ["aX", "bX", "cX", "dX", "eX", "fX", "x", "y", "z"]
    );
}

#[tokio::test]
async fn async_compensations_are_awaited_one_at_a_time() {
    let data = rollback_data();
    let (f1, b1, f2, b2) = (
        Arc::clone(&data),
        Arc::clone(&data),
        Arc::clone(&data),
        Arc::clone(&data),
    );
    let mut txn = Txn::new()
        .add_with_compensation(
            "step1",
            move |_ctx| {
                mark_all(&f1);
                async { Ok("ok".to_string()) }.boxed()
            },
            move |_ctx| {
                async move {
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    restore_all(&b1);
                    Ok(())
                }
                .boxed()
            },
        )
        .add_with_compensation(
            "step2",
            move |_ctx| {
                push_xyz(&f2);
                async { Ok("ok".to_string()) }.boxed()
            },
            move |_ctx| {
                async move {
                    {
                        let mut data = b2.lock().expect("data lock");
                        data.pre_rollback = data.mutated.clone();
                    }
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    let mut data = b2.lock().expect("data lock");
                    data.mutated.retain(|v| !["x", "y", "z"].contains(&v.as_str()));
                    Ok(())
                }
                .boxed()
            },
        )
        .add("stepf", |_ctx| async { choke() }.boxed());

    let txn = txn.execute().await;

    assert!(txn.failed());
    let data = data.lock().expect("data lock");
    assert_eq!(data.mutated, ORIGINAL);
    assert_eq!(
        data.pre_rollback,
        ["aX", "bX", "cX", "dX", "eX", "fX", "x", "y", "z"]
    );
}

#[tokio::test]
async fn immediate_failure_skips_everything_after() {
    let mut txn = Transaction::<i64, String>::new()
        .add("a", |_ctx| async { Err("err!".to_string()) }.boxed())
        .add("b", |ctx| {
            let a = ctx.get("a").copied().unwrap_or_default();
            async move { Ok(a + 1) }.boxed()
        });

    let txn = txn.execute().await;

    assert!(txn.failed());
    assert!(txn.step_failed("a"));
    assert!(txn.step_skipped("b"));
    assert!(txn.results_all().is_empty());
    assert_eq!(txn.errors_all().get("a"), Some(&"err!".to_string()));
}

#[tokio::test]
async fn compensations_follow_success_order_and_skip_unreached_steps() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut txn = Transaction::<i32, String>::new();
    for tag in ["a", "b", "c"] {
        let log = Arc::clone(&log);
        txn = txn.add_with_compensation(
            tag,
            |_ctx| async { Ok(0) }.boxed(),
            move |_ctx| {
                log.lock().expect("log lock").push(format!("undo {tag}"));
                async { Ok(()) }.boxed()
            },
        );
    }
    let after = Arc::clone(&log);
    txn = txn
        .add("boom", |_ctx| async { Err("boom".to_string()) }.boxed())
        .add_with_compensation(
            "never",
            |_ctx| async { Ok(0) }.boxed(),
            move |_ctx| {
                after.lock().expect("log lock").push("undo never".to_string());
                async { Ok(()) }.boxed()
            },
        );

    let txn = txn.execute().await;

    assert!(txn.failed());
    assert!(txn.step_skipped("never"));
    assert_eq!(
        *log.lock().expect("log lock"),
        ["undo c", "undo b", "undo a"]
    );
}

#[tokio::test]
async fn failed_step_is_not_compensated() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let own = Arc::clone(&log);
    let mut txn = Transaction::<i32, String>::new().add_with_compensation(
        "only",
        |_ctx| async { Err("nope".to_string()) }.boxed(),
        move |_ctx| {
            own.lock().expect("log lock").push("undo only");
            async { Ok(()) }.boxed()
        },
    );

    let txn = txn.execute().await;

    assert!(txn.failed());
    assert!(log.lock().expect("log lock").is_empty());
}

#[tokio::test]
async fn compensation_failure_is_swallowed_and_rollback_continues() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (first, second) = (Arc::clone(&log), Arc::clone(&log));
    let mut txn = Transaction::<i32, String>::new()
        .add_with_compensation(
            "first",
            |_ctx| async { Ok(1) }.boxed(),
            move |_ctx| {
                first.lock().expect("log lock").push("undo first");
                async { Ok(()) }.boxed()
            },
        )
        .add_with_compensation(
            "second",
            |_ctx| async { Ok(2) }.boxed(),
            move |_ctx| {
                second.lock().expect("log lock").push("undo second");
                async { Err("cannot undo".to_string()) }.boxed()
            },
        )
        .add("trigger", |_ctx| async { Err("trigger".to_string()) }.boxed());

    let txn = txn.execute().await;

    assert!(txn.failed());
    assert_eq!(txn.errors_all().len(), 1);
    assert_eq!(txn.error_from("trigger"), Some(&"trigger".to_string()));
    assert_eq!(
        *log.lock().expect("log lock"),
        ["undo second", "undo first"]
    );
}

#[tokio::test]
async fn compensations_see_results_of_succeeded_steps() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let mut txn = Transaction::<i32, String>::new()
        .add_with_compensation(
            "reserve",
            |_ctx| async { Ok(42) }.boxed(),
            move |ctx| {
                *sink.lock().expect("seen lock") = ctx.get("reserve").copied();
                async { Ok(()) }.boxed()
            },
        )
        .add("charge", |_ctx| async { Err("declined".to_string()) }.boxed());

    txn.execute().await;

    assert_eq!(*seen.lock().expect("seen lock"), Some(42));
}

#[tokio::test]
async fn audit_log_marks_compensated_and_failed_steps() {
    let mut txn = Transaction::<i32, String>::new()
        .add_with_compensation(
            "a",
            |_ctx| async { Ok(1) }.boxed(),
            |_ctx| async { Ok(()) }.boxed(),
        )
        .add("b", |_ctx| async { Err("b".to_string()) }.boxed())
        .add("c", |_ctx| async { Ok(3) }.boxed());

    let txn = txn.execute().await;

    let records = txn.audit().records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, StepStatus::Compensated);
    assert!(records[0].compensated_at.is_some());
    assert_eq!(records[1].status, StepStatus::Failed);
    assert!(txn.audit().summary().contains("✗ b"));
}

#[tokio::test]
async fn into_outcome_reports_first_failure() {
    let mut txn = Txn::new()
        .add("ok", |_ctx| async { Ok("fine".to_string()) }.boxed())
        .add("bad", |_ctx| async { choke() }.boxed());
    txn.execute().await;

    match txn.into_outcome() {
        Err(TransactionError::StepFailed { step, source }) => {
            assert_eq!(step, "bad");
            assert_eq!(source, TestError("choke".to_string()));
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn into_outcome_error_converts_to_anyhow() {
    let mut txn = Txn::new().add("bad", |_ctx| async { choke() }.boxed());
    txn.execute().await;

    let err = anyhow::Error::from(txn.into_outcome().expect_err("should fail"));

    assert_eq!(err.to_string(), "step 'bad' failed");
    assert_eq!(err.root_cause().to_string(), "choke");
}

#[tokio::test]
async fn steps_without_compensation_stay_succeeded_in_audit() {
    let mut txn = Transaction::<i32, String>::new()
        .add("plain", |_ctx| async { Ok(1) }.boxed())
        .add_with_compensation(
            "undoable",
            |_ctx| async { Ok(2) }.boxed(),
            |_ctx| async { Ok(()) }.boxed(),
        )
        .add("boom", |_ctx| async { Err("boom".to_string()) }.boxed());

    let txn = txn.execute().await;

    let records = txn.audit().records();
    assert_eq!(records[0].tag, "plain");
    assert_eq!(records[0].status, StepStatus::Succeeded);
    assert!(records[0].compensated_at.is_none());
    assert_eq!(records[1].status, StepStatus::Compensated);
    assert!(txn.audit().summary().contains("✓ plain"));
}
