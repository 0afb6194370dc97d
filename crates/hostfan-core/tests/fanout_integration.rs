use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use hostfan_core::*;
use hostfan_exec::error::ExecError;
use hostfan_exec::result::CommandResult;
use hostfan_exec::traits::RemoteExecutor;

// Mock implementations
struct MockExecutor {
    commands: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.commands.lock().unwrap().push(cmd.to_string());
        Ok(CommandResult {
            status: 0,
            stdout: format!("ran {cmd}"),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    fn executor_type(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug)]
struct HostDown(String);

impl fmt::Display for HostDown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host {} is down", self.0)
    }
}

impl StdError for HostDown {}

fn started(workers: usize) -> (Arc<Orchestrator>, Arc<MockExecutor>) {
    let executor = Arc::new(MockExecutor {
        commands: Mutex::new(Vec::new()),
    });
    let orchestrator = Orchestrator::new(OrchestratorArgs {
        pool: PoolConfig { workers },
        executor: executor.clone(),
        hosts: vec![
            HostConfig::new("node-a").with_label("mon"),
            HostConfig::new("node-b").with_addr("10.0.0.2"),
            HostConfig::new("node-c"),
        ],
    })
    .unwrap();
    orchestrator.start().unwrap();
    (orchestrator, executor)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_follow_input_order_not_completion_order() {
    let (orchestrator, _) = started(8);
    let completed = Arc::new(Mutex::new(Vec::new()));

    let log = completed.clone();
    let results = orchestrator
        .fan_out("delayed", (0u64..6).collect(), move |i: u64| {
            let log = log.clone();
            async move {
                // later items finish first
                tokio::time::sleep(Duration::from_millis((6 - i) * 15)).await;
                log.lock().unwrap().push(i);
                Ok::<_, HostDown>(i * 10)
            }
        })
        .await
        .unwrap();

    assert_eq!(results, vec![0, 10, 20, 30, 40, 50]);
    assert_eq!(*completed.lock().unwrap(), vec![5, 4, 3, 2, 1, 0]);
}

#[tokio::test]
async fn test_free_and_bound_calls_see_same_arguments() {
    let (orchestrator, _) = started(4);
    let items = vec![("node-a", 1u8), ("node-b", 2u8)];

    let free_calls = Arc::new(Mutex::new(Vec::new()));
    let log = free_calls.clone();
    orchestrator
        .fan_out("free", items.clone(), move |host: &'static str, slot: u8| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push((host, slot));
                Ok::<_, HostDown>(())
            }
        })
        .await
        .unwrap();

    let bound_calls = Arc::new(Mutex::new(Vec::new()));
    let log = bound_calls.clone();
    orchestrator
        .fan_out_bound(
            "bound",
            items,
            move |owner: Arc<Orchestrator>, host: &'static str, slot: u8| {
                let log = log.clone();
                async move {
                    assert!(owner.is_started());
                    log.lock().unwrap().push((host, slot));
                    Ok::<_, HostDown>(())
                }
            },
        )
        .await
        .unwrap();

    let mut free_calls = free_calls.lock().unwrap().clone();
    let mut bound_calls = bound_calls.lock().unwrap().clone();
    free_calls.sort_unstable();
    bound_calls.sort_unstable();
    assert_eq!(free_calls, bound_calls);
}

#[tokio::test]
async fn test_tuple_items_unpack_and_scalars_do_not() {
    let (orchestrator, _) = started(4);

    let lights = orchestrator
        .fan_out(
            "blink",
            vec![("node-a", "sdb", "/dev/sdb"), ("node-c", "sdc", "/dev/sdc")],
            |host: &'static str, dev: &'static str, path: &'static str| async move {
                Ok::<_, HostDown>(format!("{host}:{dev}:{path}"))
            },
        )
        .await
        .unwrap();
    assert_eq!(lights, vec!["node-a:sdb:/dev/sdb", "node-c:sdc:/dev/sdc"]);

    let names = orchestrator
        .fan_out(
            "upper",
            vec!["node-a".to_string(), "node-b".to_string()],
            |host: String| async move { Ok::<_, HostDown>(host.to_uppercase()) },
        )
        .await
        .unwrap();
    assert_eq!(names, vec!["NODE-A", "NODE-B"]);

    let addrs = orchestrator
        .fan_out("address", orchestrator.hosts(), |host: HostConfig| async move {
            Ok::<_, HostDown>(host.address().to_string())
        })
        .await
        .unwrap();
    assert_eq!(addrs, vec!["node-a", "10.0.0.2", "node-c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failure_propagates_after_every_unit_was_submitted() {
    let (orchestrator, _) = started(2);
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    let err = orchestrator
        .fan_out(
            "remove_daemons",
            vec!["node-1", "node-2", "node-3", "node-4", "node-5"],
            move |host: &'static str| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if host == "node-3" {
                        return Err(HostDown(host.to_string()));
                    }
                    Ok(host.len())
                }
            },
        )
        .await
        .unwrap_err();

    assert_eq!(ran.load(Ordering::SeqCst), 5);
    assert_eq!(orchestrator.worker_pool().unwrap().submitted(), 5);
    assert_eq!(err.item_index(), Some(2));
    assert!(matches!(&err, FanOutError::HostOperation { operation, .. } if operation == "remove_daemons"));
    assert_eq!(err.operation_error::<HostDown>().unwrap().0, "node-3");
    assert_eq!(err.source().unwrap().to_string(), "host node-3 is down");
}

#[tokio::test]
async fn test_empty_batch_skips_pool() {
    let orchestrator = Orchestrator::new(OrchestratorArgs::default()).unwrap();

    let results = orchestrator
        .fan_out("noop", Vec::<String>::new(), |host: String| async move {
            Ok::<_, HostDown>(host)
        })
        .await
        .unwrap();
    assert!(results.is_empty());

    orchestrator.start().unwrap();
    let report = orchestrator
        .fan_out_settled("noop", Vec::<String>::new(), |host: String| async move {
            Ok::<_, HostDown>(host)
        })
        .await
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(orchestrator.worker_pool().unwrap().submitted(), 0);
}

#[tokio::test]
async fn test_dispatch_before_start_is_not_initialized() {
    let orchestrator = Orchestrator::new(OrchestratorArgs::default()).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    let err = orchestrator
        .fan_out_bound(
            "deploy",
            vec!["node-a", "node-b"],
            move |_owner: Arc<Orchestrator>, _host: &'static str| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HostDown>(())
                }
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FanOutError::NotInitialized));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_pool_size() {
    let (orchestrator, _) = started(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (r, p) = (running.clone(), peak.clone());
    orchestrator
        .fan_out("busy", (0u32..10).collect(), move |_i: u32| {
            let (running, peak) = (r.clone(), p.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, HostDown>(())
            }
        })
        .await
        .unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_panicking_unit_is_reported() {
    let (orchestrator, _) = started(4);
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    let err = orchestrator
        .fan_out("fragile", vec![1u8, 2, 3], move |n: u8| {
            let counter = counter.clone();
            async move {
                if n == 2 {
                    panic!("bad host state");
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HostDown>(n)
            }
        })
        .await
        .unwrap_err();

    assert_eq!(ran.load(Ordering::SeqCst), 2);
    match err {
        FanOutError::UnitPanicked { index, message, .. } => {
            assert_eq!(index, 1);
            assert_eq!(message, "bad host state");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_panic_before_first_await_stays_in_its_unit() {
    let (orchestrator, _) = started(4);
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    let outcome = tokio::spawn(async move {
        orchestrator
            .fan_out("fragile", vec![1u8, 2, 3], move |n: u8| {
                if n == 2 {
                    panic!("bad host state");
                }
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HostDown>(n)
                }
            })
            .await
    })
    .await
    .expect("dispatch itself must not panic");

    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert!(matches!(
        outcome,
        Err(FanOutError::UnitPanicked { index: 1, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_prefix_runs_on_pool_workers() {
    let (orchestrator, _) = started(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (r, p) = (running.clone(), peak.clone());
    orchestrator
        .fan_out("inventory", vec![1u8, 2, 3, 4], move |n: u8| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            r.fetch_sub(1, Ordering::SeqCst);
            async move { Ok::<_, HostDown>(n) }
        })
        .await
        .unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dispatches_can_be_spawned() {
    let (orchestrator, _) = started(2);
    let mut registry = OperationRegistry::<Orchestrator>::new();
    registry.register_free("echo", 1, |args: Vec<Value>| async move {
        Ok::<_, BoxError>(args.into_iter().next().unwrap_or(Value::Null))
    });
    let registry = Arc::new(registry);

    let typed = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .fan_out("double", vec![1u32, 2], |n: u32| async move {
                    Ok::<_, BoxError>(n * 2)
                })
                .await
        })
    };
    let named = {
        let orchestrator = orchestrator.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .invoke(&orchestrator, "echo", vec![json!(["a", "b"])])
                .await
        })
    };

    assert_eq!(typed.await.unwrap().unwrap(), vec![2, 4]);
    assert_eq!(named.await.unwrap().unwrap(), vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn test_bound_settled_reports_every_slot() {
    let (orchestrator, executor) = started(2);

    let hosts = orchestrator.hosts();
    let report = orchestrator
        .fan_out_bound_settled(
            "reboot",
            hosts,
            |owner: Arc<Orchestrator>, host: HostConfig| async move {
                if host.labels.iter().any(|l| l == "mon") {
                    return Err(BoxError::from(format!("refusing to reboot {}", host.name)));
                }
                let result = owner.executor().run(&format!("reboot {}", host.address())).await?;
                Ok::<_, BoxError>(result.stdout)
            },
        )
        .await
        .unwrap();

    assert_eq!(report.operation, "reboot");
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures().next().map(|(i, _)| i), Some(0));
    assert_eq!(
        report.outcomes[1].as_ref().unwrap(),
        "ran reboot 10.0.0.2"
    );
    assert_eq!(executor.commands.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_settled_reports_every_slot() {
    let (orchestrator, _) = started(3);

    let report = orchestrator
        .fan_out_settled(
            "check_host",
            vec!["node-a", "node-b", "node-c", "node-d"],
            |host: &'static str| async move {
                if host.ends_with('b') || host.ends_with('d') {
                    Err(HostDown(host.to_string()))
                } else {
                    Ok(host)
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(report.operation, "check_host");
    assert_eq!(report.len(), 4);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 2);
    let failed: Vec<_> = report.failures().map(|(i, _)| i).collect();
    assert_eq!(failed, vec![1, 3]);
    assert_eq!(*report.outcomes[2].as_ref().unwrap(), "node-c");

    let err = report.into_result().unwrap_err();
    assert_eq!(err.item_index(), Some(1));
}

#[tokio::test]
async fn test_dispatch_after_shutdown_is_refused() {
    let (orchestrator, _) = started(2);
    orchestrator.shutdown().await;

    let err = orchestrator
        .fan_out("late", vec!["node-a"], |host: &'static str| async move {
            Ok::<_, HostDown>(host)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FanOutError::PoolClosed));
}

#[tokio::test]
async fn test_registry_runs_bound_operation_through_owner_executor() {
    let (orchestrator, executor) = started(2);
    let mut registry = OperationRegistry::<Orchestrator>::new();

    registry.register_bound("run", 2, |owner: Arc<Orchestrator>, args: Vec<Value>| async move {
        let host = args[0].as_str().unwrap_or_default().to_string();
        let cmd = format!("{} {host}", args[1].as_str().unwrap_or_default());
        let result = owner.executor().run(&cmd).await?;
        Ok::<_, BoxError>(Value::String(result.stdout))
    });
    registry.register_free("echo", 1, |args: Vec<Value>| async move {
        Ok::<_, BoxError>(args.into_iter().next().unwrap_or(Value::Null))
    });

    let out = registry
        .invoke(
            &orchestrator,
            "run",
            vec![json!([["node-a", "uptime"], ["node-b", "uptime"]])],
        )
        .await
        .unwrap();
    assert_eq!(out, vec![json!("ran uptime node-a"), json!("ran uptime node-b")]);
    assert_eq!(executor.commands.lock().unwrap().len(), 2);

    let out = registry
        .invoke(&orchestrator, "echo", vec![json!(["node-a", 7])])
        .await
        .unwrap();
    assert_eq!(out, vec![json!("node-a"), json!(7)]);

    let ops = registry.operations();
    assert_eq!(ops.len(), 2);
    assert!(registry.describe("run").unwrap().bound);
}

#[tokio::test]
async fn test_registry_rejects_bad_calls_before_running() {
    let (orchestrator, _) = started(2);
    let ran = Arc::new(AtomicUsize::new(0));
    let mut registry = OperationRegistry::<Orchestrator>::new();

    let counter = ran.clone();
    registry.register_free("pair", 2, move |_args: Vec<Value>| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(Value::Null)
        }
    });

    let calls = [
        ("pair", vec![json!([["a", 1]]), json!([["b", 2]])]),
        ("pair", vec![json!({"host": "a"})]),
        ("pair", vec![json!([["a", 1], "b"])]),
        ("missing", vec![json!([])]),
    ];
    for (name, args) in calls {
        let err = registry.invoke(&orchestrator, name, args).await.unwrap_err();
        assert!(matches!(err, FanOutError::InvalidInvocation(_)), "{name}: {err}");
    }

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.worker_pool().unwrap().submitted(), 0);
}
