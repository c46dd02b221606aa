//! Multi-node invocation scenarios
//!
//! Nodes are emulated by several systems sharing one in-process directory.
//!
//! Run with: cargo test -p courier --test registry_cluster_test

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use courier::actor::ActorRef;
use courier::invocation::{InvocationError, Request};
use courier::task::TaskResult;
use courier::worker::WorkerPoolConfig;
use courier::{CourierConfig, LocalDirectory, Membership, System};

fn node(name: &str, directory: &LocalDirectory) -> System {
    let config = CourierConfig::new()
        .with_node_name(name)
        .with_pool(WorkerPoolConfig::new().with_max_capacity(4))
        .with_ask_timeout(Duration::from_secs(2))
        .with_stop_grace_period(Duration::from_secs(1));

    System::builder(config)
        .directory(Arc::new(directory.clone()))
        .start()
        .expect("node starts")
}

async fn compute(_me: ActorRef<Request>, args: Vec<Value>) -> TaskResult<Value> {
    let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
    Ok(json!(sum))
}

async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition().await {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[test_log::test(tokio::test)]
async fn test_invoke_procedure_registered_on_another_node() {
    let directory = LocalDirectory::new();
    let node_a = node("node-a", &directory);
    let node_b = node("node-b", &directory);

    node_a.registry().register("svc@compute", compute).await.unwrap();

    let reply = node_b
        .registry()
        .invoke("svc@compute", vec![json!(2), json!(3)], Duration::from_secs(1))
        .await;
    assert_eq!(reply, Ok(json!(5)));

    wait_until("node-b to learn the provider", || async {
        node_b.registry().routes("svc@compute").await.unwrap().len() == 1
    })
    .await;

    node_a.shutdown().await.unwrap();
    node_b.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_unregistered_path_fails_without_blocking() {
    let directory = LocalDirectory::new();
    let node_a = node("node-a", &directory);

    let started = Instant::now();
    let reply = node_a
        .registry()
        .invoke("svc@missing", vec![], Duration::from_secs(30))
        .await;

    assert_eq!(reply, Err(InvocationError::NotAvailable("svc@missing".into())));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test_log::test(tokio::test)]
async fn test_requests_balance_across_nodes() {
    let directory = LocalDirectory::new();
    let node_a = node("node-a", &directory);
    let node_b = node("node-b", &directory);
    let caller = node("caller", &directory);

    for system in [&node_a, &node_b] {
        let name = system.node_name().to_string();
        system
            .registry()
            .register("svc@whoami", move |_me, _args| {
                let name = name.clone();
                async move { Ok(json!(name)) }
            })
            .await
            .unwrap();
    }
    wait_until("both providers listed", || async {
        directory.listing(&"svc@whoami".into()).len() == 2
    })
    .await;

    let mut answers = Vec::new();
    for _ in 0..4 {
        answers.push(caller.registry().call("svc@whoami", vec![]).await.unwrap());
    }
    assert!(answers.contains(&json!("node-a")));
    assert!(answers.contains(&json!("node-b")));
}

#[test_log::test(tokio::test)]
async fn test_provider_termination_is_reflected_in_routes() {
    let directory = LocalDirectory::new();
    let node_a = node("node-a", &directory);
    let node_b = node("node-b", &directory);

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let started_tx = Arc::new(parking_lot::Mutex::new(Some(started_tx)));
    let entry = node_a
        .registry()
        .register("svc@slow", move |_me, _args| {
            let started_tx = Arc::clone(&started_tx);
            async move {
                let first = started_tx.lock().take();
                if let Some(tx) = first {
                    let _ = tx.send(());
                }
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(json!("late"))
            }
        })
        .await
        .unwrap();

    wait_until("node-b to learn the provider", || async {
        node_b.registry().routes("svc@slow").await.unwrap().len() == 1
    })
    .await;

    let in_flight = {
        let registry = node_b.registry().clone();
        tokio::spawn(async move {
            registry
                .invoke("svc@slow", vec![], Duration::from_millis(500))
                .await
        })
    };
    started_rx.await.unwrap();

    entry.stop(Duration::from_secs(1)).await.unwrap();

    wait_until("the terminated provider to leave node-b's routes", || async {
        node_b.registry().routes("svc@slow").await.unwrap().is_empty()
    })
    .await;

    // Either the late reply or a timeout, never a hang
    let outcome = tokio::time::timeout(Duration::from_secs(2), in_flight)
        .await
        .expect("in-flight request must resolve")
        .unwrap();
    assert!(
        matches!(
            &outcome,
            Ok(value) if value == &json!("late")
        ) || matches!(outcome, Err(InvocationError::Timeout(_))),
        "unexpected outcome: {outcome:?}"
    );

    assert_eq!(
        node_b.registry().call("svc@slow", vec![]).await,
        Err(InvocationError::NotAvailable("svc@slow".into()))
    );
}
