//! End-to-end fabric tests: one hub, a few docks, real TCP.
//!
//! Each test gets its own hub and its own dock port base so parallel
//! tests never contend for listener ports.

use std::any::Any;
use std::time::Duration;

use quay::prelude::*;
use tokio::sync::mpsc;

fn config(port_base: u16) -> Config {
    Config {
        heartbeat_interval: Duration::from_millis(100),
        call_timeout: None,
        dock_port_base: port_base,
    }
}

async fn start_hub(port_base: u16) -> (Hub, String) {
    let hub = Hub::bind("127.0.0.1:0", config(port_base))
        .await
        .expect("bind hub");
    let addr = hub.local_addr().to_string();
    let runner = hub.clone();
    tokio::spawn(async move { runner.run().await });
    (hub, addr)
}

/// Arithmetic signaler used by most scenarios. The `calls` channel
/// mirrors every dispatch so tests can observe fire-and-forget traffic.
struct Math {
    calls: mpsc::UnboundedSender<String>,
}

impl Math {
    fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (calls, seen) = mpsc::unbounded_channel();
        (Self { calls }, seen)
    }
}

impl Signaler for Math {
    fn dispatch(&self, method: &str, args: &[Value]) -> Result<Vec<Value>, DispatchError> {
        let _ = self.calls.send(method.to_owned());
        match method {
            "add" => {
                let a = args[0].as_i32()?;
                let b = args[1].as_i32()?;
                Ok(vec![Value::I32(a + b)])
            }
            "echo" => Ok(args.to_vec()),
            "name" => Ok(vec![Value::from("math")]),
            "fail" => Err(DispatchError::App("bad".into())),
            "explode" => panic!("boom"),
            "slow" => {
                std::thread::sleep(Duration::from_secs(1));
                Ok(vec![])
            }
            other => Err(DispatchError::UnknownMethod(other.to_owned())),
        }
    }
}

async fn math_dock(hub_addr: &str, port_base: u16) -> (Dock, mpsc::UnboundedReceiver<String>) {
    let (math, seen) = Math::new();
    let dock = Dock::startup(
        hub_addr,
        "util",
        vec![SlotDecl::export("IMath", math)],
        ProxyRegistry::new(),
        config(port_base),
    )
    .await
    .expect("start math dock");
    (dock, seen)
}

async fn caller_dock(hub_addr: &str, port_base: u16) -> Dock {
    Dock::startup(
        hub_addr,
        "logic",
        vec![SlotDecl::import("IMath")],
        ProxyRegistry::new(),
        config(port_base),
    )
    .await
    .expect("start caller dock")
}

#[tokio::test]
async fn query_miss_surfaces_unknown_slot() {
    let (hub, hub_addr) = start_hub(42000).await;
    let caller = caller_dock(&hub_addr, 42000).await;

    match caller.handle().call_with_result("X", "m", vec![]).await {
        Err(CallError::UnknownSlot(slot)) => assert_eq!(slot, "X"),
        other => panic!("expected unknown slot, got {other:?}"),
    }

    caller.close();
    hub.close();
}

#[tokio::test]
async fn registration_is_queryable_at_the_docks_address() {
    let (hub, hub_addr) = start_hub(42100).await;
    let (dock, _seen) = math_dock(&hub_addr, 42100).await;

    let addr = hub.lookup("IMath").expect("IMath registered");
    assert_eq!(addr, format!("127.0.0.1:{}", dock.local_addr().port()));

    dock.close();
    hub.close();
}

#[tokio::test]
async fn fire_and_forget_runs_without_a_response() {
    let (hub, hub_addr) = start_hub(42200).await;
    let (host, mut seen) = math_dock(&hub_addr, 42200).await;
    let caller = caller_dock(&hub_addr, 42201).await;

    caller
        .handle()
        .call("IMath", "add", vec![Value::I32(2), Value::I32(3)])
        .await
        .expect("send call");

    let method = tokio::time::timeout(Duration::from_secs(1), seen.recv())
        .await
        .expect("callee never ran")
        .expect("channel open");
    assert_eq!(method, "add");

    caller.close();
    host.close();
    hub.close();
}

#[tokio::test]
async fn call_with_result_round_trips() {
    let (hub, hub_addr) = start_hub(42300).await;
    let (host, _seen) = math_dock(&hub_addr, 42300).await;
    let caller = caller_dock(&hub_addr, 42301).await;

    let results = caller
        .handle()
        .call_with_result("IMath", "add", vec![Value::I32(2), Value::I32(3)])
        .await
        .expect("call");
    assert_eq!(results, vec![Value::I32(5)]);

    caller.close();
    host.close();
    hub.close();
}

#[tokio::test]
async fn callee_errors_travel_in_band_and_spare_the_connection() {
    let (hub, hub_addr) = start_hub(42400).await;
    let (host, _seen) = math_dock(&hub_addr, 42400).await;
    let caller = caller_dock(&hub_addr, 42401).await;
    let handle = caller.handle();

    match handle.call_with_result("IMath", "fail", vec![]).await {
        Err(CallError::Remote(msg)) => assert_eq!(msg, "bad"),
        other => panic!("expected remote error, got {other:?}"),
    }

    match handle.call_with_result("IMath", "missing", vec![]).await {
        Err(CallError::Remote(msg)) => assert_eq!(msg, "unknown method: missing"),
        other => panic!("expected remote error, got {other:?}"),
    }

    match handle.call_with_result("IMath", "explode", vec![]).await {
        Err(CallError::Remote(msg)) => assert_eq!(msg, "boom"),
        other => panic!("expected remote error, got {other:?}"),
    }

    // The same connection still completes healthy calls.
    let results = handle
        .call_with_result("IMath", "add", vec![Value::I32(1), Value::I32(1)])
        .await
        .expect("call after errors");
    assert_eq!(results, vec![Value::I32(2)]);

    caller.close();
    host.close();
    hub.close();
}

#[tokio::test]
async fn argument_mismatch_reports_in_band() {
    let (hub, hub_addr) = start_hub(42500).await;
    let (host, _seen) = math_dock(&hub_addr, 42500).await;
    let caller = caller_dock(&hub_addr, 42501).await;

    match caller
        .handle()
        .call_with_result("IMath", "add", vec![Value::from("two"), Value::I32(3)])
        .await
    {
        Err(CallError::Remote(msg)) => assert!(msg.starts_with("type mismatch"), "got: {msg}"),
        other => panic!("expected remote error, got {other:?}"),
    }

    caller.close();
    host.close();
    hub.close();
}

#[tokio::test]
async fn concurrent_calls_correlate_by_index() {
    let (hub, hub_addr) = start_hub(42600).await;
    let (host, _seen) = math_dock(&hub_addr, 42600).await;
    let caller = caller_dock(&hub_addr, 42601).await;

    let mut tasks = Vec::new();
    for i in 0..16i32 {
        let handle = caller.handle();
        tasks.push(tokio::spawn(async move {
            let results = handle
                .call_with_result("IMath", "echo", vec![Value::I32(i)])
                .await
                .expect("echo");
            (i, results)
        }));
    }

    for task in tasks {
        let (i, results) = task.await.expect("join");
        assert_eq!(results, vec![Value::I32(i)], "crosstalk on call {i}");
    }

    caller.close();
    host.close();
    hub.close();
}

// `slow` parks a runtime worker in a blocking sleep, so these two tests
// need real worker threads.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dock_exit_resets_in_flight_calls_and_frees_the_name() {
    let (hub, hub_addr) = start_hub(42700).await;
    let (host, _seen) = math_dock(&hub_addr, 42700).await;
    let caller = caller_dock(&hub_addr, 42701).await;

    let handle = caller.handle();
    let in_flight = tokio::spawn({
        let handle = handle.clone();
        async move { handle.call_with_result("IMath", "slow", vec![]).await }
    });

    // Let the request reach the host, then kill the host.
    tokio::time::sleep(Duration::from_millis(200)).await;
    host.close();

    match in_flight.await.expect("join") {
        Err(CallError::ConnectionReset) => {}
        other => panic!("expected connection reset, got {other:?}"),
    }

    // The hub purges the departed dock's slots...
    tokio::time::timeout(Duration::from_secs(1), async {
        while hub.lookup("IMath").is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("hub never purged IMath");

    // ...so the next call re-queries and finds nothing.
    match handle.call_with_result("IMath", "add", vec![Value::I32(1), Value::I32(1)]).await {
        Err(CallError::UnknownSlot(_)) => {}
        other => panic!("expected unknown slot, got {other:?}"),
    }

    // A replacement host picks the name back up and calls flow again.
    let (host2, _seen2) = math_dock(&hub_addr, 42710).await;
    let results = handle
        .call_with_result("IMath", "add", vec![Value::I32(4), Value::I32(5)])
        .await
        .expect("call after rehost");
    assert_eq!(results, vec![Value::I32(9)]);

    caller.close();
    host2.close();
    hub.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_call_deadline_times_out_locally() {
    let (hub, hub_addr) = start_hub(42800).await;
    let (host, _seen) = math_dock(&hub_addr, 42800).await;

    let caller = Dock::startup(
        &hub_addr,
        "impatient",
        vec![SlotDecl::import("IMath")],
        ProxyRegistry::new(),
        Config {
            call_timeout: Some(Duration::from_millis(200)),
            ..config(42801)
        },
    )
    .await
    .expect("start caller");
    let handle = caller.handle();

    match handle.call_with_result("IMath", "slow", vec![]).await {
        Err(CallError::Timeout) => {}
        other => panic!("expected timeout, got {other:?}"),
    }

    // The connection outlives the timeout; the late response is dropped
    // and later calls correlate correctly.
    let results = handle
        .call_with_result("IMath", "add", vec![Value::I32(2), Value::I32(2)])
        .await
        .expect("call after timeout");
    assert_eq!(results, vec![Value::I32(4)]);

    caller.close();
    host.close();
    hub.close();
}

#[tokio::test]
async fn registrations_survive_on_heartbeats_alone() {
    let (hub, hub_addr) = start_hub(42900).await;
    let (dock, _seen) = math_dock(&hub_addr, 42900).await;

    // Six heartbeat intervals of silence, twice the idle cutoff. Only
    // heartbeats flow; the registration must survive.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(hub.lookup("IMath").is_some());

    dock.close();
    hub.close();
}

// The shape the offline generator emits for `IMath`: a struct holding the
// call binding, one async method per interface method, zero values on any
// failure or result-type mismatch.
struct MathProxy {
    slot: SlotHandle,
}

impl MathProxy {
    async fn add(&self, a: i32, b: i32) -> i32 {
        match self
            .slot
            .call_with_result("IMath", "add", vec![Value::I32(a), Value::I32(b)])
            .await
        {
            Ok(results) => results.first().and_then(|v| v.as_i32().ok()).unwrap_or_default(),
            Err(_) => 0,
        }
    }

    /// Deliberately declared with the wrong return type: the remote
    /// returns a string, so the coercion fallback yields zero.
    async fn name(&self) -> i64 {
        match self.slot.call_with_result("IMath", "name", vec![]).await {
            Ok(results) => results.first().and_then(|v| v.as_i64().ok()).unwrap_or_default(),
            Err(_) => 0,
        }
    }
}

fn make_math_proxy(slot: SlotHandle) -> Box<dyn Any + Send + Sync> {
    Box::new(MathProxy { slot })
}

#[tokio::test]
async fn visit_builds_registered_proxies() {
    let (hub, hub_addr) = start_hub(43000).await;
    let (host, _seen) = math_dock(&hub_addr, 43000).await;

    let mut registry = ProxyRegistry::new();
    registry.register("IMath", make_math_proxy);

    let caller = Dock::startup(
        &hub_addr,
        "logic",
        vec![SlotDecl::import("IMath")],
        registry,
        config(43001),
    )
    .await
    .expect("start caller");

    let proxy = caller.visit::<MathProxy>("IMath").expect("proxy");
    assert_eq!(proxy.add(2, 3).await, 5);
    assert_eq!(proxy.name().await, 0);

    // Unregistered names resolve to nothing.
    assert!(caller.visit::<MathProxy>("IGame").is_none());

    caller.close();
    host.close();
    hub.close();
}
