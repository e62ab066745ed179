//! One hub, two docks, one remote call.
//!
//! The `util` dock hosts `IMath`; the `logic` dock imports it through a
//! generated-style proxy and calls `add` across the fabric. Run with
//! `RUST_LOG=quay_core=debug` to watch registration and routing.

use std::any::Any;

use quay::prelude::*;

struct Math;

impl Signaler for Math {
    fn dispatch(&self, method: &str, args: &[Value]) -> Result<Vec<Value>, DispatchError> {
        match method {
            "add" => {
                let a = args[0].as_i32()?;
                let b = args[1].as_i32()?;
                Ok(vec![Value::I32(a + b)])
            }
            other => Err(DispatchError::UnknownMethod(other.to_owned())),
        }
    }
}

/// What the offline generator emits for `IMath`: one async method per
/// interface method, zero values when the call or coercion fails.
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
            Ok(results) => results
                .first()
                .and_then(|v| v.as_i32().ok())
                .unwrap_or_default(),
            Err(_) => 0,
        }
    }
}

fn make_math_proxy(slot: SlotHandle) -> Box<dyn Any + Send + Sync> {
    Box::new(MathProxy { slot })
}

const HUB_ADDR: &str = "127.0.0.1:9999";

async fn run() {
    let hub = Hub::bind(HUB_ADDR, Config::default())
        .await
        .expect("bind hub");
    let runner = hub.clone();
    tokio::spawn(async move { runner.run().await });

    let util = quay::startup(
        HUB_ADDR,
        "util",
        vec![SlotDecl::export("IMath", Math)],
        ProxyRegistry::new(),
    )
    .await
    .expect("start util dock");

    let mut registry = ProxyRegistry::new();
    registry.register("IMath", make_math_proxy);
    let logic = quay::startup(
        HUB_ADDR,
        "logic",
        vec![SlotDecl::import("IMath")],
        registry,
    )
    .await
    .expect("start logic dock");

    let math = logic.visit::<MathProxy>("IMath").expect("IMath proxy");
    let sum = math.add(2, 3).await;
    println!("2 + 3 = {sum}");

    logic.close();
    util.close();
    hub.close();
    println!("Completed!");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("build tokio runtime");
    rt.block_on(run());
}
