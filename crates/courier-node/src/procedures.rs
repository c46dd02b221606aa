// Built-in procedures every node registers

use chrono::Utc;
use courier::invocation::InvocationError;
use courier::task::{TaskError, TaskResult};
use courier::System;
use serde_json::{json, Value};

pub const PING: &str = "node@ping";
pub const ADD: &str = "math@add";
pub const STATS: &str = "node@stats";

/// Register the built-in procedures on `system`
pub async fn register_builtins(system: &System) -> Result<(), InvocationError> {
    let registry = system.registry();

    let node = system.node_name().to_string();
    registry
        .register(PING, move |_me, _args| {
            let node = node.clone();
            async move { Ok(pong(&node)) }
        })
        .await?;

    registry.register_blocking(ADD, add).await?;

    let pool = system.pool().clone();
    registry
        .register(STATS, move |_me, _args| {
            let pool = pool.clone();
            async move {
                let stats = pool.stats().await.map_err(TaskError::failed)?;
                serde_json::to_value(stats).map_err(TaskError::failed)
            }
        })
        .await?;

    Ok(())
}

fn pong(node: &str) -> Value {
    json!({
        "node": node,
        "at": Utc::now().to_rfc3339(),
    })
}

fn add(args: Vec<Value>) -> TaskResult<Value> {
    let mut sum = 0f64;
    let mut integral = true;
    for (i, arg) in args.iter().enumerate() {
        match arg {
            Value::Number(n) => {
                integral &= n.is_i64();
                sum += n.as_f64().unwrap_or_default();
            }
            other => {
                return Err(TaskError::failed(format!(
                    "argument {i} is not a number: {other}"
                )))
            }
        }
    }

    if integral {
        Ok(json!(sum as i64))
    } else {
        Ok(json!(sum))
    }
}
