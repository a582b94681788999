use std::collections::BTreeMap;
use std::env;

use anyhow::Context;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use courier_core::{Dispatcher, DispatcherConfig, SimulatedHandler, Task};

const DEMO_TASKS_ENV: &str = "COURIER_DEMO_TASKS";
const DEMO_MAX_RETRIES: u32 = 2;

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Polls until no task is queued or running.
async fn settled(dispatcher: &Dispatcher) {
    loop {
        let counts = dispatcher.counts();
        if counts.is_settled() && dispatcher.pending_retries() == 0 {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) 設定と Dispatcher を用意
    let config = DispatcherConfig::from_env();
    let demo_tasks = match env::var(DEMO_TASKS_ENV) {
        Ok(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid {DEMO_TASKS_ENV}={raw}"))?,
        Err(_) => 8,
    };

    let dispatcher = Dispatcher::builder()
        .config(config)
        .handler(SimulatedHandler::default())
        .build()?;

    // (B) worker と retry driver を起動
    dispatcher.start();

    // (C) タスク投入
    for i in 0..demo_tasks {
        let task = Task::new(Ulid::new().to_string(), format!("demo-{i}"), DEMO_MAX_RETRIES);
        if let Err(e) = dispatcher.enqueue(task) {
            warn!(index = i, "demo task rejected: {e}");
        }
    }

    // (D) 全タスクの決着 or シグナルを待つ
    tokio::select! {
        _ = settled(&dispatcher) => info!("all demo tasks settled"),
        _ = shutdown_signal() => info!("signal received: initiating graceful shutdown"),
    }

    // (E) graceful shutdown: 受付停止 -> 実行中を待つ -> cancel -> join
    dispatcher.shutdown().await;

    info!(counts = ?dispatcher.counts(), "final counts");
    let dump: BTreeMap<_, _> = dispatcher.dump_all().into_iter().collect();
    println!("{}", serde_json::to_string_pretty(&dump)?);

    Ok(())
}
