// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod proxy;
pub mod rules;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{Service, ServiceOverrides, config_base_dir, load_and_validate};
use crate::engine::{Orchestrator, run_init_hooks, spawn_refresh_loop, wait_for_signal};
use crate::exec::LifecycleManager;
use crate::proxy::{DialPolicy, ProxyState};
use crate::watch::{scan_tree, spawn_change_consumer, spawn_watcher};

/// High-level entry point used by `main.rs`.
///
/// Startup order: config, proxy socket, init hooks, initial scan, file
/// watcher, refresh timer, proxy. Runs until a termination signal or a
/// proxy failure, then shuts down.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let base_dir = config_base_dir(&config_path)?;
    let overrides = ServiceOverrides {
        port: args.port,
        refresh: args.refresh,
    };
    let process_env: Vec<(String, String)> = std::env::vars().collect();
    let service = Service::build(&cfg, &base_dir, &process_env, &overrides)?;

    if args.dry_run {
        print_dry_run(&service);
        return Ok(());
    }

    // Bind first so a taken port fails before anything has run.
    let listener = match service.dev_addr() {
        Some(addr) => Some(proxy::bind(addr).await?),
        None => {
            info!("no dev port configured; running without a proxy");
            None
        }
    };

    let lifecycle = Arc::new(LifecycleManager::new(Arc::clone(&service.rules)));
    run_init_hooks(&service.rules, lifecycle.as_ref())
        .await
        .context("init hook failed")?;

    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&service.rules), lifecycle));

    let initial = scan_tree(&service.root, &service.rules);
    let report = orchestrator.run_batch(initial).await;
    if !report.errors.is_empty() {
        warn!(errors = report.errors.len(), "initial build had errors");
    }

    let (paths_tx, paths_rx) = mpsc::unbounded_channel();
    let _watcher = match spawn_watcher(service.root.clone(), paths_tx) {
        Ok(handle) => handle,
        Err(err) => {
            orchestrator.shutdown().await;
            return Err(anyhow::Error::new(err).context("starting file watcher"));
        }
    };
    let consumer = spawn_change_consumer(paths_rx, Arc::clone(&orchestrator));
    let refresh = spawn_refresh_loop(Arc::clone(&orchestrator), service.refresh);

    let result = tokio::select! {
        res = serve_proxy(listener, &service, Arc::clone(&orchestrator)) => res,
        res = wait_for_signal() => res,
    };

    refresh.abort();
    consumer.abort();

    let report = orchestrator.shutdown().await;
    if !report.hook_failures.is_empty() {
        warn!(failures = report.hook_failures.len(), "some exit hooks failed");
    }

    result
}

/// Run the proxy, or wait forever when there is none.
async fn serve_proxy(
    listener: Option<TcpListener>,
    service: &Service,
    orchestrator: Arc<Orchestrator>,
) -> Result<()> {
    let (Some(listener), Some(upstream)) = (listener, service.app_addr()) else {
        return std::future::pending().await;
    };
    let state = ProxyState::new(orchestrator, upstream, DialPolicy::default())?;
    proxy::serve(listener, state).await?;
    Ok(())
}

/// Print the resolved service without running anything.
fn print_dry_run(service: &Service) {
    println!("watchproxy dry-run");
    match service.ports {
        Some(ports) => println!("  proxy: :{} -> 127.0.0.1:{}", ports.dev, ports.app),
        None => println!("  proxy: disabled"),
    }
    println!("  refresh: {:?}", service.refresh);
    println!("  root: {}", service.root.display());
    println!();

    println!("rules ({}):", service.rules.len());
    for rule in service.rules.iter() {
        println!("  - {}", rule.name);
        println!("      cmd: {}", rule.command);
        match &rule.pattern {
            Some(pattern) => println!("      match: {}", pattern.as_str()),
            None => println!("      match: (continuation only)"),
        }
        if let Some(next) = &rule.continuation {
            println!("      continue: {next}");
        }
        println!("      wait: {}", rule.wait);
        if rule.shell {
            println!("      shell: true");
        }
        println!("      dir: {}", rule.dir.display());
        if let Some(hook) = &rule.on_init {
            println!("      on_init: {hook}");
        }
        if let Some(hook) = &rule.on_exit {
            println!("      on_exit: {hook}");
        }
    }

    debug!("dry-run complete (no execution)");
}
