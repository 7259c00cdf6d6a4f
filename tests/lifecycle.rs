// tests/lifecycle.rs
#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use watchproxy::engine::Orchestrator;
use watchproxy::errors::WatchproxyError;
use watchproxy::exec::{LifecycleManager, RunOutcome};
use watchproxy::rules::Rule;
use watchproxy_test_utils::{RuleBuilder, init_tracing, rule_table, with_timeout};

fn manager(rules: &[Rule]) -> LifecycleManager {
    LifecycleManager::new(rule_table(rules.to_vec()))
}

fn is_alive(pid: u32) -> bool {
    // A zombie has exited; only its table entry is left.
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        return !stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'));
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn eventually_dead(pid: u32) -> bool {
    for _ in 0..100 {
        if !is_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn rerun_replaces_the_live_instance() {
    init_tracing();
    let rule = RuleBuilder::new("serve", "sleep 30").build();
    let lm = manager(std::slice::from_ref(&rule));

    assert_eq!(lm.run("sleep 30", &rule).await.unwrap(), RunOutcome::Spawned);
    let first = lm.running_pid("serve", "sleep 30").unwrap();

    assert_eq!(lm.run("sleep 30", &rule).await.unwrap(), RunOutcome::Spawned);
    let second = lm.running_pid("serve", "sleep 30").unwrap();

    assert_ne!(first, second);
    assert!(!is_alive(first));
    assert!(is_alive(second));
    assert_eq!(lm.running_count("serve"), 1);

    lm.kill_all(&rule).await;
    assert!(!is_alive(second));
}

#[tokio::test]
async fn overlapping_reruns_leave_one_live_instance() {
    let dir = tempdir().unwrap();
    let rule = RuleBuilder::new("serve", "echo $$ >> pids; exec sleep 30")
        .shell()
        .dir(dir.path())
        .build();
    let lm = manager(std::slice::from_ref(&rule));

    lm.run(&rule.command, &rule).await.unwrap();
    // The first rerun waits on the old instance while the second registers.
    let (a, b) = tokio::join!(lm.run(&rule.command, &rule), lm.run(&rule.command, &rule));
    assert_eq!(a.unwrap(), RunOutcome::Spawned);
    assert_eq!(b.unwrap(), RunOutcome::Spawned);
    assert_eq!(lm.running_count("serve"), 1);

    let pid_file = dir.path().join("pids");
    let pids: Vec<u32> = with_timeout(async {
        loop {
            let pids: Vec<u32> = std::fs::read_to_string(&pid_file)
                .unwrap_or_default()
                .lines()
                .filter_map(|l| l.trim().parse().ok())
                .collect();
            if pids.len() == 3 {
                break pids;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    let live = lm.running_pid("serve", &rule.command).unwrap();
    assert!(pids.contains(&live));
    for pid in pids.into_iter().filter(|&p| p != live) {
        assert!(eventually_dead(pid).await, "pid {pid} survived");
    }
    assert!(is_alive(live));

    lm.kill_all(&rule).await;
    assert!(!is_alive(live));
}

#[tokio::test]
async fn distinct_renderings_live_side_by_side() {
    let rule = RuleBuilder::new("serve", "sleep $1").build();
    let lm = manager(std::slice::from_ref(&rule));

    lm.run("sleep 30", &rule).await.unwrap();
    lm.run("sleep 31", &rule).await.unwrap();
    assert_eq!(lm.running_count("serve"), 2);

    lm.kill("sleep 30", &rule).await;
    assert_eq!(lm.running_count("serve"), 1);
    assert!(lm.running_pid("serve", "sleep 31").is_some());

    lm.kill_all(&rule).await;
    assert_eq!(lm.running_count("serve"), 0);
}

#[tokio::test]
async fn kill_is_idempotent() {
    let rule = RuleBuilder::new("serve", "sleep 30").build();
    let lm = manager(std::slice::from_ref(&rule));

    lm.kill("sleep 30", &rule).await;

    lm.run("sleep 30", &rule).await.unwrap();
    let pid = lm.running_pid("serve", "sleep 30").unwrap();
    lm.kill("sleep 30", &rule).await;
    lm.kill("sleep 30", &rule).await;

    assert!(!is_alive(pid));
    assert_eq!(lm.running_count("serve"), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn kill_takes_down_the_whole_process_group() {
    let dir = tempdir().unwrap();
    let rule = RuleBuilder::new("serve", "sleep 30 & echo $! > child.pid; wait")
        .shell()
        .dir(dir.path())
        .build();
    let lm = manager(std::slice::from_ref(&rule));

    lm.run(&rule.command, &rule).await.unwrap();

    let pid_file = dir.path().join("child.pid");
    let grandchild: u32 = with_timeout(async {
        loop {
            if let Ok(s) = std::fs::read_to_string(&pid_file) {
                if let Ok(pid) = s.trim().parse() {
                    break pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(is_alive(grandchild));

    lm.kill_all(&rule).await;
    assert!(eventually_dead(grandchild).await);
}

#[tokio::test]
async fn wait_mode_reports_exit_codes() {
    let ok = RuleBuilder::new("ok", "true").wait().build();
    let bad = RuleBuilder::new("bad", "sh -c 'exit 3'").wait().build();
    let lm = manager(&[ok.clone(), bad.clone()]);

    assert_eq!(lm.run("true", &ok).await.unwrap(), RunOutcome::Succeeded);
    assert_eq!(
        lm.run("sh -c 'exit 3'", &bad).await.unwrap(),
        RunOutcome::Failed(3)
    );
    assert_eq!(lm.running_count("ok"), 0);
}

#[tokio::test]
async fn wait_mode_uses_rule_dir_and_env() {
    let dir = tempdir().unwrap();
    let rule = RuleBuilder::new("gen", "sh -c 'echo $GREETING > out.txt'")
        .wait()
        .dir(dir.path())
        .env("GREETING", "hello")
        .build();
    let lm = manager(std::slice::from_ref(&rule));

    assert_eq!(lm.run(&rule.command, &rule).await.unwrap(), RunOutcome::Succeeded);
    let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "hello");
}

#[tokio::test]
async fn lex_error_fails_only_that_run() {
    let rule = RuleBuilder::new("echo", "echo").wait().build();
    let lm = manager(std::slice::from_ref(&rule));

    let err = lm.run("echo \"unterminated", &rule).await.unwrap_err();
    assert!(matches!(err, WatchproxyError::Syntax(_)));

    assert_eq!(lm.run("echo fine", &rule).await.unwrap(), RunOutcome::Succeeded);
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let rule = RuleBuilder::new("nope", "definitely-not-a-real-binary-4711").wait().build();
    let lm = manager(std::slice::from_ref(&rule));

    let err = lm.run(&rule.command, &rule).await.unwrap_err();
    assert!(matches!(err, WatchproxyError::Spawn { .. }));
}

#[tokio::test]
async fn respawn_kills_downstream_background_continuation() {
    let upstream = RuleBuilder::new("tunnel", "sleep 30").then("serve").build();
    let downstream = RuleBuilder::new("serve", "sleep 31").build();
    let lm = manager(&[upstream.clone(), downstream.clone()]);

    lm.run("sleep 30", &upstream).await.unwrap();
    lm.run("sleep 31", &downstream).await.unwrap();
    let served = lm.running_pid("serve", "sleep 31").unwrap();

    lm.run("sleep 30", &upstream).await.unwrap();
    assert_eq!(lm.running_count("serve"), 0);
    assert!(!is_alive(served));

    lm.kill_all(&upstream).await;
}

#[tokio::test]
async fn hooks_run_through_the_shell() {
    let dir = tempdir().unwrap();
    let rule = RuleBuilder::new("db", "true")
        .dir(dir.path())
        .env("NAME", "db")
        .build();
    let lm = manager(std::slice::from_ref(&rule));

    lm.run_hook("echo started-$NAME > hook.txt", &rule).await.unwrap();
    let out = std::fs::read_to_string(dir.path().join("hook.txt")).unwrap();
    assert_eq!(out.trim(), "started-db");

    match lm.run_hook("exit 2", &rule).await {
        Err(WatchproxyError::HookFailed { rule, code }) => {
            assert_eq!(rule, "db");
            assert_eq!(code, 2);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn nothing_spawns_after_shutdown_began() {
    let rule = RuleBuilder::new("serve", "sleep 30").build();
    let lm = manager(std::slice::from_ref(&rule));

    lm.begin_shutdown();
    assert_eq!(lm.run("sleep 30", &rule).await.unwrap(), RunOutcome::Skipped);
    assert_eq!(lm.running_count("serve"), 0);
}

#[tokio::test]
async fn orchestrated_change_builds_then_serves() {
    init_tracing();
    let dir = tempdir().unwrap();
    let rules = rule_table([
        RuleBuilder::new("build", "touch built")
            .matching(r"\.src$")
            .wait()
            .then("serve")
            .dir(dir.path())
            .build(),
        RuleBuilder::new("serve", "sleep 30").dir(dir.path()).build(),
    ]);
    let lm = Arc::new(LifecycleManager::new(Arc::clone(&rules)));
    let orch = Orchestrator::new(rules, lm.clone());

    orch.record_change(Path::new("/project/main.src"));
    let report = with_timeout(orch.drain()).await;

    assert_eq!(report.rule_names(), ["build", "serve"]);
    assert!(dir.path().join("built").exists());
    let pid = lm.running_pid("serve", "sleep 30").unwrap();

    let shutdown = orch.shutdown().await;
    assert!(shutdown.hook_failures.is_empty());
    assert!(!is_alive(pid));
}
