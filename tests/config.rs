// tests/config.rs

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;

use watchproxy::config::{
    RuleConfig, Service, ServiceOverrides, config_base_dir, load_and_validate,
};
use watchproxy::errors::WatchproxyError;
use watchproxy::types::PortSpec;
use watchproxy_test_utils::ConfigFileBuilder;

const GO_SERVICE: &str = r#"
[service]
dev_port = 9000
refresh = "500ms"
env = ["GOFLAGS=-mod=vendor", "OUT=$HOME/bin"]

[rule.build]
match = '\w+\.go$'
cmd = "go build -o $OUT/server main.go"
continue = "serve"
wait = true

[rule.serve]
cmd = "$OUT/server"
dir = "cmd"
env = ["PORT=9001"]
stdout = true
on_exit = "rm -f $OUT/server"
"#;

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("Watchproxy.toml");
    fs::write(&path, contents).unwrap();
    path
}

fn process_env() -> Vec<(String, String)> {
    vec![
        ("HOME".to_string(), "/home/dev".to_string()),
        ("PATH".to_string(), "/usr/bin".to_string()),
    ]
}

#[test]
fn loads_and_builds_a_service() {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), GO_SERVICE);

    let cfg = load_and_validate(&path).unwrap();
    let base = config_base_dir(&path).unwrap();
    let service = Service::build(&cfg, &base, &process_env(), &ServiceOverrides::default()).unwrap();

    assert_eq!(service.ports, Some(PortSpec { dev: 9000, app: 9001 }));
    assert_eq!(service.refresh, Duration::from_millis(500));
    assert_eq!(service.root, dir.path().canonicalize().unwrap());

    let build = service.rules.get("build").unwrap();
    assert!(build.wait);
    assert_eq!(build.continuation.as_deref(), Some("serve"));
    assert_eq!(build.command, "go build -o /home/dev/bin/server main.go");
    assert_eq!(build.dir, service.root);

    let rendered = build.render("/repo/server/main.go").unwrap();
    assert_eq!(rendered, "go build -o /home/dev/bin/server /repo/server/main.go");

    let serve = service.rules.get("serve").unwrap();
    assert!(serve.pattern.is_none());
    assert!(serve.capture_stdout);
    assert_eq!(serve.dir, service.root.join("cmd"));
    assert_eq!(serve.on_exit.as_deref(), Some("rm -f /home/dev/bin/server"));
    assert!(serve.env.contains(&("PORT".to_string(), "9001".to_string())));
    assert!(serve.env.contains(&("GOFLAGS".to_string(), "-mod=vendor".to_string())));
}

#[test]
fn command_line_overrides_win() {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), GO_SERVICE);
    let cfg = load_and_validate(&path).unwrap();

    let overrides = ServiceOverrides {
        port: Some(PortSpec { dev: 3000, app: 4000 }),
        refresh: Some(Duration::from_secs(5)),
    };
    let service = Service::build(&cfg, dir.path(), &process_env(), &overrides).unwrap();

    assert_eq!(service.ports, Some(PortSpec { dev: 3000, app: 4000 }));
    assert_eq!(service.refresh, Duration::from_secs(5));
}

#[test]
fn no_dev_port_means_no_proxy() {
    let dir = tempdir().unwrap();
    let cfg = ConfigFileBuilder::new()
        .with_rule("build", {
            let mut r = RuleConfig::new("make");
            r.pattern = Some(r"\.c$".to_string());
            r
        })
        .build()
        .unwrap();

    let service = Service::build(&cfg, dir.path(), &[], &ServiceOverrides::default()).unwrap();
    assert_eq!(service.ports, None);
    assert_eq!(service.app_addr(), None);
    assert_eq!(service.refresh, Duration::from_secs(2));
}

#[test]
fn rendering_happens_after_env_expansion() {
    let dir = tempdir().unwrap();
    let cfg = ConfigFileBuilder::new()
        .with_rule("lint", {
            let mut r = RuleConfig::new("$LINTER main.go");
            r.pattern = Some(r"\w+\.go$".to_string());
            r
        })
        .build()
        .unwrap();

    let env = [("LINTER".to_string(), "golint".to_string())];
    let service = Service::build(&cfg, dir.path(), &env, &ServiceOverrides::default()).unwrap();
    let rule = service.rules.get("lint").unwrap();
    assert_eq!(rule.command, "golint main.go");
    assert_eq!(rule.render("/src/api/x.go").unwrap(), "golint /src/api/x.go");
}

#[test]
fn empty_strings_mean_unset() {
    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[rule.build]
match = '\.rs$'
cmd = "cargo build"
continue = ""
on_init = ""
"#,
    );
    let cfg = load_and_validate(&path).unwrap();
    let rule = &cfg.rule["build"];
    assert!(rule.next.is_none());
    assert!(rule.on_init.is_none());
}

fn load_err(contents: &str) -> WatchproxyError {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), contents);
    load_and_validate(&path).unwrap_err()
}

#[test]
fn rejects_config_without_rules() {
    assert!(matches!(
        load_err("[service]\ndev_port = 8080\n"),
        WatchproxyError::ConfigError(_)
    ));
}

#[test]
fn rejects_bad_regex() {
    let err = load_err("[rule.a]\nmatch = '(unclosed'\ncmd = \"x\"\n");
    match err {
        WatchproxyError::ConfigError(msg) => assert!(msg.contains("rule 'a'")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn rejects_unknown_continuation() {
    let err = load_err("[rule.a]\nmatch = 'x'\ncmd = \"x\"\ncontinue = \"ghost\"\n");
    match err {
        WatchproxyError::ConfigError(msg) => assert!(msg.contains("ghost")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn rejects_continuation_cycles() {
    let err = load_err(
        r#"
[rule.a]
match = 'x'
cmd = "a"
continue = "b"

[rule.b]
cmd = "b"
continue = "c"

[rule.c]
cmd = "c"
continue = "a"
"#,
    );
    assert!(matches!(err, WatchproxyError::ContinuationCycle(_)));

    let err = load_err("[rule.a]\nmatch = 'x'\ncmd = \"a\"\ncontinue = \"a\"\n");
    assert!(matches!(err, WatchproxyError::ContinuationCycle(_)));
}

#[test]
fn rejects_malformed_env_and_refresh() {
    let err = load_err("[service]\nenv = [\"NOVALUE\"]\n[rule.a]\nmatch = 'x'\ncmd = \"a\"\n");
    assert!(matches!(err, WatchproxyError::ConfigError(_)));

    let err = load_err("[service]\nrefresh = \"soon\"\n[rule.a]\nmatch = 'x'\ncmd = \"a\"\n");
    assert!(matches!(err, WatchproxyError::ConfigError(_)));
}

#[test]
fn rejects_invalid_toml_and_missing_files() {
    assert!(matches!(
        load_err("[rule.a\ncmd = "),
        WatchproxyError::TomlError(_)
    ));

    let dir = tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, WatchproxyError::ConfigError(_)));
}

#[test]
fn missing_watch_root_is_an_error() {
    let dir = tempdir().unwrap();
    let cfg = ConfigFileBuilder::new()
        .with_rule("a", RuleConfig::new("true"))
        .build_raw();
    let mut cfg = watchproxy::config::ConfigFile::try_from(cfg).unwrap();
    cfg.service.dir = Some("does-not-exist".to_string());

    let err = Service::build(&cfg, dir.path(), &[], &ServiceOverrides::default()).unwrap_err();
    assert!(matches!(err, WatchproxyError::ConfigError(_)));
}
