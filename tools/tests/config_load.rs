use std::fs;
use std::path::PathBuf;

use cli_support::WorkerCacheArgs;
use modelzoo_tools::ToolConfig;
use run_contracts::ExecutionContext;

fn write_temp_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("modelzoo-tools.toml");
    fs::write(&path, contents).expect("write temp config");
    path
}

#[test]
fn missing_file_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ToolConfig::from_path(&dir.path().join("absent.toml")).is_none());
}

#[test]
fn empty_config_uses_defaults() {
    let cfg = ToolConfig::from_toml("").expect("parse empty config");
    assert_eq!(cfg.cache_root, PathBuf::from("/n0/cache"));
    assert_eq!(cfg.quota_bytes, None);
    assert_eq!(cfg.progress_every, 1000);
    assert!(cfg.sampler.shuffle);
    assert!(!cfg.sampler.drop_last);
    assert_eq!(cfg.sampler.seed, None);
}

#[test]
fn loads_cache_and_sampler_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_config(
        &dir,
        r#"
[cache]
root = "/scratch/wc"
quota_bytes = 1048576
progress_every = 50

[sampler]
seed = 42
shuffle = false
drop_last = true
"#,
    );
    let cfg = ToolConfig::from_path(&path).expect("load config");
    assert_eq!(cfg.cache_root, PathBuf::from("/scratch/wc"));
    assert_eq!(cfg.quota_bytes, Some(1 << 20));
    assert_eq!(cfg.progress_every, 50);
    assert_eq!(cfg.sampler.seed, Some(42));
    assert!(!cfg.sampler.shuffle);
    assert!(cfg.sampler.drop_last);

    let wc = cfg.worker_cache_config();
    assert_eq!(wc.quota_bytes, Some(1 << 20));
    assert_eq!(wc.progress_every, 50);
}

#[test]
fn zero_progress_interval_falls_back() {
    let cfg = ToolConfig::from_toml("[cache]\nprogress_every = 0\n").unwrap();
    assert_eq!(cfg.progress_every, 1000);
}

#[test]
fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else {
        return;
    };
    let cfg = ToolConfig::from_toml("[cache]\nroot = \"~/wc\"\n").unwrap();
    assert_eq!(cfg.cache_root, PathBuf::from(format!("{home}/wc")));
}

#[test]
fn malformed_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_config(&dir, "[cache\nroot = 3");
    assert!(ToolConfig::from_path(&path).is_none());
    assert!(ToolConfig::from_toml("[cache]\nquota_bytes = \"lots\"\n").is_err());
}

fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }
}

#[test]
fn cache_settings_layer_file_then_env_then_flags() {
    let cfg = ToolConfig::from_toml("[cache]\nquota_bytes = 100\nprogress_every = 5\n").unwrap();

    let from_file = cfg.layered_worker_cache_config(env(&[]), &WorkerCacheArgs::default());
    assert_eq!(from_file.quota_bytes, Some(100));
    assert_eq!(from_file.progress_every, 5);

    let vars = &[
        ("MODELZOO_WORKER_CACHE_QUOTA", "200"),
        ("MODELZOO_CACHE_PROGRESS_EVERY", "9"),
    ];
    let from_env = cfg.layered_worker_cache_config(env(vars), &WorkerCacheArgs::default());
    assert_eq!(from_env.quota_bytes, Some(200));
    assert_eq!(from_env.progress_every, 9);

    let flags = WorkerCacheArgs {
        quota_bytes: Some(300),
        progress_every: None,
        force: false,
    };
    let from_flags = cfg.layered_worker_cache_config(env(vars), &flags);
    assert_eq!(from_flags.quota_bytes, Some(300));
    assert_eq!(from_flags.progress_every, 9);
}

#[test]
fn configured_root_lands_on_the_context() {
    let cfg = ToolConfig::from_toml("[cache]\nroot = \"/scratch/wc\"\n").unwrap();
    let ctx = ExecutionContext::streaming_worker(0, 1).unwrap();

    let applied = cfg.apply_cache_root(ctx.clone().with_worker_cache_root("/ignored"), false);
    assert_eq!(applied.worker_cache_root, PathBuf::from("/scratch/wc"));

    let kept = cfg.apply_cache_root(ctx.with_worker_cache_root("/from/flag"), true);
    assert_eq!(kept.worker_cache_root, PathBuf::from("/from/flag"));
}
