// tests/config_env.rs
use std::{env, fs};

use card_sync::config::{SyncConfig, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH};

const OVERRIDES: &[&str] = &[
    "CRON_SCHEDULE",
    "SYNC_ON_STARTUP",
    "DATABASE_URL",
    "DISCORD_WEBHOOK_URL",
    "SOURCE_LABEL",
    "PORT",
    "RETRY_UNSAVED",
];

fn clear_env() {
    env::remove_var(ENV_CONFIG_PATH);
    for k in OVERRIDES {
        env::remove_var(k);
    }
}

/// Run `f` with the CWD moved to an empty temp dir so a real config/ in the repo is not seen.
fn in_temp_cwd<F: FnOnce(&std::path::Path)>(f: F) {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();
    f(tmp.path());
    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn defaults_apply_without_file_or_env() {
    in_temp_cwd(|_| {
        let cfg = SyncConfig::load().unwrap();
        assert_eq!(cfg, SyncConfig::default());
        assert_eq!(cfg.cron_schedule, "0 */6 * * *");
        assert!(!cfg.sync_on_startup);
        assert_eq!(cfg.port, 3000);
        assert!(cfg.webhook_url.is_none());
    });
}

#[serial_test::serial]
#[test]
fn default_path_is_picked_up_and_env_wins() {
    in_temp_cwd(|dir| {
        fs::create_dir_all(dir.join("config")).unwrap();
        fs::write(
            dir.join(DEFAULT_CONFIG_PATH),
            r#"
            cron_schedule = "30 1 * * *"
            source_label = "GAME España"
            port = 8080
            "#,
        )
        .unwrap();

        let cfg = SyncConfig::load().unwrap();
        assert_eq!(cfg.cron_schedule, "30 1 * * *");
        assert_eq!(cfg.source_label, "GAME España");
        assert_eq!(cfg.port, 8080);

        env::set_var("CRON_SCHEDULE", "*/5 * * * *");
        env::set_var("SYNC_ON_STARTUP", "true");
        env::set_var("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/t");
        env::set_var("PORT", "9090");
        env::set_var("RETRY_UNSAVED", "1");
        env::set_var("DATABASE_URL", "memory");
        let cfg = SyncConfig::load().unwrap();
        assert_eq!(cfg.cron_schedule, "*/5 * * * *");
        assert!(cfg.sync_on_startup);
        assert!(cfg.retry_unsaved);
        assert_eq!(cfg.port, 9090);
        assert!(cfg.uses_memory_store());
        assert_eq!(
            cfg.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/t")
        );
        assert_eq!(cfg.source_label, "GAME España");
    });
}

#[serial_test::serial]
#[test]
fn explicit_path_must_exist() {
    in_temp_cwd(|dir| {
        env::set_var(ENV_CONFIG_PATH, dir.join("missing.toml"));
        assert!(SyncConfig::load().is_err());

        let p = dir.join("custom.toml");
        fs::write(&p, "sync_on_startup = true\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, &p);
        assert!(SyncConfig::load().unwrap().sync_on_startup);
    });
}

#[serial_test::serial]
#[test]
fn invalid_cron_from_env_is_rejected() {
    in_temp_cwd(|_| {
        env::set_var("CRON_SCHEDULE", "0 0 */6 * * *");
        let err = SyncConfig::load().unwrap_err();
        assert!(err.to_string().contains("cron"), "{err}");
    });
}
