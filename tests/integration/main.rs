//! Integration tests for query-client

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use chrono::{Duration, Utc};
    use predicates::prelude::*;
    use query_client::cache::{CacheItem, DiskDriver, KeyValueDriver, Store};
    use query_client::config::{CacheConfig, ConfigManager, StorageKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        /// Temp dir with a config pointing the disk driver inside it
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store_dir = toml::Value::String(dir.path().join("store").display().to_string());
            let content = format!("[cache]\nstorage = \"disk\"\nstorage_dir = {}\n", store_dir);
            std::fs::write(dir.path().join("config.toml"), content).unwrap();
            Self { dir }
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn storage_path(&self) -> PathBuf {
            let cache = CacheConfig {
                storage: StorageKind::Disk,
                storage_dir: Some(self.dir.path().join("store")),
                ..CacheConfig::default()
            };
            ConfigManager::storage_path(&cache)
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("query-client");
            cmd.env_remove("QUERY_CLIENT_CONFIG")
                .arg("--config")
                .arg(self.config_path());
            cmd
        }

        /// Persist buckets the way a client would
        fn seed(&self, store: &Store) {
            let driver = DiskDriver::new(self.storage_path());
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(driver.persist(store))
                .unwrap();
        }
    }

    fn seeded_store() -> Store {
        let mut expired = CacheItem::encode("[1]", &2).unwrap();
        expired.date = Utc::now() - Duration::hours(1);

        let mut store = Store::new();
        store.insert(
            "double".to_string(),
            vec![CacheItem::encode("[21]", &42).unwrap(), expired],
        );
        store.insert(
            "users".to_string(),
            vec![CacheItem::encode("null", &vec!["ada", "grace"]).unwrap()],
        );
        store
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("query-client")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("inspect the persisted query cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("query-client")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("query-client"));
    }

    #[test]
    fn config_path() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("lifetime_ms = 1800000"));
    }

    #[test]
    fn config_init_respects_existing_file() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        sandbox
            .cmd()
            .args(["config", "init", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
    }

    #[test]
    fn config_set_then_show() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "set", "cache.lifetime_ms", "1000"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Set cache.lifetime_ms = 1000"));

        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("lifetime_ms = 1000"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "set", "cache.flavor", "mint"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_fails() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.config_path(), "[cache]\nlifetime_ms = \"soon\"\n").unwrap();

        sandbox
            .cmd()
            .args(["cache", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn cache_list_empty() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache buckets found"));
    }

    #[test]
    fn cache_show_missing_bucket() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["cache", "show", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cache bucket not found: nope"));
    }

    #[test]
    fn cache_list_and_show_seeded_store() {
        let sandbox = Sandbox::new();
        sandbox.seed(&seeded_store());

        sandbox
            .cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("double"))
            .stdout(predicate::str::contains("users"));

        sandbox
            .cmd()
            .args(["cache", "show", "double", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"[21]\""))
            .stdout(predicate::str::contains("\"valid\": false"));
    }

    #[test]
    fn cache_sweep_removes_expired() {
        let sandbox = Sandbox::new();
        sandbox.seed(&seeded_store());

        sandbox
            .cmd()
            .args(["cache", "sweep"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 expired item(s)"));

        sandbox
            .cmd()
            .args(["cache", "show", "double", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[21]"))
            .stdout(predicate::str::contains("[1]").not());
    }

    #[test]
    fn cache_clear_without_confirmation_keeps_buckets() {
        let sandbox = Sandbox::new();
        sandbox.seed(&seeded_store());

        sandbox
            .cmd()
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing removed"));
        assert!(sandbox.storage_path().exists());
    }

    #[test]
    fn cache_clear_yes() {
        let sandbox = Sandbox::new();
        sandbox.seed(&seeded_store());

        sandbox
            .cmd()
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 2 bucket(s)"));

        sandbox
            .cmd()
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache buckets found"));
    }

    #[test]
    fn completions_bash() {
        cargo_bin_cmd!("query-client")
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("query-client"));
    }
}

mod engine_tests {
    use query_client::cache::SessionStorage;
    use query_client::{BoxError, CacheConfig, Client, Config, Producer, Query, StorageKind};
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// `n * 2` after 10ms, counting calls
    fn double(calls: &Arc<AtomicUsize>) -> impl Producer<(i64,), i64> {
        let calls = Arc::clone(calls);
        move |args: Option<(i64,)>| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                let (n,) = args.ok_or("missing args")?;
                Ok::<_, BoxError>(n * 2)
            }
        }
    }

    fn disk_config(dir: &TempDir) -> Config {
        Config {
            cache: CacheConfig {
                storage: StorageKind::Disk,
                storage_dir: Some(dir.path().to_path_buf()),
                ..CacheConfig::default()
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn disk_cache_survives_client_restart() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let client: Client<(i64,), i64> = Client::new(disk_config(&temp)).await;
        let started = Instant::now();
        assert_eq!(
            client.fetch(("double", (21,)), double(&calls)).await.unwrap(),
            42
        );
        assert!(started.elapsed() >= Duration::from_millis(10));
        drop(client);

        let restarted: Client<(i64,), i64> = Client::new(disk_config(&temp)).await;
        assert_eq!(
            restarted
                .fetch(("double", (21,)), double(&calls))
                .await
                .unwrap(),
            42
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let items = restarted.cached_items("double").await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "[21]");
    }

    #[tokio::test]
    async fn refetch_many_calls_every_producer() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client: Client<(i64,), i64> = Client::new(disk_config(&temp)).await;

        let queries = || {
            vec![
                Query::new(("double", (1,)), double(&calls)),
                Query::new(("double", (2,)), double(&calls)),
            ]
        };
        let first: Vec<i64> = client
            .fetch_many(queries())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let second: Vec<i64> = client
            .refetch_many(queries())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(first, vec![2, 4]);
        assert_eq!(second, vec![2, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    #[serial]
    async fn session_cache_is_shared_within_process() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = Config {
            cache: CacheConfig {
                storage: StorageKind::Session,
                storage_name: "integration-session".to_string(),
                ..CacheConfig::default()
            },
            ..Config::default()
        };

        let first: Client<(i64,), i64> = Client::new(config.clone()).await;
        first.fetch(("double", (4,)), double(&calls)).await.unwrap();

        let second: Client<(i64,), i64> = Client::new(config).await;
        assert_eq!(
            second.fetch(("double", (4,)), double(&calls)).await.unwrap(),
            8
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        SessionStorage::global()
            .remove_item("integration-session")
            .unwrap();
    }
}
