//! Keeps a [`RouteTable`] in sync with its backing session map.
//!
//! The initial snapshot is loaded before [`RouteWatcher::start`] returns, so
//! the proxy never serves from an unpopulated table. Afterwards a `notify`
//! watch on the source's directory feeds a reload task; each change event
//! (plus an optional polling timer) reloads the source and swaps the new
//! snapshot in. A failed reload is logged and the previous snapshot stays.
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use eyre::{Result, WrapErr};
use notify::{RecursiveMode, Watcher};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, sleep},
};

use crate::{
    adapters::route_sources::route_source_for_path,
    core::route_table::{ReloadSummary, RouteTable},
    ports::route_source::{RouteSource, RouteSourceResult},
};

/// Tuning for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// How long to let a burst of change events settle before reloading.
    pub debounce: Duration,
    /// Reload on a fixed timer in addition to change events.
    pub poll_interval: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            poll_interval: None,
        }
    }
}

/// Owns the live route table and the machinery that keeps it current.
///
/// Dropping the watcher stops the reload task; the table itself stays valid
/// for anyone still holding it.
pub struct RouteWatcher {
    table: Arc<RouteTable>,
    source: Arc<dyn RouteSource>,
    // Held across load + replace so reloads land in the order they started
    reload_lock: Arc<Mutex<()>>,
    // Kept alive for its side effect; never read after init
    _watcher: notify::RecommendedWatcher,
    reload_task: JoinHandle<()>,
}

impl RouteWatcher {
    /// Load the session map at `path` and start watching it.
    ///
    /// Paths ending in `.sqlite` are read as SQLite databases, anything else
    /// as JSON. Fails if the initial load fails.
    pub async fn start(path: impl AsRef<Path>, options: WatchOptions) -> Result<Self> {
        Self::with_source(route_source_for_path(path), options).await
    }

    /// Like [`RouteWatcher::start`] with an explicit source.
    pub async fn with_source(source: Arc<dyn RouteSource>, options: WatchOptions) -> Result<Self> {
        let table = Arc::new(RouteTable::new());
        let reload_lock = Arc::new(Mutex::new(()));

        let summary = reload(source.as_ref(), &table, &reload_lock).await.wrap_err_with(|| {
            format!(
                "Failed to load initial routes from {}",
                source.path().display()
            )
        })?;
        tracing::info!(
            source = %source.path().display(),
            kind = source.kind(),
            routes = summary.total,
            "Loaded initial session routes"
        );

        let (tx, rx) = mpsc::channel(1);
        let watcher = init_watcher(source.path(), tx)?;

        let reload_task = tokio::spawn(reload_loop(
            source.clone(),
            table.clone(),
            reload_lock.clone(),
            rx,
            options,
        ));

        Ok(Self {
            table,
            source,
            reload_lock,
            _watcher: watcher,
            reload_task,
        })
    }

    /// The live route table. Every clone refers to the same table.
    pub fn table(&self) -> Arc<RouteTable> {
        self.table.clone()
    }

    /// Reload the source immediately, bypassing change detection.
    pub async fn reload_now(&self) -> RouteSourceResult<ReloadSummary> {
        reload(self.source.as_ref(), &self.table, &self.reload_lock).await
    }
}

impl Drop for RouteWatcher {
    fn drop(&mut self) {
        self.reload_task.abort();
    }
}

async fn reload(
    source: &dyn RouteSource,
    table: &RouteTable,
    lock: &Mutex<()>,
) -> RouteSourceResult<ReloadSummary> {
    let _guard = lock.lock().await;
    let snapshot = source.load().await?;
    Ok(table.replace(snapshot))
}

/// Names of files whose changes mean the session map may have changed.
///
/// SQLite in WAL mode commits into `<name>-wal` before checkpointing into the
/// main file, so both are watched.
fn watched_names(path: &Path) -> Result<Vec<OsString>> {
    let name = path
        .file_name()
        .ok_or_else(|| eyre::eyre!("Invalid session map path: {}", path.display()))?;

    let mut wal = name.to_owned();
    wal.push("-wal");
    Ok(vec![name.to_owned(), wal])
}

fn init_watcher(path: &Path, tx: mpsc::Sender<()>) -> Result<notify::RecommendedWatcher> {
    let names = watched_names(path)?;

    let mut watcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if (event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove())
                    && event.paths.iter().any(|p| {
                        p.file_name()
                            .is_some_and(|n| names.iter().any(|w| w.as_os_str() == n))
                    })
                {
                    tracing::trace!("Session map changed: {:?}", event.kind);
                    // A full channel already has a reload pending
                    let _ = tx.try_send(());
                }
            }
            Err(e) => tracing::error!("Session map watch error: {:?}", e),
        })
        .wrap_err("Failed to create file watcher")?;

    let watch_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .wrap_err_with(|| format!("Failed to watch directory {}", watch_dir.display()))?;

    Ok(watcher)
}

async fn reload_loop(
    source: Arc<dyn RouteSource>,
    table: Arc<RouteTable>,
    reload_lock: Arc<Mutex<()>>,
    mut rx: mpsc::Receiver<()>,
    options: WatchOptions,
) {
    tracing::debug!(source = %source.path().display(), "Session map watcher task started");

    let mut poll = options.poll_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    loop {
        let triggered = match poll.as_mut() {
            Some(interval) => tokio::select! {
                event = rx.recv() => event.is_some(),
                _ = interval.tick() => true,
            },
            None => rx.recv().await.is_some(),
        };
        if !triggered {
            break;
        }

        sleep(options.debounce).await;
        while rx.try_recv().is_ok() {}

        match reload(source.as_ref(), &table, &reload_lock).await {
            Ok(summary) if summary.is_unchanged() => {
                tracing::debug!(routes = summary.total, "Session map reloaded, no changes");
            }
            Ok(summary) => {
                tracing::info!(
                    added = summary.added,
                    removed = summary.removed,
                    updated = summary.updated,
                    routes = summary.total,
                    "Session map reloaded"
                );
            }
            Err(e) => {
                tracing::error!("Failed to reload session map: {}. Keeping previous routes.", e);
            }
        }
    }

    tracing::debug!("Session map watcher task is shutting down");
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use tempfile::tempdir;
    use tokio::time::timeout;

    use super::*;
    use crate::core::route_table::{Route, RouteSnapshot, Target};

    async fn wait_for<F: Fn(&RouteTable) -> bool>(table: &RouteTable, check: F) -> bool {
        timeout(Duration::from_secs(5), async {
            while !check(table) {
                sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .is_ok()
    }

    #[test]
    fn test_watched_names() {
        let names = watched_names(Path::new("/var/db/sessions.sqlite")).unwrap();
        assert_eq!(
            names,
            vec![
                OsString::from("sessions.sqlite"),
                OsString::from("sessions.sqlite-wal")
            ]
        );
        assert!(watched_names(Path::new("/")).is_err());
    }

    #[tokio::test]
    async fn test_start_fails_on_invalid_initial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(&path, "not json").unwrap();

        assert!(
            RouteWatcher::start(&path, WatchOptions::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_initial_load_completes_before_start_returns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(&path, r#"{"XYZ": {"host": "127.0.0.1", "port": 9001}}"#).unwrap();

        let watcher = RouteWatcher::start(&path, WatchOptions::default())
            .await
            .unwrap();

        assert_eq!(
            watcher.table().target("XYZ"),
            Some(Target::new("127.0.0.1", 9001))
        );
    }

    #[tokio::test]
    async fn test_reload_now_reconciles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(
            &path,
            r#"{"A": {"host": "h1", "port": 1001}, "B": {"host": "h2", "port": 1002}}"#,
        )
        .unwrap();

        let watcher = RouteWatcher::start(&path, WatchOptions::default())
            .await
            .unwrap();

        fs::write(
            &path,
            r#"{"B": {"host": "h2b", "port": 2002}, "C": {"host": "h3", "port": 1003}}"#,
        )
        .unwrap();
        let summary = watcher.reload_now().await.unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.updated, 1);
        let table = watcher.table();
        assert_eq!(table.target("A"), None);
        assert_eq!(table.target("B"), Some(Target::new("h2b", 2002)));
        assert_eq!(table.target("C"), Some(Target::new("h3", 1003)));
    }

    /// Each load returns a snapshot tagged with its call number; the first
    /// reload after startup is slow.
    struct VersionedSource {
        path: PathBuf,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl RouteSource for VersionedSource {
        async fn load(&self) -> RouteSourceResult<RouteSnapshot> {
            let version = self.loads.fetch_add(1, Ordering::SeqCst);
            if version == 1 {
                sleep(Duration::from_millis(200)).await;
            }
            let mut snapshot = RouteSnapshot::new();
            snapshot.insert("S".to_string(), Route::new("h", 1000 + version as u16));
            Ok(snapshot)
        }

        fn path(&self) -> &Path {
            &self.path
        }

        fn kind(&self) -> &'static str {
            "versioned"
        }
    }

    #[tokio::test]
    async fn test_concurrent_reloads_apply_in_start_order() {
        let dir = tempdir().unwrap();
        let source = Arc::new(VersionedSource {
            path: dir.path().join("sessions.json"),
            loads: AtomicUsize::new(0),
        });
        let watcher = Arc::new(
            RouteWatcher::with_source(source, WatchOptions::default())
                .await
                .unwrap(),
        );
        assert_eq!(watcher.table().target("S"), Some(Target::new("h", 1000)));

        let slow = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.reload_now().await })
        };
        sleep(Duration::from_millis(20)).await;
        let fast = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.reload_now().await })
        };

        slow.await.unwrap().unwrap();
        fast.await.unwrap().unwrap();

        // The later reload started last, so its snapshot must be the live one
        assert_eq!(watcher.table().target("S"), Some(Target::new("h", 1002)));
    }

    #[tokio::test]
    async fn test_file_change_triggers_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(&path, r#"{"A": {"host": "h1", "port": 1001}}"#).unwrap();

        let watcher = RouteWatcher::start(&path, WatchOptions::default())
            .await
            .unwrap();
        let table = watcher.table();

        sleep(Duration::from_millis(100)).await;
        fs::write(&path, r#"{"B": {"host": "h2", "port": 1002}}"#).unwrap();

        assert!(
            wait_for(&table, |t| t.target("B").is_some() && t.target("A").is_none()).await,
            "Timed out waiting for reload"
        );
    }

    #[tokio::test]
    async fn test_polling_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(&path, r#"{"A": {"host": "h1", "port": 1001}}"#).unwrap();

        let options = WatchOptions {
            debounce: Duration::from_millis(10),
            poll_interval: Some(Duration::from_millis(100)),
        };
        let watcher = RouteWatcher::start(&path, options).await.unwrap();
        let table = watcher.table();

        fs::write(&path, r#"{"A": {"host": "h1", "port": 1111}}"#).unwrap();

        assert!(
            wait_for(&table, |t| t.target("A") == Some(Target::new("h1", 1111))).await,
            "Timed out waiting for polled reload"
        );
    }
}
